use clap::{Parser, Subcommand};
use serde_json::Value;

use tracemart::config::PeersConfig;
use tracemart::http::X_REQUEST_ID;

#[derive(Parser)]
#[command(name = "mesh-cli")]
#[command(about = "Management CLI for the tracemart service nodes", long_about = None)]
struct Cli {
    /// Base URL of the node to query; each command has a default node.
    #[arg(short, long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check node health (every node unless --url is given)
    Health,
    /// Order analytics from the order service
    Analytics,
    /// Trending products from the product service
    Trending,
    /// List orders, optionally filtered by status
    Orders {
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let peers = PeersConfig::default();

    match cli.command {
        Commands::Health => {
            let targets = match cli.url {
                Some(url) => vec![url],
                None => vec![peers.identity_url, peers.catalog_url, peers.orders_url],
            };
            for base in targets {
                match client.get(format!("{}/health", base)).send().await {
                    Ok(res) => print_response(res).await?,
                    Err(e) => eprintln!("{}: unreachable ({})", base, e),
                }
            }
        }
        Commands::Analytics => {
            let base = cli.url.unwrap_or(peers.orders_url);
            let res = client.get(format!("{}/analytics/orders", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Trending => {
            let base = cli.url.unwrap_or(peers.catalog_url);
            let res = client.get(format!("{}/products/trending", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Orders { status } => {
            let base = cli.url.unwrap_or(peers.orders_url);
            let mut request = client.get(format!("{}/orders", base));
            if let Some(status) = status {
                request = request.query(&[("status", status)]);
            }
            print_response(request.send().await?).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !status.is_success() {
        eprintln!("Error: node returned status {}", status);
        if let Some(id) = request_id {
            eprintln!("Request ID: {}", id);
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
