//! Identity node: users, authentication and preferences.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::http::{parse_body, parse_id, PeerClient, PeerError, Reply, RequestScope, Telemetry};
use crate::store::{InMemoryTable, Record, Repository};

pub const SERVICE_NAME: &str = "user-service";

/// Lifetime of a refresh token, counted from issue.
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

impl Record for User {
    fn id(&self) -> u64 {
        self.id
    }
}

pub fn seed_users() -> Vec<User> {
    [
        (1, "john@example.com", "John Doe"),
        (2, "jane@example.com", "Jane Smith"),
        (3, "alice@example.com", "Alice Johnson"),
    ]
    .into_iter()
    .map(|(id, email, name)| User {
        id,
        email: email.to_string(),
        name: name.to_string(),
        password: "password123".to_string(),
        preferences: Map::new(),
    })
    .collect()
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    email: String,
    name: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

/// Issued on login, exchanged on refresh.
#[derive(Debug, Clone)]
struct Session {
    user_id: u64,
    issued_at: DateTime<Utc>,
}

impl Session {
    fn new(user_id: u64) -> Self {
        Self { user_id, issued_at: Utc::now() }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= ChronoDuration::days(REFRESH_TOKEN_TTL_DAYS)
    }
}

pub struct IdentityNode {
    telemetry: Telemetry,
    users: Arc<dyn Repository<User>>,
    sessions: DashMap<String, Session>,
    catalog: PeerClient,
}

impl IdentityNode {
    pub fn new(telemetry: Telemetry, catalog: PeerClient) -> Self {
        Self::with_users(telemetry, catalog, Arc::new(InMemoryTable::seeded("users", seed_users())))
    }

    pub fn with_users(telemetry: Telemetry, catalog: PeerClient, users: Arc<dyn Repository<User>>) -> Self {
        Self {
            telemetry,
            users,
            sessions: DashMap::new(),
            catalog,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/auth/login", post(login_handler))
            .route("/auth/register", post(register_handler))
            .route("/auth/refresh", post(refresh_handler))
            .route("/users/search", get(search_handler))
            .route("/users/{id}", get(get_user_handler))
            .route("/users/{id}/profile", get(profile_handler))
            .route("/users/{id}/favorites", get(favorites_handler))
            .route("/users/{id}/preferences", post(preferences_handler))
            .with_state(self)
    }

    /// Store a new refresh token, dropping any that have expired.
    fn issue_session(&self, user_id: u64) -> String {
        let now = Utc::now();
        self.sessions.retain(|_, session| !session.is_expired(now));

        let refresh_token = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(refresh_token.clone(), Session::new(user_id));
        refresh_token
    }

    fn require_user(&self, id: u64) -> Result<User, ServiceError> {
        self.users
            .get(id)?
            .ok_or_else(|| ServiceError::not_found("user_not_found", "User not found"))
    }

    async fn login(&self, scope: &mut RequestScope, body: &Bytes) -> Result<Reply, ServiceError> {
        let req: LoginRequest = parse_body(body)?;
        scope.record("user.email", "email", req.email.as_str());

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::internal(
                "database_connection_failed",
                "Database connection failed during login",
            ));
        }

        let user = self
            .users
            .find(&|u| u.email.eq_ignore_ascii_case(&req.email) && u.password == req.password)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::unauthorized("invalid_credentials", "Invalid credentials"))?;

        let token = uuid::Uuid::new_v4().to_string();
        let refresh_token = self.issue_session(user.id);

        scope.record("user.id", "user_id", user.id);
        Ok(Reply::ok(
            "User logged in successfully",
            &json!({
                "token": token,
                "refresh_token": refresh_token,
                "expires_in": 86_400,
                "user_id": user.id,
                "email": user.email,
                "name": user.name,
            }),
        ))
    }

    async fn register(&self, scope: &mut RequestScope, body: &Bytes) -> Result<Reply, ServiceError> {
        let req: RegisterRequest = parse_body(body)?;
        scope.record("user.email", "email", req.email.as_str());

        if !req.email.contains('@') || req.name.trim().is_empty() || req.password.is_empty() {
            return Err(ServiceError::invalid_input(
                "invalid_registration",
                "Email, name and password are required",
            ));
        }

        let email = req.email.clone();
        let user = self.users.insert_unique(
            &|u| u.email.eq_ignore_ascii_case(&email),
            ServiceError::conflict("user_already_exists", "User already exists"),
            &mut |id| User {
                id,
                email: req.email.clone(),
                name: req.name.clone(),
                password: req.password.clone(),
                preferences: Map::new(),
            },
        )?;

        scope.record("user.id", "user_id", user.id);
        Ok(Reply::created(
            "User registered successfully",
            &json!({
                "user_id": user.id,
                "email": user.email,
                "name": user.name,
                "message": "User created successfully",
            }),
        ))
    }

    async fn get_user(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_user_id", "user")?;
        scope.record("user.id", "user_id", id);
        let user = self.require_user(id)?;
        Ok(Reply::ok("User retrieved successfully", &user))
    }

    async fn profile(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_user_id", "user")?;
        scope.record("user.id", "user_id", id);
        scope.simulate_latency().await;

        let user = self.require_user(id)?;
        let (hours_ago, orders_count, total_spent) = {
            let mut rng = rand::thread_rng();
            (rng.gen_range(0..24), rng.gen_range(0..10), rng.gen::<f64>() * 1000.0)
        };

        Ok(Reply::ok(
            "User profile retrieved successfully",
            &json!({
                "id": user.id,
                "email": user.email,
                "name": user.name,
                "preferences": user.preferences,
                "created_at": "2024-01-01T00:00:00Z",
                "last_login": Utc::now() - ChronoDuration::hours(hours_ago),
                "orders_count": orders_count,
                "total_spent": total_spent,
            }),
        ))
    }

    async fn favorites(&self, scope: &mut RequestScope, raw_id: &str) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_user_id", "user")?;
        scope.record("user.id", "user_id", id);
        self.require_user(id)?;

        scope.field("target_service", self.catalog.peer());
        let favorites: Value = self
            .catalog
            .get(scope.span(), "call_product_service", &format!("/products/favorites/{}", id))
            .await
            .map_err(|e| match e {
                PeerError::Status { .. } => {
                    ServiceError::upstream_unavailable("favorites_unavailable", "Failed to get favorites")
                }
                other => other.unavailable("product_service_call_failed"),
            })?;

        if let Some(total) = favorites.get("total").and_then(Value::as_u64) {
            scope.record("favorites.count", "favorites_count", total);
        }
        Ok(Reply::ok("User favorites retrieved successfully", &favorites))
    }

    async fn update_preferences(
        &self,
        scope: &mut RequestScope,
        raw_id: &str,
        body: &Bytes,
    ) -> Result<Reply, ServiceError> {
        let id = parse_id(raw_id, "invalid_user_id", "user")?;
        let preferences: Map<String, Value> = parse_body(body)?;
        scope.record("user.id", "user_id", id);

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::internal(
                "database_constraint_violation",
                "Failed to update user preferences due to database constraint",
            ));
        }

        let updated_fields = preferences.len();
        let user = self.users.try_update(
            id,
            ServiceError::not_found("user_not_found", "User not found"),
            &mut |user| {
                for (key, value) in &preferences {
                    user.preferences.insert(key.clone(), value.clone());
                }
                Ok(())
            },
        )?;

        scope.record("preferences.updated", "preferences_updated", updated_fields);
        Ok(Reply::ok(
            "User preferences updated successfully",
            &json!({
                "message": "Preferences updated",
                "user_id": user.id,
                "updated_fields": updated_fields,
                "preferences": user.preferences,
            }),
        ))
    }

    async fn search(&self, scope: &mut RequestScope, params: &HashMap<String, String>) -> Result<Reply, ServiceError> {
        let query = params.get("q").cloned().unwrap_or_default();
        let limit = match params.get("limit") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| ServiceError::invalid_input("invalid_limit", "Invalid limit"))?,
            None => 10,
        };
        scope.record("search.query", "query", query.as_str());
        scope.attribute("search.limit", limit);

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::upstream_unavailable(
                "elasticsearch_timeout",
                "Search service temporarily unavailable",
            ));
        }

        let needle = query.to_lowercase();
        let users: Vec<User> = self
            .users
            .find(&|u| {
                needle.is_empty()
                    || u.name.to_lowercase().contains(&needle)
                    || u.email.to_lowercase().contains(&needle)
            })?
            .into_iter()
            .take(limit)
            .collect();

        scope.record("search.results", "results", users.len());
        Ok(Reply::ok(
            "User search completed",
            &json!({ "query": query, "results": users.len(), "users": users }),
        ))
    }

    async fn refresh(&self, scope: &mut RequestScope, body: &Bytes) -> Result<Reply, ServiceError> {
        let req: RefreshRequest = parse_body(body)?;

        scope.simulate_latency().await;
        if scope.injected_failure() {
            return Err(ServiceError::unauthorized(
                "invalid_refresh_token",
                "Token refresh failed - invalid refresh token",
            ));
        }

        // A refresh token is single-use: it is swapped for a new one.
        let (_, session) = self
            .sessions
            .remove(&req.refresh_token)
            .ok_or_else(|| ServiceError::unauthorized("invalid_refresh_token", "Invalid refresh token"))?;
        if session.is_expired(Utc::now()) {
            return Err(ServiceError::unauthorized("refresh_token_expired", "Refresh token expired"));
        }

        let refresh_token = self.issue_session(session.user_id);

        scope.record("user.id", "user_id", session.user_id);
        Ok(Reply::ok(
            "Token refreshed successfully",
            &json!({
                "access_token": uuid::Uuid::new_v4().to_string(),
                "refresh_token": refresh_token,
                "expires_in": 3600,
            }),
        ))
    }
}

type NodeState = State<Arc<IdentityNode>>;

async fn login_handler(State(node): NodeState, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "user_login", "/auth/login", "login");
    let result = node.login(&mut scope, &body).await;
    scope.respond(result)
}

async fn register_handler(State(node): NodeState, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "user_register", "/auth/register", "register");
    let result = node.register(&mut scope, &body).await;
    scope.respond(result)
}

async fn refresh_handler(State(node): NodeState, headers: HeaderMap, body: Bytes) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "refresh_token", "/auth/refresh", "refresh_token");
    let result = node.refresh(&mut scope, &body).await;
    scope.respond(result)
}

async fn get_user_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "get_user", "/users/{id}", "get_user");
    let result = node.get_user(&mut scope, &id).await;
    scope.respond(result)
}

async fn profile_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope =
        RequestScope::begin(&node.telemetry, &headers, "get_user_profile", "/users/{id}/profile", "get_profile");
    let result = node.profile(&mut scope, &id).await;
    scope.respond(result)
}

async fn favorites_handler(State(node): NodeState, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "get_user_favorites",
        "/users/{id}/favorites",
        "user_favorites",
    );
    let result = node.favorites(&mut scope, &id).await;
    scope.respond(result)
}

async fn preferences_handler(
    State(node): NodeState,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut scope = RequestScope::begin(
        &node.telemetry,
        &headers,
        "update_user_preferences",
        "/users/{id}/preferences",
        "update_preferences",
    );
    let result = node.update_preferences(&mut scope, &id, &body).await;
    scope.respond(result)
}

async fn search_handler(
    State(node): NodeState,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut scope = RequestScope::begin(&node.telemetry, &headers, "search_users", "/users/search", "search_users");
    let result = node.search(&mut scope, &params).await;
    scope.respond(result)
}
