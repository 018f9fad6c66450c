//! In-memory domain tables.
//!
//! # Responsibilities
//! - Keep each node's mutable collections (users, products, orders, payments)
//! - Allocate ids
//! - Run check-then-act updates atomically
//!
//! # Design Decisions
//! - One `RwLock` per table; the write lock is held only while a closure
//!   mutates a record, never across an await
//! - Conditional writes (`insert_unique`, `try_update`) run their check and
//!   their write inside the same critical section
//! - Updates mutate a copy and swap it in, so a panic inside a closure
//!   never leaves a half-written row; a poisoned lock is therefore
//!   recovered and the table keeps serving

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ServiceError;

/// A record addressable by numeric id.
pub trait Record: Clone + Send + Sync {
    fn id(&self) -> u64;
}

/// Storage seam used by the services.
pub trait Repository<T: Record>: Send + Sync {
    fn get(&self, id: u64) -> Result<Option<T>, ServiceError>;

    /// All records in id order.
    fn list(&self) -> Result<Vec<T>, ServiceError>;

    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, ServiceError>;

    /// Allocate an id without storing anything yet.
    fn next_id(&self) -> u64;

    /// Store a record under its own id, replacing any previous version.
    fn insert(&self, record: T) -> Result<T, ServiceError>;

    /// Build and store a record under a freshly allocated id.
    fn insert_with(&self, build: &mut dyn FnMut(u64) -> T) -> Result<T, ServiceError>;

    /// Like `insert_with`, but fails if `conflicts` holds for any existing
    /// record. The check and the insert are one critical section.
    fn insert_unique(
        &self,
        conflicts: &dyn Fn(&T) -> bool,
        conflict: ServiceError,
        build: &mut dyn FnMut(u64) -> T,
    ) -> Result<T, ServiceError>;

    /// Mutate one record under the write lock and return the new value.
    /// If `apply` fails the record is left untouched.
    fn try_update(
        &self,
        id: u64,
        missing: ServiceError,
        apply: &mut dyn FnMut(&mut T) -> Result<(), ServiceError>,
    ) -> Result<T, ServiceError>;
}

/// `Repository` over a `BTreeMap` behind a `RwLock`.
pub struct InMemoryTable<T> {
    name: &'static str,
    rows: RwLock<BTreeMap<u64, T>>,
    next_id: AtomicU64,
}

impl<T: Record> InMemoryTable<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Table pre-filled with `seed`; new ids continue after the largest seed id.
    pub fn seeded(name: &'static str, seed: Vec<T>) -> Self {
        let next = seed.iter().map(Record::id).max().unwrap_or(0) + 1;
        let rows = seed.into_iter().map(|r| (r.id(), r)).collect();
        Self {
            name,
            rows: RwLock::new(rows),
            next_id: AtomicU64::new(next),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<u64, T>> {
        self.rows.read().unwrap_or_else(|poisoned| {
            tracing::warn!(table = self.name, "Recovered poisoned table lock");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<u64, T>> {
        self.rows.write().unwrap_or_else(|poisoned| {
            tracing::warn!(table = self.name, "Recovered poisoned table lock");
            self.rows.clear_poison();
            poisoned.into_inner()
        })
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl<T: Record> Repository<T> for InMemoryTable<T> {
    fn get(&self, id: u64) -> Result<Option<T>, ServiceError> {
        let rows = self.read();
        Ok(rows.get(&id).cloned())
    }

    fn list(&self) -> Result<Vec<T>, ServiceError> {
        let rows = self.read();
        Ok(rows.values().cloned().collect())
    }

    fn find(&self, predicate: &dyn Fn(&T) -> bool) -> Result<Vec<T>, ServiceError> {
        let rows = self.read();
        Ok(rows.values().filter(|r| predicate(r)).cloned().collect())
    }

    fn next_id(&self) -> u64 {
        self.allocate()
    }

    fn insert(&self, record: T) -> Result<T, ServiceError> {
        let mut rows = self.write();
        rows.insert(record.id(), record.clone());
        Ok(record)
    }

    fn insert_with(&self, build: &mut dyn FnMut(u64) -> T) -> Result<T, ServiceError> {
        let mut rows = self.write();
        let record = build(self.allocate());
        rows.insert(record.id(), record.clone());
        Ok(record)
    }

    fn insert_unique(
        &self,
        conflicts: &dyn Fn(&T) -> bool,
        conflict: ServiceError,
        build: &mut dyn FnMut(u64) -> T,
    ) -> Result<T, ServiceError> {
        let mut rows = self.write();
        if rows.values().any(|r| conflicts(r)) {
            return Err(conflict);
        }
        let record = build(self.allocate());
        rows.insert(record.id(), record.clone());
        Ok(record)
    }

    fn try_update(
        &self,
        id: u64,
        missing: ServiceError,
        apply: &mut dyn FnMut(&mut T) -> Result<(), ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut rows = self.write();
        let row = rows.get_mut(&id).ok_or(missing)?;

        // Work on a copy so a failed update leaves the row as it was.
        let mut updated = row.clone();
        apply(&mut updated)?;
        *row = updated.clone();
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: u64,
        name: String,
        stock: u32,
    }

    impl Record for Item {
        fn id(&self) -> u64 {
            self.id
        }
    }

    fn table() -> InMemoryTable<Item> {
        InMemoryTable::seeded(
            "items",
            vec![
                Item { id: 1, name: "a".into(), stock: 5 },
                Item { id: 2, name: "b".into(), stock: 0 },
            ],
        )
    }

    fn missing() -> ServiceError {
        ServiceError::not_found("item_not_found", "no such item")
    }

    #[test]
    fn test_seeded_ids_continue() {
        let table = table();
        let item = table
            .insert_with(&mut |id| Item { id, name: "c".into(), stock: 1 })
            .unwrap();
        assert_eq!(item.id, 3);
        assert_eq!(table.list().unwrap().len(), 3);
    }

    #[test]
    fn test_reserved_id_then_insert() {
        let table = table();
        let id = table.next_id();
        assert_eq!(id, 3);
        assert!(table.get(id).unwrap().is_none());
        table.insert(Item { id, name: "later".into(), stock: 2 }).unwrap();
        assert_eq!(table.get(id).unwrap().unwrap().name, "later");
        assert_eq!(table.next_id(), 4);
    }

    #[test]
    fn test_insert_unique_rejects_conflict() {
        let table = table();
        let err = table
            .insert_unique(
                &|i| i.name == "a",
                ServiceError::conflict("duplicate", "exists"),
                &mut |id| Item { id, name: "a".into(), stock: 0 },
            )
            .unwrap_err();
        assert_eq!(err.code, "duplicate");
        assert_eq!(table.list().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_update_leaves_row_untouched() {
        let table = table();
        let err = table
            .try_update(1, missing(), &mut |item| {
                item.stock -= 1;
                Err(ServiceError::conflict("nope", "rejected"))
            })
            .unwrap_err();
        assert_eq!(err.code, "nope");
        assert_eq!(table.get(1).unwrap().unwrap().stock, 5);
    }

    #[test]
    fn test_update_missing_row() {
        let err = table().try_update(42, missing(), &mut |_| Ok(())).unwrap_err();
        assert_eq!(err.code, "item_not_found");
    }

    #[test]
    fn test_panicking_update_does_not_wedge_table() {
        let table = Arc::new(table());
        let worker = table.clone();
        let outcome = std::thread::spawn(move || {
            worker.try_update(1, missing(), &mut |item| {
                item.stock = 0;
                panic!("update blew up");
            })
        })
        .join();
        assert!(outcome.is_err());

        assert_eq!(table.get(1).unwrap().unwrap().stock, 5);
        let item = table
            .try_update(1, missing(), &mut |item| {
                item.stock -= 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(item.stock, 4);
    }

    #[test]
    fn test_concurrent_decrements_never_oversell() {
        let table = Arc::new(table());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || {
                    table.try_update(1, missing(), &mut |item| {
                        if item.stock == 0 {
                            return Err(ServiceError::conflict("insufficient_stock", "empty"));
                        }
                        item.stock -= 1;
                        Ok(())
                    })
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(Result::is_ok)
            .count();
        assert_eq!(successes, 5);
        assert_eq!(table.get(1).unwrap().unwrap().stock, 0);
    }
}
