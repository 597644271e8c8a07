//! # Per-Table Locks
//!
//! Readers of a table share its lock; replacing a table on upload takes it exclusively,
//! so a query never observes a half-replaced table.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Clone, Default, Debug)]
pub struct TableLocks {
    inner: Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, table: &str) -> Arc<RwLock<()>> {
        let mut locks = self.inner.lock().await;
        locks
            .entry(table.to_lowercase())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Takes shared locks on every table, in sorted order to rule out lock-order inversions.
    pub async fn read_many(&self, tables: &BTreeSet<String>) -> Vec<OwnedRwLockReadGuard<()>> {
        let names: BTreeSet<String> = tables.iter().map(|t| t.to_lowercase()).collect();
        let mut guards = Vec::with_capacity(names.len());
        for name in &names {
            guards.push(self.lock_for(name).await.read_owned().await);
        }
        guards
    }

    /// Takes the exclusive lock on one table.
    pub async fn write(&self, table: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(table).await.write_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_writer_waits_for_readers() {
        let locks = TableLocks::new();
        let tables: BTreeSet<String> = ["Staff".to_string()].into();
        let readers = locks.read_many(&tables).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.write("staff")).await;
        assert!(blocked.is_err());

        drop(readers);
        let writer = tokio::time::timeout(Duration::from_millis(500), locks.write("staff")).await;
        assert!(writer.is_ok());
    }
}
