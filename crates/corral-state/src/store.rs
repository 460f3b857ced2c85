//! MetaStore — redb-backed persistence of group metadata.
//!
//! Values are JSON-serialized into redb's `&[u8]` value column. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable};
use tracing::debug;

use corral_core::ContainerGroupMeta;

use crate::error::{StateError, StateResult};
use crate::tables::GROUPS;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct MetaStore {
    db: Arc<Database>,
}

impl MetaStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "meta store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory meta store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Insert or update a group record.
    pub fn put_group(&self, meta: &ContainerGroupMeta) -> StateResult<()> {
        let value = serde_json::to_vec(meta).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            table
                .insert(meta.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = %meta.id, "group meta stored");
        Ok(())
    }

    /// Get a group record by id.
    pub fn get_group(&self, group_id: &str) -> StateResult<Option<ContainerGroupMeta>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        match table.get(group_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let meta: ContainerGroupMeta =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// List all group records.
    pub fn list_groups(&self) -> StateResult<Vec<ContainerGroupMeta>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let meta: ContainerGroupMeta =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(meta);
        }
        Ok(results)
    }

    /// Delete a group record. Returns true if it existed.
    pub fn delete_group(&self, group_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            existed = table.remove(group_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        if existed {
            debug!(group = %group_id, "group meta deleted");
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{ContainerManifest, GroupStatus};

    fn test_store() -> MetaStore {
        MetaStore::open_in_memory().unwrap()
    }

    fn test_meta(id: &str) -> ContainerGroupMeta {
        ContainerGroupMeta {
            id: id.to_string(),
            name: "svc".into(),
            user: "alice".into(),
            submit_time: 1_000,
            update_time: 1_000,
            replica: 2,
            update_interval: 5,
            status: GroupStatus::Normal,
            manifest: ContainerManifest::default(),
        }
    }

    #[test]
    fn put_and_get_roundtrip() {
        let store = test_store();
        let meta = test_meta("job_a");
        store.put_group(&meta).unwrap();

        let loaded = store.get_group("job_a").unwrap().unwrap();
        assert_eq!(loaded, meta);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = test_store();
        assert!(store.get_group("job_missing").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_existing() {
        let store = test_store();
        store.put_group(&test_meta("job_a")).unwrap();

        let mut updated = test_meta("job_a");
        updated.replica = 5;
        updated.status = GroupStatus::Terminated;
        store.put_group(&updated).unwrap();

        let loaded = store.get_group("job_a").unwrap().unwrap();
        assert_eq!(loaded.replica, 5);
        assert_eq!(loaded.status, GroupStatus::Terminated);
    }

    #[test]
    fn list_returns_all() {
        let store = test_store();
        store.put_group(&test_meta("job_a")).unwrap();
        store.put_group(&test_meta("job_b")).unwrap();

        let all = store.list_groups().unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn delete_removes_record() {
        let store = test_store();
        store.put_group(&test_meta("job_a")).unwrap();

        assert!(store.delete_group("job_a").unwrap());
        assert!(!store.delete_group("job_a").unwrap());
        assert!(store.get_group("job_a").unwrap().is_none());
    }
}
