//! Active/frozen memtable pair

use std::sync::Arc;

use parking_lot::RwLock;

use super::MemTable;

struct Tables {
    active: Arc<MemTable>,
    frozen: Option<Arc<MemTable>>,
}

/// The memtables alive at any moment: one active, at most one frozen
///
/// Only the write leader rotates; only the compactor drops the frozen table.
pub struct MemTableSet {
    tables: RwLock<Tables>,
}

impl MemTableSet {
    pub fn new(active: Arc<MemTable>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                active,
                frozen: None,
            }),
        }
    }

    /// Snapshot of (active, frozen)
    pub fn get(&self) -> (Arc<MemTable>, Option<Arc<MemTable>>) {
        let tables = self.tables.read();
        (Arc::clone(&tables.active), tables.frozen.clone())
    }

    pub fn active(&self) -> Arc<MemTable> {
        Arc::clone(&self.tables.read().active)
    }

    pub fn frozen(&self) -> Option<Arc<MemTable>> {
        self.tables.read().frozen.clone()
    }

    /// Make `next` active and freeze the previous active table
    ///
    /// Callers rotate only while no frozen table is pending.
    pub fn rotate(&self, next: Arc<MemTable>) -> Arc<MemTable> {
        let mut tables = self.tables.write();
        debug_assert!(tables.frozen.is_none(), "rotation over a pending frozen memtable");
        let previous = std::mem::replace(&mut tables.active, next);
        tables.frozen = Some(Arc::clone(&previous));
        previous
    }

    /// Discard the frozen table once its contents are persisted
    pub fn drop_frozen(&self) -> Option<Arc<MemTable>> {
        self.tables.write().frozen.take()
    }
}
