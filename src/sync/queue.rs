use crate::error::Result;
use crate::models::Expense;
use crate::store::{KeyValueStore, PENDING_EXPENSES};
use std::sync::Arc;
use tracing::{debug, warn};

/// Expenses accepted locally but not yet confirmed in the sheet, oldest first.
///
/// The whole list lives under one key and every mutation is a single read-modify-write of
/// it, so other processes sharing the store can enqueue at any time. Entries only leave the
/// queue once a drain has replayed all of them.
pub struct PendingQueue<K> {
    store: Arc<K>,
}

fn decode(raw: Option<String>) -> Result<Vec<Expense>> {
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

fn encode(pending: &[Expense]) -> Result<Option<String>> {
    if pending.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(pending)?))
}

impl<K: KeyValueStore> PendingQueue<K> {
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }

    /// Append to the durable list and return its new length. A rejected write surfaces as
    /// `StorageUnavailable` and the record is not kept.
    pub fn enqueue(&self, expense: &Expense) -> Result<usize> {
        let mut len = 0;
        self.store.update(PENDING_EXPENSES, &mut |raw| {
            let mut pending = decode(raw)?;
            pending.push(expense.clone());
            len = pending.len();
            encode(&pending)
        })?;
        debug!(pending = len, "Queued expense");
        Ok(len)
    }

    pub fn peek_all(&self) -> Result<Vec<Expense>> {
        decode(self.store.get(PENDING_EXPENSES)?)
    }

    /// Clear after a full drain: removes the `drained` entries from the head of the queue and
    /// keeps anything enqueued while the drain ran. If the head no longer matches, another
    /// drain already removed them and the queue is left as is.
    pub fn clear_drained(&self, drained: &[Expense]) -> Result<()> {
        self.store.update(PENDING_EXPENSES, &mut |raw| {
            let pending = decode(raw)?;
            if !pending.starts_with(drained) {
                warn!("Pending expenses changed during sync, keeping queue");
                return encode(&pending);
            }
            encode(&pending[drained.len()..])
        })
    }
}
