//! In-memory stores.
//!
//! Nothing survives the process; useful for tests and dry runs against a live node.

use super::models::{RecordOutcome, TransferEvent, Window};
use super::{ProgressStore, TransactionStore};
use alloy_primitives::B256;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryProgressStore {
    windows: Mutex<Vec<Window>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the history, e.g. to simulate a restart.
    pub fn with_windows(windows: Vec<Window>) -> Self {
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// All recorded windows in write order.
    pub fn windows(&self) -> Vec<Window> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Window>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressStore for MemoryProgressStore {
    fn last_successful_window(&self) -> Result<Option<Window>> {
        Ok(self
            .lock()
            .iter()
            .filter(|w| w.is_success)
            .max_by_key(|w| w.to_block)
            .copied())
    }

    fn record_window(&self, window: &Window) -> Result<()> {
        self.lock().push(*window);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    transactions: Mutex<HashMap<B256, TransferEvent>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, tx_hash: &B256) -> Option<TransferEvent> {
        self.lock().get(tx_hash).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<B256, TransferEvent>> {
        self.transactions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TransactionStore for MemoryTransactionStore {
    fn record_transaction(&self, event: &TransferEvent) -> Result<RecordOutcome> {
        let mut transactions = self.lock();
        if transactions.contains_key(&event.tx_hash) {
            return Ok(RecordOutcome::Duplicate);
        }
        transactions.insert(event.tx_hash, event.clone());
        Ok(RecordOutcome::Created)
    }
}
