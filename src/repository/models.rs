use alloy_primitives::{Address, B256, U256};
use serde::Serialize;

/// A scanned, inclusive block range. Written once, never updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub from_block: u64,
    pub to_block: u64,
    pub is_success: bool,
}

impl Window {
    pub fn successful(from_block: u64, to_block: u64) -> Self {
        debug_assert!(from_block <= to_block);
        Window {
            from_block,
            to_block,
            is_success: true,
        }
    }
}

/// A matched `Transfer` log directed at the configured receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// Outcome of persisting one transfer. A repeated `tx_hash` is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Created,
    Duplicate,
}
