use crate::repository::TransferEvent;
use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;

/// Which transfers the watcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFilter {
    pub token: Address,
    pub receiver: Address,
}

/// Read access to the chain.
#[async_trait]
pub trait ChainReader {
    /// Latest known block height.
    async fn current_block_height(&self) -> Result<u64>;

    /// All `Transfer` events of `filter.token` whose recipient is
    /// `filter.receiver`, in the inclusive range `[from_block, to_block]`.
    async fn fetch_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        filter: &TransferFilter,
    ) -> Result<Vec<TransferEvent>>;
}
