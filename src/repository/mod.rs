pub mod database;
pub mod memory;
pub mod models;
pub mod transaction_repository;
pub mod window_repository;

pub use database::Database;
pub use memory::{MemoryProgressStore, MemoryTransactionStore};
pub use models::{RecordOutcome, TransferEvent, Window};
pub use transaction_repository::{TransactionRepository, TransactionStats};
pub use window_repository::WindowRepository;

use anyhow::Result;

/// Append-only history of scanned windows.
pub trait ProgressStore {
    /// The successful window with the greatest `to_block`, if any.
    fn last_successful_window(&self) -> Result<Option<Window>>;

    fn record_window(&self, window: &Window) -> Result<()>;
}

/// Transfer records, unique by transaction hash.
pub trait TransactionStore {
    /// Inserts `event`. An already stored hash yields `RecordOutcome::Duplicate`;
    /// `Err` is reserved for every other failure.
    fn record_transaction(&self, event: &TransferEvent) -> Result<RecordOutcome>;
}
