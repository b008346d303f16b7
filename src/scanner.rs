use crate::chain::{ChainReader, TransferFilter};
use crate::repository::{ProgressStore, RecordOutcome, TransactionStore, Window};
use alloy_primitives::utils::format_units;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Tunables of the polling loop.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub poll_interval: Duration,
    /// Blocks to backfill when no successful window exists yet.
    pub initial_window_size: u64,
    /// Blocks added on each side of the recorded window when fetching.
    pub fetch_padding: u64,
    pub token_symbol: String,
    pub token_decimals: u8,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            initial_window_size: 1000,
            fetch_padding: 1,
            token_symbol: "TOKEN".to_string(),
            token_decimals: 18,
        }
    }
}

/// Inclusive block range, never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl ScanRange {
    /// `None` when `from_block > to_block`.
    pub fn new(from_block: u64, to_block: u64) -> Option<Self> {
        (from_block <= to_block).then_some(Self {
            from_block,
            to_block,
        })
    }

    /// The range actually sent to the chain reader: widened by `padding` on
    /// both sides, clamped to `[0, height]`.
    pub fn padded(&self, padding: u64, height: u64) -> ScanRange {
        ScanRange {
            // At block 0 the low end stays at 0 instead of `height - 1`, which
            // would leave the window's own blocks outside the fetch.
            from_block: self.from_block.saturating_sub(padding),
            to_block: self.to_block.saturating_add(padding).min(height),
        }
    }
}

/// Range to scan once at startup, given the last successful window and the
/// current chain height. `None` means nothing new since the last run.
pub fn resolve_start_range(
    last_window: Option<&Window>,
    height: u64,
    initial_window_size: u64,
) -> (u64, Option<ScanRange>) {
    let from_block = match last_window {
        Some(window) => window.to_block + 1,
        None => height.saturating_sub(initial_window_size),
    };
    (from_block, ScanRange::new(from_block, height))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub window: ScanRange,
    pub fetched: ScanRange,
    pub created: usize,
    pub duplicates: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The chain has not moved past the high-water mark.
    Idle { height: u64 },
    Scanned(ScanSummary),
}

/// Drives the polling loop: resolves where to resume, scans new block ranges
/// and records each completed window.
///
/// All scans run through `&mut self`, so two cycles can never overlap.
pub struct Scanner<C, T, P> {
    chain: C,
    transactions: T,
    progress: P,
    filter: TransferFilter,
    settings: ScanSettings,
    /// First block not yet confirmed scanned in this run.
    next_block: u64,
}

impl<C, T, P> Scanner<C, T, P>
where
    C: ChainReader,
    T: TransactionStore,
    P: ProgressStore,
{
    pub fn new(
        chain: C,
        transactions: T,
        progress: P,
        filter: TransferFilter,
        settings: ScanSettings,
    ) -> Self {
        Scanner {
            chain,
            transactions,
            progress,
            filter,
            settings,
            next_block: 0,
        }
    }

    /// Highest block confirmed scanned, if any.
    pub fn high_water_mark(&self) -> Option<u64> {
        self.next_block.checked_sub(1)
    }

    pub fn transactions(&self) -> &T {
        &self.transactions
    }

    pub fn progress(&self) -> &P {
        &self.progress
    }

    /// Resolves the resume point and scans everything up to the current height.
    ///
    /// Failing to read the height or the scan history is fatal. A failed
    /// initial scan is not: the range is left pending for the first tick.
    pub async fn start(&mut self) -> Result<Option<ScanSummary>> {
        let height = self
            .chain
            .current_block_height()
            .await
            .context("Failed to read chain height at startup")?;
        let last_window = self
            .progress
            .last_successful_window()
            .context("Failed to load last successful window")?;

        match &last_window {
            Some(window) => info!(
                "Resuming after window {}-{}, current block {}",
                window.from_block, window.to_block, height
            ),
            None => info!(
                "No scan history, backfilling {} blocks behind current block {}",
                self.settings.initial_window_size, height
            ),
        }

        let (from_block, range) =
            resolve_start_range(last_window.as_ref(), height, self.settings.initial_window_size);
        self.next_block = from_block;

        let Some(range) = range else {
            info!("No new blocks since last run");
            return Ok(None);
        };

        match self.scan(range, height).await {
            Ok(summary) => {
                self.next_block = range.to_block + 1;
                Ok(Some(summary))
            }
            Err(e) => {
                error!(
                    "Initial scan of blocks {}-{} failed, retrying on next tick: {:#}",
                    range.from_block, range.to_block, e
                );
                Ok(None)
            }
        }
    }

    /// One polling step: scans `[high_water_mark + 1, height]` if the chain moved.
    ///
    /// On error the high-water mark is untouched and no window is recorded.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        let height = self
            .chain
            .current_block_height()
            .await
            .context("Failed to read chain height")?;

        let Some(range) = ScanRange::new(self.next_block, height) else {
            debug!("No new blocks (height {})", height);
            return Ok(TickOutcome::Idle { height });
        };

        let summary = self.scan(range, height).await?;
        self.next_block = range.to_block + 1;
        Ok(TickOutcome::Scanned(summary))
    }

    /// Runs `start` and then ticks forever, until Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let mut interval = time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; startup already scanned.
        interval.tick().await;

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Error waiting for Ctrl+C: {}", e);
                    }
                    info!("Shutdown signal received, stopping watcher");
                    return Ok(());
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Error in polling loop: {:#}", e);
                    }
                }
            }
        }
    }

    /// Fetches the padded range, persists every event and records the window.
    async fn scan(&self, range: ScanRange, height: u64) -> Result<ScanSummary> {
        let fetched = range.padded(self.settings.fetch_padding, height);
        debug!(
            "Scanning blocks {}-{} (fetching {}-{})",
            range.from_block, range.to_block, fetched.from_block, fetched.to_block
        );

        let events = self
            .chain
            .fetch_transfer_events(fetched.from_block, fetched.to_block, &self.filter)
            .await
            .with_context(|| {
                format!(
                    "Scan of blocks {}-{} failed",
                    range.from_block, range.to_block
                )
            })?;

        let mut summary = ScanSummary {
            window: range,
            fetched,
            created: 0,
            duplicates: 0,
            failed: 0,
        };

        for event in &events {
            match self.transactions.record_transaction(event) {
                Ok(RecordOutcome::Created) => {
                    summary.created += 1;
                    let amount = format_units(event.value, self.settings.token_decimals)
                        .unwrap_or_else(|_| event.value.to_string());
                    info!(
                        "Received {} {} from {}",
                        amount, self.settings.token_symbol, event.from
                    );
                }
                Ok(RecordOutcome::Duplicate) => {
                    summary.duplicates += 1;
                    debug!("Transaction {:?} already recorded", event.tx_hash);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!("Failed to store transaction {:?}: {:#}", event.tx_hash, e);
                }
            }
        }

        self.progress
            .record_window(&Window::successful(range.from_block, range.to_block))
            .with_context(|| {
                format!(
                    "Failed to record window {}-{}",
                    range.from_block, range.to_block
                )
            })?;

        info!(
            "Scanned blocks {}-{}: {} new, {} duplicate, {} failed",
            range.from_block, range.to_block, summary.created, summary.duplicates, summary.failed
        );

        Ok(summary)
    }
}
