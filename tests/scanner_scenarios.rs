use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use erc20_watcher::chain::{ChainReader, TransferFilter};
use erc20_watcher::repository::{
    Database, MemoryProgressStore, MemoryTransactionStore, ProgressStore, TransactionRepository,
    TransferEvent, Window, WindowRepository,
};
use erc20_watcher::scanner::{ScanRange, ScanSettings, Scanner, TickOutcome};
use proptest::prelude::*;
use std::sync::Mutex;

/// Chain stub: height is set by the test, fetches may be forced to fail.
#[derive(Default)]
struct StubChain {
    height: Mutex<u64>,
    failing: Mutex<bool>,
    events: Vec<TransferEvent>,
    fetches: Mutex<Vec<(u64, u64)>>,
}

impl StubChain {
    fn at(height: u64) -> Self {
        Self {
            height: Mutex::new(height),
            ..Default::default()
        }
    }

    fn set_height(&self, height: u64) {
        *self.height.lock().unwrap() = height;
    }

    fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    fn last_fetch(&self) -> Option<(u64, u64)> {
        self.fetches.lock().unwrap().last().copied()
    }

    fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl<'a> ChainReader for &'a StubChain {
    async fn current_block_height(&self) -> Result<u64> {
        Ok(*self.height.lock().unwrap())
    }

    async fn fetch_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        _filter: &TransferFilter,
    ) -> Result<Vec<TransferEvent>> {
        if *self.failing.lock().unwrap() {
            anyhow::bail!("provider unavailable");
        }
        self.fetches.lock().unwrap().push((from_block, to_block));
        Ok(self
            .events
            .iter()
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .cloned()
            .collect())
    }
}

fn filter() -> TransferFilter {
    TransferFilter {
        token: Address::repeat_byte(0xee),
        receiver: Address::repeat_byte(0x22),
    }
}

fn transfer(tx_hash: B256, block_number: u64) -> TransferEvent {
    TransferEvent {
        tx_hash,
        block_number,
        log_index: 0,
        from: Address::repeat_byte(0x11),
        to: Address::repeat_byte(0x22),
        value: U256::from(250u64),
    }
}

fn settings() -> ScanSettings {
    ScanSettings {
        initial_window_size: 1000,
        ..ScanSettings::default()
    }
}

#[tokio::test]
async fn cold_start_then_tick_then_failure() {
    let chain = StubChain::at(5000);
    let mut scanner = Scanner::new(
        &chain,
        MemoryTransactionStore::new(),
        MemoryProgressStore::new(),
        filter(),
        settings(),
    );

    scanner.start().await.unwrap();
    assert_eq!(scanner.progress().windows(), vec![Window::successful(4000, 5000)]);
    assert_eq!(scanner.high_water_mark(), Some(5000));

    chain.set_height(5010);
    scanner.tick().await.unwrap();
    assert_eq!(
        scanner.progress().windows().last(),
        Some(&Window::successful(5001, 5010))
    );
    assert_eq!(chain.last_fetch(), Some((5000, 5010)));

    chain.set_height(5020);
    chain.set_failing(true);
    assert!(scanner.tick().await.is_err());
    assert_eq!(scanner.high_water_mark(), Some(5010));
    assert_eq!(scanner.progress().windows().len(), 2);

    chain.set_failing(false);
    let TickOutcome::Scanned(summary) = scanner.tick().await.unwrap() else {
        panic!("expected the failed range to be retried");
    };
    assert_eq!(summary.window, ScanRange::new(5011, 5020).unwrap());
}

#[tokio::test]
async fn idle_tick_touches_nothing() {
    let chain = StubChain::at(5000);
    let mut scanner = Scanner::new(
        &chain,
        MemoryTransactionStore::new(),
        MemoryProgressStore::new(),
        filter(),
        settings(),
    );
    scanner.start().await.unwrap();
    let fetches = chain.fetch_count();

    assert_eq!(
        scanner.tick().await.unwrap(),
        TickOutcome::Idle { height: 5000 }
    );
    assert_eq!(chain.fetch_count(), fetches);
    assert_eq!(scanner.progress().windows().len(), 1);
}

#[tokio::test]
async fn restart_resumes_from_sqlite_history_without_duplicates() {
    let db = Database::in_memory().unwrap();
    let hash = B256::repeat_byte(0xab);
    let mut chain = StubChain::at(5000);
    chain.events = vec![transfer(hash, 5000)];

    {
        let mut scanner = Scanner::new(
            &chain,
            TransactionRepository::new(db.clone()),
            WindowRepository::new(db.clone()),
            filter(),
            settings(),
        );
        scanner.start().await.unwrap();
    }

    // Second process run: the padded fetch revisits block 5000.
    chain.set_height(5010);
    let mut scanner = Scanner::new(
        &chain,
        TransactionRepository::new(db.clone()),
        WindowRepository::new(db.clone()),
        filter(),
        settings(),
    );
    let summary = scanner.start().await.unwrap().unwrap();

    assert_eq!(summary.window, ScanRange::new(5001, 5010).unwrap());
    assert_eq!(summary.fetched, ScanRange::new(5000, 5010).unwrap());
    assert_eq!(summary.duplicates, 1);

    let stored = TransactionRepository::new(db.clone())
        .query_transactions(None, 100, 0)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].tx_hash, hash);

    assert_eq!(
        WindowRepository::new(db).last_successful_window().unwrap(),
        Some(Window::successful(5001, 5010))
    );
}

proptest! {
    #[test]
    fn successful_windows_are_contiguous(
        start in 0u64..5_000,
        steps in prop::collection::vec((0u64..50, any::<bool>()), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let chain = StubChain::at(start);
            let mut scanner = Scanner::new(
                &chain,
                MemoryTransactionStore::new(),
                MemoryProgressStore::new(),
                filter(),
                settings(),
            );
            scanner.start().await.unwrap();

            let mut height = start;
            for (advance, fail) in steps {
                height += advance;
                chain.set_height(height);
                chain.set_failing(fail);
                let before = scanner.high_water_mark();
                let result = scanner.tick().await;
                if result.is_err() {
                    prop_assert_eq!(scanner.high_water_mark(), before);
                }
                prop_assert!(scanner.high_water_mark().unwrap_or(0) <= height);
            }

            let windows = scanner.progress().windows();
            for pair in windows.windows(2) {
                prop_assert_eq!(pair[1].from_block, pair[0].to_block + 1);
            }
            Ok(())
        })?;
    }
}
