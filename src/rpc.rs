use crate::chain::{ChainReader, TransferFilter};
use crate::events::{Transfer, decode_transfer_event};
use crate::repository::TransferEvent;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::TransportResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request
const MAX_RESULTS_ERROR: &str = "exceeds max results";
pub const DEFAULT_LOG_BATCH_SIZE: u64 = 1000; // Most public RPCs accept this span per eth_getLogs call

/// JSON-RPC client over a prioritised list of endpoints.
///
/// Every request is retried with exponential backoff; a failing or slow
/// endpoint is rotated out in favour of the next one in the list.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<DynProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
    log_batch_size: u64,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider = ProviderBuilder::new().connect_http(parsed_url).erased();
            providers.push(provider);
        }

        Ok(Self::with_providers(providers, rpc_urls.to_vec()))
    }

    fn with_providers(providers: Vec<DynProvider>, urls: Vec<String>) -> Self {
        RpcClient {
            providers,
            urls,
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
            log_batch_size: DEFAULT_LOG_BATCH_SIZE,
        }
    }

    /// Maximum number of blocks covered by one `eth_getLogs` call.
    pub fn with_log_batch_size(mut self, log_batch_size: u64) -> Self {
        self.log_batch_size = log_batch_size.max(1);
        self
    }

    fn get_provider(&self) -> &DynProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    /// Runs `op` against the current provider with timeout, retry and rotation.
    ///
    /// "exceeds max results" answers are returned without retrying so the
    /// caller can split the range.
    async fn request<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        Retry::spawn(self.get_retry_strategy(), || {
            let fut = op(self.get_provider().clone());
            async move {
                match timeout(REQUEST_TIMEOUT, fut).await {
                    Ok(Ok(value)) => Ok(Ok(value)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        if error_str.contains(MAX_RESULTS_ERROR) {
                            Ok(Err(anyhow::anyhow!("{}", error_str)))
                        } else {
                            self.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", error_str))
                        }
                    }
                    Err(_) => Err(self.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        self.request(|provider| async move { provider.get_block_number().await })
            .await
    }

    pub async fn get_chain_id(&self) -> Result<u64> {
        self.request(|provider| async move { provider.get_chain_id().await })
            .await
    }

    async fn get_logs_internal(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.request(|provider| {
            let filter = filter.clone();
            async move { provider.get_logs(&filter).await }
        })
        .await
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    /// Fetches logs matching `filter` over `[from_block, to_block]`, splitting
    /// the range when the provider caps the number of results.
    pub async fn get_logs(&self, from_block: u64, to_block: u64, filter: &Filter) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            let ranged = filter.clone().from_block(current_from).to_block(to_block);

            match self.get_logs_internal(&ranged).await {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();
                    if !error_str.contains(MAX_RESULTS_ERROR) {
                        return Err(e);
                    }

                    let Some((suggested_from, suggested_to)) =
                        Self::parse_max_results_error(&error_str)
                    else {
                        return Err(e);
                    };
                    if suggested_from != current_from || suggested_to < current_from {
                        return Err(e.context(format!(
                            "Provider suggested unusable range {suggested_from}-{suggested_to}"
                        )));
                    }

                    info!(
                        "Hit max results limit for blocks {}-{}, splitting at block {}",
                        current_from, to_block, suggested_to
                    );

                    let split = filter.clone().from_block(suggested_from).to_block(suggested_to);
                    let logs = self.get_logs_internal(&split).await?;

                    all_logs.extend(logs);
                    current_from = suggested_to + 1;
                }
            }
        }

        Ok(all_logs)
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn current_block_height(&self) -> Result<u64> {
        self.get_latest_block()
            .await
            .context("Failed to read current block height")
    }

    async fn fetch_transfer_events(
        &self,
        from_block: u64,
        to_block: u64,
        filter: &TransferFilter,
    ) -> Result<Vec<TransferEvent>> {
        let log_filter = Filter::new()
            .address(filter.token)
            .event_signature(Transfer::SIGNATURE_HASH)
            .topic2(filter.receiver.into_word());

        let mut logs = Vec::new();
        for (chunk_from, chunk_to) in block_chunks(from_block, to_block, self.log_batch_size) {
            let chunk = self
                .get_logs(chunk_from, chunk_to, &log_filter)
                .await
                .with_context(|| {
                    format!("Failed to fetch Transfer logs for blocks {chunk_from}-{chunk_to}")
                })?;
            debug!(
                "Received {} logs for blocks {} to {}",
                chunk.len(),
                chunk_from,
                chunk_to
            );
            logs.extend(chunk);
        }

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_transfer_event(&log) {
                Ok(event) if event.to == filter.receiver => events.push(event),
                Ok(event) => debug!(
                    "Ignoring transfer {:?} to unexpected receiver {:?}",
                    event.tx_hash, event.to
                ),
                Err(e) => warn!("Failed to decode transfer event: {}", e),
            }
        }

        Ok(events)
    }
}

/// Splits `[from_block, to_block]` into consecutive inclusive ranges of at
/// most `size` blocks.
fn block_chunks(from_block: u64, to_block: u64, size: u64) -> impl Iterator<Item = (u64, u64)> {
    let size = size.max(1);
    std::iter::successors((from_block <= to_block).then_some(from_block), move |&start| {
        start.checked_add(size).filter(|next| *next <= to_block)
    })
    .map(move |start| (start, start.saturating_add(size - 1).min(to_block)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::mock::Asserter;
    use alloy_primitives::{Address, B256, LogData, U256};

    fn receiver() -> Address {
        Address::repeat_byte(0x22)
    }

    fn mocked_client(asserter: &Asserter) -> RpcClient {
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        RpcClient::with_providers(vec![provider], vec!["mock".to_string()])
    }

    fn transfer_log(block_number: u64) -> Log {
        Log {
            inner: alloy_primitives::Log {
                address: Address::repeat_byte(0xee),
                data: LogData::new_unchecked(
                    vec![
                        Transfer::SIGNATURE_HASH,
                        Address::repeat_byte(0x11).into_word(),
                        receiver().into_word(),
                    ],
                    U256::from(7u64).to_be_bytes_vec().into(),
                ),
            },
            transaction_hash: Some(B256::left_padding_from(&block_number.to_be_bytes())),
            block_number: Some(block_number),
            log_index: Some(0),
            ..Default::default()
        }
    }

    fn blocks(logs: &[Log]) -> Vec<u64> {
        logs.iter().filter_map(|log| log.block_number).collect()
    }

    #[test]
    fn chunks_cover_range_without_overlap() {
        assert_eq!(
            block_chunks(0, 2500, 1000).collect::<Vec<_>>(),
            vec![(0, 999), (1000, 1999), (2000, 2500)]
        );
        assert_eq!(block_chunks(5000, 5010, 1000).collect::<Vec<_>>(), vec![(5000, 5010)]);
        assert_eq!(block_chunks(7, 7, 1000).collect::<Vec<_>>(), vec![(7, 7)]);
        assert_eq!(block_chunks(10, 9, 1000).count(), 0);
        assert_eq!(
            block_chunks(u64::MAX - 1, u64::MAX, 1).collect::<Vec<_>>(),
            vec![(u64::MAX - 1, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn wide_range_is_fetched_in_batches() {
        let asserter = Asserter::new();
        // One answer per batch; a single wide call would only consume the first.
        asserter.push_success(&vec![transfer_log(10)]);
        asserter.push_success(&vec![transfer_log(1500)]);
        asserter.push_success(&vec![transfer_log(2400)]);
        let client = mocked_client(&asserter).with_log_batch_size(1000);

        let filter = TransferFilter {
            token: Address::repeat_byte(0xee),
            receiver: receiver(),
        };
        let events = client.fetch_transfer_events(0, 2500, &filter).await.unwrap();

        let fetched: Vec<u64> = events.iter().map(|e| e.block_number).collect();
        assert_eq!(fetched, vec![10, 1500, 2400]);
    }

    #[tokio::test]
    async fn max_results_error_splits_at_suggested_range() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("query exceeds max results 10000, retry with the range 100-150");
        asserter.push_success(&vec![transfer_log(120)]);
        asserter.push_success(&vec![transfer_log(180)]);
        let client = mocked_client(&asserter);

        let logs = client.get_logs(100, 200, &Filter::new()).await.unwrap();

        assert_eq!(blocks(&logs), vec![120, 180]);
    }

    #[tokio::test]
    async fn suggested_range_must_start_at_requested_block() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("query exceeds max results 10000, retry with the range 90-150");
        let client = mocked_client(&asserter);

        let err = client.get_logs(100, 200, &Filter::new()).await.unwrap_err();

        assert!(format!("{err:#}").contains("unusable range 90-150"));
    }

    #[test]
    fn parses_suggested_range() {
        let msg = "query exceeds max results 10000, retry with the range 5000-5042";
        assert_eq!(RpcClient::parse_max_results_error(msg), Some((5000, 5042)));
        assert_eq!(RpcClient::parse_max_results_error("exceeds max results"), None);
    }

    #[test]
    fn rotates_through_endpoints() {
        let client = RpcClient::new(&[
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ])
        .unwrap();

        assert_eq!(client.get_current_url(), "http://localhost:8545");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8546");
        client.rotate_provider();
        assert_eq!(client.get_current_url(), "http://localhost:8545");
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        assert!(RpcClient::new(&[]).is_err());
    }
}
