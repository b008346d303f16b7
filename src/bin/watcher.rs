use anyhow::{Context, Result};
use erc20_watcher::chain::TransferFilter;
use erc20_watcher::config::Config;
use erc20_watcher::repository::{Database, TransactionRepository, WindowRepository};
use erc20_watcher::rpc::RpcClient;
use erc20_watcher::scanner::{ScanSettings, Scanner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Token: {} ({:?})", config.token_symbol, config.token_address);
    info!("Receiver: {:?}", config.receiver_address);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let database_path = config.database_path();
    let db = Database::new(&database_path.to_string_lossy())?;
    info!("Database initialized at {}", database_path.display());

    let client = RpcClient::new(&config.json_rpc_urls)?.with_log_batch_size(config.log_batch_size);
    let chain_id = client
        .get_chain_id()
        .await
        .context("Failed to query chain id")?;
    if chain_id != config.chain_id {
        anyhow::bail!(
            "RPC endpoint reports chain id {} but CHAIN_ID is {}",
            chain_id,
            config.chain_id
        );
    }
    let current_block = client.get_latest_block().await?;
    info!(
        "ERC20 Transfer Watcher started on {} (chain {}), current block {}",
        config.chain_name, chain_id, current_block
    );

    let filter = TransferFilter {
        token: config.token_address,
        receiver: config.receiver_address,
    };
    let settings = ScanSettings {
        poll_interval: config.poll_interval,
        initial_window_size: config.initial_window_size,
        fetch_padding: config.fetch_padding,
        token_symbol: config.token_symbol.clone(),
        token_decimals: config.token_decimals,
    };

    let mut scanner = Scanner::new(
        client,
        TransactionRepository::new(db.clone()),
        WindowRepository::new(db),
        filter,
        settings,
    );

    if let Err(e) = scanner.run().await {
        error!("Watcher error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
