use crate::query::formatters::{OutputFormat, format_stats, format_transactions, format_windows};
use crate::repository::{ProgressStore, TransactionRepository, WindowRepository};
use anyhow::Result;

/// Display settings for amounts.
pub struct TokenDisplay<'a> {
    pub symbol: &'a str,
    pub decimals: u8,
}

#[derive(Default)]
pub struct TransactionQuery {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub limit: usize,
    pub offset: usize,
}

pub fn cmd_windows(repo: &WindowRepository, limit: usize, format: &OutputFormat) -> Result<()> {
    let windows = repo.recent(limit)?;
    println!("{}", format_windows(&windows, format));
    Ok(())
}

pub fn cmd_transactions(
    repo: &TransactionRepository,
    token: &TokenDisplay,
    query: TransactionQuery,
    format: &OutputFormat,
) -> Result<()> {
    let block_range = match (query.from_block, query.to_block) {
        (None, None) => None,
        (from, to) => Some((from.unwrap_or(0), to.unwrap_or(i64::MAX as u64))),
    };
    if let Some((start, end)) = block_range {
        if start > end {
            anyhow::bail!("--from-block ({start}) must not exceed --to-block ({end})");
        }
    }

    let transactions = repo.query_transactions(block_range, query.limit, query.offset)?;
    let output = format_transactions(&transactions, token.decimals, token.symbol, format);
    println!("{output}");
    Ok(())
}

pub fn cmd_stats(
    transactions: &TransactionRepository,
    windows: &WindowRepository,
    token: &TokenDisplay,
    format: &OutputFormat,
) -> Result<()> {
    let stats = transactions.get_statistics()?;
    let last_window = windows.last_successful_window()?;
    let output = format_stats(
        &stats,
        last_window.as_ref(),
        token.decimals,
        token.symbol,
        format,
    );
    println!("{output}");
    Ok(())
}
