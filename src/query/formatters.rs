use crate::repository::{TransactionStats, TransferEvent, Window};
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS);
    table
}

fn csv_string(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    let _ = wtr.write_record(header);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_windows(windows: &[Window], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if windows.is_empty() {
                return "No windows recorded.".to_string();
            }
            let mut table = new_table();
            table.set_header(vec!["From Block", "To Block", "Blocks", "Success"]);
            for w in windows {
                table.add_row(vec![
                    Cell::new(w.from_block),
                    Cell::new(w.to_block),
                    Cell::new(w.to_block - w.from_block + 1),
                    Cell::new(if w.is_success { "yes" } else { "no" }),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(windows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_string(
            &["from_block", "to_block", "is_success"],
            windows
                .iter()
                .map(|w| {
                    vec![
                        w.from_block.to_string(),
                        w.to_block.to_string(),
                        w.is_success.to_string(),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_transactions(
    transactions: &[TransferEvent],
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> String {
    let amount = |t: &TransferEvent| {
        format_units(t.value, decimals).unwrap_or_else(|_| t.value.to_string())
    };

    match format {
        OutputFormat::Table => {
            if transactions.is_empty() {
                return "No transactions found.".to_string();
            }
            let value_header = format!("Value ({symbol})");
            let mut table = new_table();
            table.set_header(vec![
                "Block",
                "Log",
                "From",
                value_header.as_str(),
                "Value (base units)",
                "Tx Hash",
            ]);
            for t in transactions {
                table.add_row(vec![
                    Cell::new(t.block_number),
                    Cell::new(t.log_index),
                    Cell::new(format!("{:#}", t.from)),
                    Cell::new(amount(t)),
                    Cell::new(t.value.to_string()),
                    Cell::new(format_tx_hash(&format!("{:?}", t.tx_hash))),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_transactions: Vec<_> = transactions
                .iter()
                .map(|t| {
                    json!({
                        "tx_hash": format!("{:?}", t.tx_hash),
                        "block_number": t.block_number,
                        "log_index": t.log_index,
                        "from": format!("{:?}", t.from),
                        "to": format!("{:?}", t.to),
                        "value": amount(t),
                        "value_raw": t.value.to_string(),
                    })
                })
                .collect();
            serde_json::to_string_pretty(&json_transactions).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => csv_string(
            &[
                "tx_hash",
                "block_number",
                "log_index",
                "from",
                "to",
                "value",
                "value_raw",
            ],
            transactions
                .iter()
                .map(|t| {
                    vec![
                        format!("{:?}", t.tx_hash),
                        t.block_number.to_string(),
                        t.log_index.to_string(),
                        format!("{:?}", t.from),
                        format!("{:?}", t.to),
                        amount(t),
                        t.value.to_string(),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_stats(
    stats: &TransactionStats,
    last_window: Option<&Window>,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> String {
    let total = format_units(stats.total_value, decimals)
        .unwrap_or_else(|_| stats.total_value.to_string());
    let block = |b: Option<u64>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
    let scanned_to = last_window.map(|w| w.to_block);

    match format {
        OutputFormat::Table => {
            let mut table = new_table();
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec!["Transactions".to_string(), stats.total_transactions.to_string()]);
            table.add_row(vec!["Unique senders".to_string(), stats.unique_senders.to_string()]);
            table.add_row(vec![format!("Total received ({symbol})"), total]);
            table.add_row(vec!["Earliest block".to_string(), block(stats.earliest_block)]);
            table.add_row(vec!["Latest block".to_string(), block(stats.latest_block)]);
            table.add_row(vec!["Scanned up to".to_string(), block(scanned_to)]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "total_transactions": stats.total_transactions,
            "unique_senders": stats.unique_senders,
            "total_received": total,
            "total_received_raw": stats.total_value.to_string(),
            "earliest_block": stats.earliest_block,
            "latest_block": stats.latest_block,
            "scanned_to_block": scanned_to,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => csv_string(
            &[
                "total_transactions",
                "unique_senders",
                "total_received",
                "earliest_block",
                "latest_block",
                "scanned_to_block",
            ],
            vec![vec![
                stats.total_transactions.to_string(),
                stats.unique_senders.to_string(),
                total,
                block(stats.earliest_block),
                block(stats.latest_block),
                block(scanned_to),
            ]],
        ),
    }
}

/// Shortens a hash to `0x1234…abcd` for table display.
fn format_tx_hash(hash: &str) -> String {
    if hash.len() > 14 {
        format!("{}…{}", &hash[..6], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}
