use super::TransactionStore;
use super::database::Database;
use super::models::{RecordOutcome, TransferEvent};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use rusqlite::{Row, ToSql, params, params_from_iter};
use std::str::FromStr;

/// SQLite-backed transfer records keyed by transaction hash.
#[derive(Clone)]
pub struct TransactionRepository {
    db: Database,
}

impl TransactionRepository {
    const INSERT_TRANSACTION: &'static str = "INSERT OR IGNORE INTO transactions (
            tx_hash, block_number, log_index, from_address, to_address, value
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    const SELECT_TRANSACTION: &'static str = "SELECT tx_hash, block_number, log_index,
        from_address, to_address, value FROM transactions";

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn query_transactions(
        &self,
        block_range: Option<(u64, u64)>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TransferEvent>> {
        let mut query = Self::SELECT_TRANSACTION.to_string();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some((start, end)) = block_range {
            query.push_str(" WHERE block_number >= ? AND block_number <= ?");
            params.push(Box::new(start));
            params.push(Box::new(end));
        }

        query.push_str(&format!(
            " ORDER BY block_number DESC, log_index DESC LIMIT {limit} OFFSET {offset}"
        ));

        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&query)?;
        let transactions = stmt
            .query_map(params_from_iter(params), Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(transactions)
    }

    pub fn get_statistics(&self) -> Result<TransactionStats> {
        let conn = self.db.conn()?;
        let (total_transactions, unique_senders, earliest_block, latest_block) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT from_address), MIN(block_number), MAX(block_number)
             FROM transactions",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let mut stmt = conn.prepare("SELECT value FROM transactions")?;
        let values = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let total_value = Self::sum_values(values)?;

        Ok(TransactionStats {
            total_transactions,
            unique_senders,
            earliest_block,
            latest_block,
            total_value,
        })
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<TransferEvent> {
        fn parse<T: FromStr>(row: &Row, idx: usize) -> rusqlite::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            row.get::<_, String>(idx)?.parse::<T>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        }

        Ok(TransferEvent {
            tx_hash: parse::<B256>(row, 0)?,
            block_number: row.get(1)?,
            log_index: row.get(2)?,
            from: parse::<Address>(row, 3)?,
            to: parse::<Address>(row, 4)?,
            value: parse::<U256>(row, 5)?,
        })
    }

    fn sum_values(values: Vec<String>) -> Result<U256> {
        let mut total = U256::ZERO;
        for value_str in values {
            let value = U256::from_str(&value_str)
                .map_err(|_| anyhow::anyhow!("Invalid value format in database: {}", value_str))?;
            total = total
                .checked_add(value)
                .ok_or_else(|| anyhow::anyhow!("Overflow in sum calculation"))?;
        }
        Ok(total)
    }
}

impl TransactionStore for TransactionRepository {
    fn record_transaction(&self, event: &TransferEvent) -> Result<RecordOutcome> {
        let conn = self.db.conn()?;
        let inserted = conn.execute(
            Self::INSERT_TRANSACTION,
            params![
                format!("{:?}", event.tx_hash),
                event.block_number,
                event.log_index,
                format!("{:?}", event.from),
                format!("{:?}", event.to),
                event.value.to_string(),
            ],
        )?;

        Ok(if inserted == 0 {
            RecordOutcome::Duplicate
        } else {
            RecordOutcome::Created
        })
    }
}

#[derive(Debug)]
pub struct TransactionStats {
    pub total_transactions: usize,
    pub unique_senders: usize,
    pub earliest_block: Option<u64>,
    pub latest_block: Option<u64>,
    pub total_value: U256,
}
