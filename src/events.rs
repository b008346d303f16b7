use crate::repository::TransferEvent;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::Context;

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

pub fn decode_transfer_event(log: &Log) -> anyhow::Result<TransferEvent> {
    let log_data = log.data();
    let decoded = Transfer::decode_raw_log(log.topics(), &log_data.data)?;

    Ok(TransferEvent {
        tx_hash: log.transaction_hash.context("log is missing transaction hash")?,
        block_number: log.block_number.context("log is missing block number")?,
        log_index: log.log_index.context("log is missing log index")?,
        from: decoded.from,
        to: decoded.to,
        value: decoded.value,
    })
}
