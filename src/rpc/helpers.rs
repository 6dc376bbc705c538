//! Parsing helpers for `eth_getBlockByNumber` responses.

use crate::backfill::RawBlock;
use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Formats a block number as a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Parses a JSON-RPC quantity such as `"0x1b4"`.
pub fn parse_quantity(quantity: &str) -> Result<u64> {
    let digits = quantity
        .strip_prefix("0x")
        .or_else(|| quantity.strip_prefix("0X"))
        .with_context(|| format!("quantity {quantity:?} is missing the 0x prefix"))?;
    if digits.is_empty() {
        bail!("quantity {quantity:?} has no digits");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid quantity {quantity:?}"))
}

fn quantity_field(block: &Value, field: &str) -> Result<u64> {
    let raw = block
        .get(field)
        .and_then(Value::as_str)
        .with_context(|| format!("block is missing the {field} field"))?;
    parse_quantity(raw).with_context(|| format!("failed to parse block {field}"))
}

/// Converts one block object into a [`RawBlock`], checking that the node answered for
/// `expected_number`. Timestamps are reported in seconds and stored in milliseconds.
pub fn raw_block_from_value(expected_number: u64, block: Value) -> Result<RawBlock> {
    let number = quantity_field(&block, "number")?;
    if number != expected_number {
        bail!("requested block {expected_number} but node returned block {number}");
    }
    let timestamp_secs = quantity_field(&block, "timestamp")?;

    Ok(RawBlock {
        number,
        timestamp_ms: timestamp_secs.saturating_mul(1_000),
        payload: block,
    })
}
