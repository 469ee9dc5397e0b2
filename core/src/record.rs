//! Record normalization — raw tabular rows in, typed entity records out.
//!
//! RULES:
//!   - A row with no usable identifier is dropped, silently. Partial data
//!     must never block the whole view.
//!   - "Absent" is a distinct state from "zero": the two required numeric
//!     columns must be present, but any present non-numeric value in an
//!     optional column coerces to 0.
//!   - NaN never leaves this module. Every numeric field on an
//!     EntityRecord is finite or None.

use crate::{error::VizResult, types::EntityId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw tabular row: column name → raw value (string, number, or null).
pub type RawRow = serde_json::Map<String, Value>;

/// Identifier column. A row without it is unusable.
pub const ID_COLUMN: &str = "ENTITY_ID";

/// Columns that must be *present* (not merely non-zero) for a row to be
/// accepted on the dashboard path.
pub const REQUIRED_COLUMNS: [&str; 2] = ["AVG_TRANSACTION_SIZE", "NUM_TRANSACTIONS"];

/// One entity's activity data. Created once per ingested row at load time,
/// immutable thereafter, discarded wholesale on re-fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    #[serde(default)]
    pub entity_type: Option<String>,

    // Activity fields. Absent or non-numeric source values are 0 here.
    #[serde(default)]
    pub total_volume: f64,
    #[serde(default)]
    pub avg_transaction_size: f64,
    #[serde(default)]
    pub num_transactions: f64,
    #[serde(default)]
    pub avg_tx_rate: f64,
    #[serde(default)]
    pub in_degree: f64,
    #[serde(default)]
    pub out_degree: f64,
    #[serde(default)]
    pub chain_depth: f64,
    #[serde(default)]
    pub large_tx_ratio: f64,
    #[serde(default)]
    pub micro_tx_ratio: f64,
    #[serde(default)]
    pub business_hours_txs: f64,

    // Maximum-statistic sources. Absent stays absent so an entity with no
    // reading is excluded from the maximum rather than dragging in a 0.
    #[serde(default)]
    pub peak_tx_rate: Option<f64>,
    #[serde(default)]
    pub max_transaction_size: Option<f64>,

    // Receive/spend totals (also present in the cluster database).
    #[serde(default)]
    pub total_btc_received: f64,
    #[serde(default)]
    pub total_btc_spent: f64,
    #[serde(default)]
    pub total_receive_transactions: f64,
    #[serde(default)]
    pub total_spend_transactions: f64,
    #[serde(default)]
    pub total_receive_addresses: f64,
    #[serde(default)]
    pub total_spend_addresses: f64,

    /// 3 principal-component coordinates, populated on the cluster path.
    #[serde(default)]
    pub coords: Option<[f64; 3]>,
    /// Dominant cluster assignment.
    #[serde(default)]
    pub cluster: Option<i64>,
    /// Membership probability per cluster, indexed by cluster - 1.
    #[serde(default)]
    pub cluster_probs: Vec<f64>,
}

impl EntityRecord {
    /// Combined received + spent volume.
    pub fn derived_volume(&self) -> f64 {
        self.total_btc_received + self.total_btc_spent
    }

    /// Combined receive + spend transaction count.
    pub fn derived_transaction_count(&self) -> f64 {
        self.total_receive_transactions + self.total_spend_transactions
    }

    /// Combined receive + spend address count.
    pub fn derived_address_count(&self) -> f64 {
        self.total_receive_addresses + self.total_spend_addresses
    }

    /// Membership probability of the dominant cluster, if assigned.
    pub fn membership_probability(&self) -> Option<f64> {
        let cluster = self.cluster?;
        if cluster < 1 {
            return None;
        }
        self.cluster_probs.get((cluster - 1) as usize).copied()
    }
}

/// Tolerant identifier equality. The CSV export carries numeric-string
/// ids while the cluster database stores integers; "123" and 123 must
/// match, so both sides are compared numerically when they parse.
pub fn same_entity(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Coerce a raw value to a finite number, if it is one.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Numeric field with the 0 default for optional columns.
fn num(row: &RawRow, column: &str) -> f64 {
    row.get(column).and_then(coerce_number).unwrap_or(0.0)
}

/// Numeric field that stays absent when missing or non-numeric.
fn opt_num(row: &RawRow, column: &str) -> Option<f64> {
    row.get(column).and_then(coerce_number)
}

/// Present means the column exists with a non-null value.
fn has_value(row: &RawRow, column: &str) -> bool {
    matches!(row.get(column), Some(v) if !v.is_null())
}

fn id_value(row: &RawRow) -> Option<EntityId> {
    match row.get(ID_COLUMN)? {
        // Integer ids stringify without a fractional part so they keep
        // matching their numeric-string spellings.
        Value::Number(n) if n.as_i64().is_some() => Some(n.as_i64().unwrap().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        _ => None,
    }
}

fn string_field(row: &RawRow, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Build one EntityRecord from a raw row. Returns None for rejected rows.
fn normalize_row(row: &RawRow) -> Option<EntityRecord> {
    let entity_id = id_value(row)?;
    for column in REQUIRED_COLUMNS {
        if !has_value(row, column) {
            return None;
        }
    }

    let coords = match (opt_num(row, "pc1"), opt_num(row, "pc2"), opt_num(row, "pc3")) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    };

    Some(EntityRecord {
        entity_id,
        entity_type: string_field(row, "ENTITY_TYPE"),
        total_volume: num(row, "TOTAL_VOLUME"),
        avg_transaction_size: num(row, "AVG_TRANSACTION_SIZE"),
        num_transactions: num(row, "NUM_TRANSACTIONS"),
        avg_tx_rate: num(row, "AVG_TX_RATE"),
        in_degree: num(row, "IN_DEGREE"),
        out_degree: num(row, "OUT_DEGREE"),
        chain_depth: num(row, "CHAIN_DEPTH"),
        large_tx_ratio: num(row, "LARGE_TX_RATIO"),
        micro_tx_ratio: num(row, "MICRO_TX_RATIO"),
        business_hours_txs: num(row, "BUSINESS_HOURS_TXS"),
        peak_tx_rate: opt_num(row, "PEAK_TX_RATE"),
        max_transaction_size: opt_num(row, "MAX_TRANSACTION_SIZE"),
        total_btc_received: num(row, "TOTAL_BTC_RECEIVED"),
        total_btc_spent: num(row, "TOTAL_BTC_SPENT"),
        // "RECIEVE" is the source column spelling.
        total_receive_transactions: num(row, "TOTAL_RECIEVE_TRANSACTIONS"),
        total_spend_transactions: num(row, "TOTAL_SPEND_TRANSACTIONS"),
        total_receive_addresses: num(row, "TOTAL_RECIEVE_ADDRESSES"),
        total_spend_addresses: num(row, "TOTAL_SPEND_ADDRESSES"),
        coords,
        cluster: opt_num(row, "cluster").map(|c| c as i64),
        cluster_probs: Vec::new(),
    })
}

/// Normalize raw rows into entity records.
///
/// Rejected rows (missing identifier or a required column) are dropped
/// without error. Output preserves input order and is capped at `cap`
/// accepted rows.
pub fn normalize_rows(rows: &[RawRow], cap: usize) -> Vec<EntityRecord> {
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in rows {
        if records.len() >= cap {
            break;
        }
        match normalize_row(row) {
            Some(record) => records.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("normalize: dropped {dropped} malformed rows, kept {}", records.len());
    }
    records
}

// ── CSV table parsing ────────────────────────────────────────────────────────

/// Parse CSV text into raw rows, header-keyed, with dynamic typing:
/// numeric-looking cells become numbers, empty cells become null, and
/// everything else stays a string. Empty lines are skipped. Short rows
/// simply lack the trailing columns.
pub fn parse_table(text: &str) -> Vec<RawRow> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header: Vec<String> = match lines.next() {
        Some(line) => line.split(',').map(|c| c.trim().to_string()).collect(),
        None => return Vec::new(),
    };

    let mut rows = Vec::new();
    for line in lines {
        let mut row = RawRow::new();
        for (column, cell) in header.iter().zip(line.split(',')) {
            row.insert(column.clone(), typed_cell(cell.trim()));
        }
        rows.push(row);
    }
    rows
}

fn typed_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(serde_json::Number::from(i));
    }
    if let Ok(n) = cell.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }
    Value::String(cell.to_string())
}

/// Read and parse a CSV table from disk.
pub fn load_table(path: &str) -> VizResult<Vec<RawRow>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_table(&text))
}
