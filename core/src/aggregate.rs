//! Aggregation engine — chart-ready series from entity records.
//!
//! Everything here is a pure function of its input slice: no caching, no
//! incremental update. Record sets are small (≤1000 on the dashboard
//! path, ≤25000 on the spatial path) so recomputing from scratch on every
//! change is fine.
//!
//! NaN policy: means over an empty set return `f64::NAN` as a sentinel.
//! Consumers render it as 0 or "—"; it must never feed further
//! arithmetic.

use crate::record::EntityRecord;
use serde::{Deserialize, Serialize};

/// Fixed histogram resolution in log10 space.
pub const HISTOGRAM_BIN_COUNT: usize = 30;

/// Fixed resolution of the linear volume distribution.
pub const VOLUME_BIN_COUNT: usize = 20;

/// Category label treated the same as an empty category.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

// ── Categorical distribution ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySlice {
    pub category: String,
    pub count: usize,
    /// Share of *all* records, rounded to one decimal. Slices of excluded
    /// categories are simply missing, so the column sums to ≤ 100.
    pub percentage: f64,
}

/// Frequency distribution of the entity-type field.
///
/// Empty and "Unknown" categories are excluded entirely (no bucket).
/// Sorted by count descending; ties keep first-encountered order.
pub fn entity_type_distribution(records: &[EntityRecord]) -> Vec<CategorySlice> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    // First-seen order makes the descending sort's tie-break stable.
    let mut counts: Vec<(String, usize)> = Vec::new();
    for record in records {
        let category = match &record.entity_type {
            Some(t) if !t.is_empty() && t != UNKNOWN_CATEGORY => t,
            _ => continue,
        };
        match counts.iter_mut().find(|(c, _)| c == category) {
            Some((_, n)) => *n += 1,
            None => counts.push((category.clone(), 1)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));

    counts
        .into_iter()
        .map(|(category, count)| CategorySlice {
            category,
            count,
            percentage: round1(count as f64 / total as f64 * 100.0),
        })
        .collect()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ── Log-scale histogram ──────────────────────────────────────────────────────

/// One fixed-width bin in log10 space. Bounds stay transformed; display
/// code inverse-transforms (`10^x`) for labels only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub x0: f64,
    pub x1: f64,
    pub count: usize,
}

/// 30-bin histogram of log10(avg transaction size).
///
/// Non-positive and non-finite sizes are excluded, not clamped. Bins are
/// half-open [x0, x1) except the last, which also includes the domain
/// maximum. An empty filtered set yields an empty series.
pub fn transaction_size_histogram(records: &[EntityRecord]) -> Vec<HistogramBin> {
    let values: Vec<f64> = records
        .iter()
        .map(|r| r.avg_transaction_size)
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(f64::log10)
        .collect();

    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let lo = min.floor();
    let mut hi = max.ceil();
    if hi <= lo {
        // Every value sits on one integer power of ten; widen so bins
        // keep nonzero width.
        hi = lo + 1.0;
    }

    let width = (hi - lo) / HISTOGRAM_BIN_COUNT as f64;
    let mut counts = vec![0usize; HISTOGRAM_BIN_COUNT];
    for value in &values {
        let index = (((value - lo) / width) as usize).min(HISTOGRAM_BIN_COUNT - 1);
        counts[index] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            x0: lo + i as f64 * width,
            // Pin the last edge to the domain bound exactly.
            x1: if i + 1 == HISTOGRAM_BIN_COUNT {
                hi
            } else {
                lo + (i + 1) as f64 * width
            },
            count,
        })
        .collect()
}

// ── Summary statistics ───────────────────────────────────────────────────────

/// The fixed dashboard statistics, recomputed together on every record-set
/// change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub total_volume: f64,
    pub avg_transaction_size: f64,
    pub total_transactions: f64,
    pub peak_tx_rate: f64,
    pub avg_in_degree: f64,
    pub avg_out_degree: f64,
    pub avg_chain_depth: f64,
    pub large_tx_ratio: f64,
    pub micro_tx_ratio: f64,
    pub business_hours_activity: f64,
    pub max_transaction_size: f64,
    pub avg_tx_rate: f64,
}

pub fn summary_statistics(records: &[EntityRecord]) -> SummaryStatistics {
    SummaryStatistics {
        total_volume: records.iter().map(|r| r.total_volume).sum(),
        avg_transaction_size: mean(records.iter().map(|r| r.avg_transaction_size)),
        total_transactions: records.iter().map(|r| r.num_transactions).sum(),
        peak_tx_rate: max_of(records.iter().filter_map(|r| r.peak_tx_rate)),
        avg_in_degree: mean(records.iter().map(|r| r.in_degree)),
        avg_out_degree: mean(records.iter().map(|r| r.out_degree)),
        avg_chain_depth: mean(records.iter().map(|r| r.chain_depth)),
        large_tx_ratio: mean(records.iter().map(|r| r.large_tx_ratio)),
        micro_tx_ratio: mean(records.iter().map(|r| r.micro_tx_ratio)),
        business_hours_activity: mean(records.iter().map(|r| r.business_hours_txs)),
        max_transaction_size: max_of(records.iter().filter_map(|r| r.max_transaction_size)),
        avg_tx_rate: mean(records.iter().map(|r| r.avg_tx_rate)),
    }
}

/// Arithmetic mean; NaN sentinel on an empty iterator.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (mut sum, mut n) = (0.0f64, 0usize);
    for value in values {
        sum += value;
        n += 1;
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Maximum over the values that exist; 0 when none do. Absent readings
/// are excluded upstream, not treated as 0.
fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))).unwrap_or(0.0)
}

/// Median of a value set.
///
/// Even-length input averages the two central values. `median(&[])` is
/// defined as NaN (the empty-mean sentinel), never a panic.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let middle = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[middle - 1] + sorted[middle]) / 2.0
    } else {
        sorted[middle]
    }
}

// ── Entity volume summary ────────────────────────────────────────────────────

/// One linear bin of the volume distribution, labeled by its lower bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBin {
    pub lower_bound: f64,
    pub count: usize,
}

/// Secondary summary over derived receive+spend volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityVolumeSummary {
    pub total_entities: usize,
    pub total_volume: f64,
    pub average_transactions: f64,
    pub median_transactions: f64,
    pub volume_distribution: Vec<VolumeBin>,
}

pub fn entity_volume_summary(records: &[EntityRecord]) -> EntityVolumeSummary {
    let volumes: Vec<f64> = records.iter().map(|r| r.derived_volume()).collect();
    let transaction_counts: Vec<f64> =
        records.iter().map(|r| r.derived_transaction_count()).collect();

    EntityVolumeSummary {
        total_entities: records.len(),
        total_volume: volumes.iter().sum(),
        average_transactions: mean(transaction_counts.iter().copied()),
        median_transactions: median(&transaction_counts),
        volume_distribution: volume_distribution(&volumes),
    }
}

/// 20 equal-width linear bins over [min, max]. The domain maximum lands
/// in the last bin; a zero-width domain puts every value in bin 0.
fn volume_distribution(volumes: &[f64]) -> Vec<VolumeBin> {
    if volumes.is_empty() {
        return Vec::new();
    }

    let min = volumes.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = volumes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / VOLUME_BIN_COUNT as f64;

    let mut counts = vec![0usize; VOLUME_BIN_COUNT];
    for volume in volumes {
        let index = if width > 0.0 {
            (((volume - min) / width) as usize).min(VOLUME_BIN_COUNT - 1)
        } else {
            0
        };
        counts[index] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| VolumeBin {
            lower_bound: min + i as f64 * width,
            count,
        })
        .collect()
}
