//! Runtime configuration.
//!
//! All values have working defaults; a JSON config file can override any
//! subset of them. Chart shape constants (bin counts, projection scale)
//! are NOT configurable — they live as consts next to the code that uses
//! them so the output geometry is stable across runs.

use crate::error::VizResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VizConfig {
    /// CSV file with one row per entity (dashboard path).
    #[serde(default = "default_table_path")]
    pub table_path: String,

    /// SQLite database with clustering results (3D view path).
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Accepted-row cap for the dashboard table. Display-volume guard,
    /// not a correctness requirement.
    #[serde(default = "default_row_cap")]
    pub dashboard_row_cap: usize,

    /// Initial sample size for the 3D cluster view.
    #[serde(default = "default_cluster_sample")]
    pub cluster_sample_size: usize,

    /// Seed for the deterministic cluster-sample shuffle.
    #[serde(default = "default_sample_seed")]
    pub sample_seed: u64,
}

fn default_table_path() -> String {
    "data/entity_activity.csv".into()
}

fn default_db_path() -> String {
    "data/entity_clusters.db".into()
}

fn default_row_cap() -> usize {
    1000
}

fn default_cluster_sample() -> usize {
    1000
}

fn default_sample_seed() -> u64 {
    42
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
            db_path: default_db_path(),
            dashboard_row_cap: default_row_cap(),
            cluster_sample_size: default_cluster_sample(),
            sample_seed: default_sample_seed(),
        }
    }
}

impl VizConfig {
    /// Load config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> VizResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: VizConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }
}
