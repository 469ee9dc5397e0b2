//! SQLite cluster database.
//!
//! RULE: Only store.rs talks to the database. The controller and the
//! aggregation engine see records and raw rows, never SQL.
//!
//! Sampling is deterministic: the id shuffle flows through a Pcg64Mcg
//! seeded at open time, so a given (database, seed, sample size) always
//! yields the same working set.

use crate::{
    controller::SAMPLE_SIZE_MAX,
    error::{VizError, VizResult},
    record::{load_table, EntityRecord, RawRow},
    source::DataSource,
    types::EntityId,
};
use rand::{seq::SliceRandom, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Number of membership-probability columns in the schema.
pub const CLUSTER_COLUMN_COUNT: usize = 12;

pub struct ClusterStore {
    conn: Connection,
    rng: Pcg64Mcg,
}

/// Per-cluster aggregates for the cluster overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStats {
    pub cluster: i64,
    pub count: i64,
    pub avg_btc_received: f64,
    pub max_btc_received: f64,
    pub avg_btc_spent: f64,
    pub max_btc_spent: f64,
    pub avg_receive_transactions: f64,
    pub avg_spend_transactions: f64,
    pub avg_pc1: f64,
    pub avg_pc2: f64,
    pub avg_pc3: f64,
}

/// Global bounds used for scene scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizationStats {
    pub min_pc1: f64,
    pub max_pc1: f64,
    pub min_pc2: f64,
    pub max_pc2: f64,
    pub min_pc3: f64,
    pub max_pc3: f64,
    pub num_clusters: i64,
    pub min_btc: f64,
    pub max_btc: f64,
}

impl ClusterStore {
    pub fn open(path: &str, seed: u64) -> VizResult<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn,
            rng: Pcg64Mcg::seed_from_u64(seed),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory(seed: u64) -> VizResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self {
            conn,
            rng: Pcg64Mcg::seed_from_u64(seed),
        })
    }

    /// Apply the schema.
    pub fn migrate(&self) -> VizResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_entity_clusters.sql"))?;
        Ok(())
    }

    /// Insert or replace one entity row. Used by import tooling and tests.
    pub fn insert_entity(&self, record: &EntityRecord) -> VizResult<()> {
        let entity_id = numeric_id(&record.entity_id)?;
        let coords = record.coords.unwrap_or([0.0; 3]);
        let prob = |i: usize| record.cluster_probs.get(i).copied().unwrap_or(0.0);

        self.conn.execute(
            "INSERT OR REPLACE INTO entity_clusters (
                entity_id,
                total_receive_addresses, total_receive_transactions, total_btc_received,
                total_spend_addresses, total_spend_transactions, total_btc_spent,
                pc1, pc2, pc3, cluster,
                cluster_1, cluster_2, cluster_3, cluster_4, cluster_5, cluster_6,
                cluster_7, cluster_8, cluster_9, cluster_10, cluster_11, cluster_12
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                       ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                entity_id,
                record.total_receive_addresses,
                record.total_receive_transactions,
                record.total_btc_received,
                record.total_spend_addresses,
                record.total_spend_transactions,
                record.total_btc_spent,
                coords[0],
                coords[1],
                coords[2],
                record.cluster.unwrap_or(0),
                prob(0), prob(1), prob(2), prob(3), prob(4), prob(5),
                prob(6), prob(7), prob(8), prob(9), prob(10), prob(11),
            ],
        )?;
        Ok(())
    }

    pub fn entity_count(&self) -> VizResult<i64> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM entity_clusters", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Per-cluster aggregates, ordered by cluster id.
    pub fn cluster_stats(&self) -> VizResult<Vec<ClusterStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT cluster, COUNT(*),
                    AVG(total_btc_received), MAX(total_btc_received),
                    AVG(total_btc_spent), MAX(total_btc_spent),
                    AVG(total_receive_transactions), AVG(total_spend_transactions),
                    AVG(pc1), AVG(pc2), AVG(pc3)
             FROM entity_clusters
             GROUP BY cluster
             ORDER BY cluster",
        )?;
        let stats = stmt
            .query_map([], |row| {
                Ok(ClusterStats {
                    cluster: row.get(0)?,
                    count: row.get(1)?,
                    avg_btc_received: row.get(2)?,
                    max_btc_received: row.get(3)?,
                    avg_btc_spent: row.get(4)?,
                    max_btc_spent: row.get(5)?,
                    avg_receive_transactions: row.get(6)?,
                    avg_spend_transactions: row.get(7)?,
                    avg_pc1: row.get(8)?,
                    avg_pc2: row.get(9)?,
                    avg_pc3: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }

    /// Axis and volume bounds across the whole table.
    pub fn visualization_stats(&self) -> VizResult<VisualizationStats> {
        let stats = self.conn.query_row(
            "SELECT MIN(pc1), MAX(pc1), MIN(pc2), MAX(pc2), MIN(pc3), MAX(pc3),
                    COUNT(DISTINCT cluster), MIN(total_btc_received), MAX(total_btc_received)
             FROM entity_clusters",
            [],
            |row| {
                Ok(VisualizationStats {
                    min_pc1: row.get(0)?,
                    max_pc1: row.get(1)?,
                    min_pc2: row.get(2)?,
                    max_pc2: row.get(3)?,
                    min_pc3: row.get(4)?,
                    max_pc3: row.get(5)?,
                    num_clusters: row.get(6)?,
                    min_btc: row.get(7)?,
                    max_btc: row.get(8)?,
                })
            },
        )?;
        Ok(stats)
    }

    fn all_entity_ids(&self) -> VizResult<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT entity_id FROM entity_clusters ORDER BY entity_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn entity_by_numeric_id(&self, entity_id: i64) -> VizResult<Option<EntityRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entity_clusters WHERE entity_id = ?1"),
                params![entity_id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

const ENTITY_COLUMNS: &str = "entity_id,
    total_receive_addresses, total_receive_transactions, total_btc_received,
    total_spend_addresses, total_spend_transactions, total_btc_spent,
    pc1, pc2, pc3, cluster,
    cluster_1, cluster_2, cluster_3, cluster_4, cluster_5, cluster_6,
    cluster_7, cluster_8, cluster_9, cluster_10, cluster_11, cluster_12";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<EntityRecord> {
    let entity_id: i64 = row.get(0)?;
    let mut cluster_probs = Vec::with_capacity(CLUSTER_COLUMN_COUNT);
    for i in 0..CLUSTER_COLUMN_COUNT {
        cluster_probs.push(row.get(11 + i)?);
    }

    Ok(EntityRecord {
        entity_id: entity_id.to_string(),
        total_receive_addresses: row.get(1)?,
        total_receive_transactions: row.get(2)?,
        total_btc_received: row.get(3)?,
        total_spend_addresses: row.get(4)?,
        total_spend_transactions: row.get(5)?,
        total_btc_spent: row.get(6)?,
        coords: Some([row.get(7)?, row.get(8)?, row.get(9)?]),
        cluster: Some(row.get(10)?),
        cluster_probs,
        ..EntityRecord::default()
    })
}

fn numeric_id(entity_id: &EntityId) -> VizResult<i64> {
    entity_id
        .trim()
        .parse::<i64>()
        .map_err(|_| VizError::NotFound {
            entity_id: entity_id.clone(),
        })
}

impl DataSource for ClusterStore {
    fn fetch_table(&mut self, path: &str) -> VizResult<Vec<RawRow>> {
        load_table(path)
    }

    /// Deterministic random sample: shuffle all ids with the seeded RNG
    /// and take the first `sample_size`. The server-side cap of 25000
    /// applies regardless of what the caller asks for.
    fn fetch_cluster_sample(&mut self, sample_size: usize) -> VizResult<Vec<EntityRecord>> {
        let sample_size = sample_size.min(SAMPLE_SIZE_MAX);

        let mut ids = self.all_entity_ids()?;
        ids.shuffle(&mut self.rng);
        ids.truncate(sample_size);

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.entity_by_numeric_id(id)? {
                records.push(record);
            }
        }
        log::debug!("sampled {} of requested {} cluster points", records.len(), sample_size);
        Ok(records)
    }

    fn fetch_entity_by_id(&mut self, entity_id: &str) -> VizResult<EntityRecord> {
        let numeric = numeric_id(&entity_id.to_string())?;
        self.entity_by_numeric_id(numeric)?
            .ok_or_else(|| VizError::NotFound {
                entity_id: entity_id.to_string(),
            })
    }
}
