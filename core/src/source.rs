//! The data-source seam.
//!
//! Everything upstream of the pipeline — file reads, database queries,
//! whatever transport a deployment uses — sits behind this trait. The
//! production implementation is [`crate::store::ClusterStore`]; tests
//! drive the controller with scripted sources.

use crate::{
    error::VizResult,
    record::{EntityRecord, RawRow},
};

pub trait DataSource {
    /// Bulk tabular fetch for the dashboard path. Rows are raw; the
    /// record normalizer decides what survives.
    fn fetch_table(&mut self, path: &str) -> VizResult<Vec<RawRow>>;

    /// Up to `sample_size` records with coordinates and cluster
    /// probabilities populated. Fails with `VizError::Fetch` on transport
    /// or malformed-payload problems.
    fn fetch_cluster_sample(&mut self, sample_size: usize) -> VizResult<Vec<EntityRecord>>;

    /// Single record lookup. Fails with `VizError::NotFound` when no such
    /// identifier exists.
    fn fetch_entity_by_id(&mut self, entity_id: &str) -> VizResult<EntityRecord>;
}
