//! Cluster interaction controller — the state machine behind the 3D view.
//!
//! RULES:
//!   - `InteractionState` is mutated only by controller methods. No
//!     ambient global, no external writer.
//!   - Completed fetches apply atomically: working set, loading flag and
//!     error are updated together, never observed half-updated.
//!   - Supersession: each load carries a monotonically increasing
//!     sequence number, and only a completion newer than everything
//!     applied so far may touch the working set. Last completion wins —
//!     by completion order, not issue order. A superseded completion
//!     still clears `loading`.
//!
//! Transitions: idle → loading → {idle-with-data, idle-with-error}.
//! Search stays outside the top-level loading indicator.

use crate::{
    error::VizResult,
    projector::{project_points, ProjectedPoint},
    record::{same_entity, EntityRecord},
    source::DataSource,
    types::EntityId,
};
use serde::{Deserialize, Serialize};

pub const SAMPLE_SIZE_MIN: usize = 100;
pub const SAMPLE_SIZE_MAX: usize = 25_000;

/// Everything the 3D view owns. Snapshot-serializable for IPC consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionState {
    pub working_set: Vec<EntityRecord>,
    pub highlighted_id: Option<EntityId>,
    pub hovered: Option<EntityRecord>,
    pub selected: Option<EntityRecord>,
    pub sample_size: usize,
    pub loading: bool,
    pub error: Option<String>,
}

/// Ticket for one in-flight load. Returned by [`ClusterController::begin_load`]
/// and redeemed at [`ClusterController::complete_load`].
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest {
    sequence: u64,
    pub sample_size: usize,
}

impl LoadRequest {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

pub struct ClusterController {
    state: InteractionState,
    issued_sequence: u64,
    applied_sequence: u64,
}

impl ClusterController {
    /// Initial state: loading, empty working set, no selection.
    pub fn new(sample_size: usize) -> Self {
        Self {
            state: InteractionState {
                working_set: Vec::new(),
                highlighted_id: None,
                hovered: None,
                selected: None,
                sample_size: sample_size.clamp(SAMPLE_SIZE_MIN, SAMPLE_SIZE_MAX),
                loading: true,
                error: None,
            },
            issued_sequence: 0,
            applied_sequence: 0,
        }
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    /// Issue a load ticket for the current sample size and enter the
    /// loading state. The caller performs the fetch and redeems the
    /// ticket with `complete_load`.
    pub fn begin_load(&mut self) -> LoadRequest {
        self.issued_sequence += 1;
        self.state.loading = true;
        LoadRequest {
            sequence: self.issued_sequence,
            sample_size: self.state.sample_size,
        }
    }

    /// Apply one load completion.
    ///
    /// Clears `loading` unconditionally. The payload is applied only if
    /// this ticket is newer than every completion applied so far; on
    /// success the working set is replaced wholesale and the error
    /// cleared, on failure the error is recorded and the previous
    /// working set kept.
    pub fn complete_load(&mut self, request: LoadRequest, result: VizResult<Vec<EntityRecord>>) {
        self.state.loading = false;

        if request.sequence <= self.applied_sequence {
            log::debug!(
                "load seq={} superseded (newest applied: {}), dropping response",
                request.sequence,
                self.applied_sequence,
            );
            return;
        }
        self.applied_sequence = request.sequence;

        match result {
            Ok(records) => {
                log::info!("loaded {} cluster points (seq={})", records.len(), request.sequence);
                self.state.working_set = records;
                self.state.error = None;
            }
            Err(e) => {
                log::warn!("load seq={} failed: {e}", request.sequence);
                self.state.error = Some(e.to_string());
            }
        }
    }

    /// Fetch a fresh sample at the current sample size, replacing the
    /// working set on success.
    pub fn load(&mut self, source: &mut dyn DataSource) {
        let request = self.begin_load();
        let result = source.fetch_cluster_sample(request.sample_size);
        self.complete_load(request, result);
    }

    /// Re-issue the last load. The user-visible retry action.
    pub fn retry(&mut self, source: &mut dyn DataSource) {
        self.load(source);
    }

    /// Change the sample size and refetch. Out-of-range sizes clamp into
    /// [SAMPLE_SIZE_MIN, SAMPLE_SIZE_MAX]. Full replacement, never a merge.
    pub fn resample(&mut self, source: &mut dyn DataSource, sample_size: usize) {
        let clamped = sample_size.clamp(SAMPLE_SIZE_MIN, SAMPLE_SIZE_MAX);
        if clamped != sample_size {
            log::debug!("sample size {sample_size} clamped to {clamped}");
        }
        self.state.sample_size = clamped;
        self.load(source);
    }

    /// Look up one entity and bring it into the view.
    ///
    /// No-op on an empty identifier. On success the fetched record joins
    /// the working set unless an equal identifier is already present (no
    /// duplicates), becomes the selection, and its id becomes the
    /// highlight. On failure only `error` changes — the scene, highlight
    /// and selection survive a failed search.
    pub fn search_by_id(&mut self, source: &mut dyn DataSource, entity_id: &str) {
        let entity_id = entity_id.trim();
        if entity_id.is_empty() {
            return;
        }

        match source.fetch_entity_by_id(entity_id) {
            Ok(record) => {
                let already_present = self
                    .state
                    .working_set
                    .iter()
                    .any(|r| same_entity(&r.entity_id, &record.entity_id));
                if !already_present {
                    self.state.working_set.push(record.clone());
                }
                // The record's own id is the canonical spelling.
                self.state.highlighted_id = Some(record.entity_id.clone());
                self.state.selected = Some(record);
                self.state.error = None;
            }
            Err(e) => {
                log::warn!("search for entity {entity_id} failed: {e}");
                self.state.error = Some(e.to_string());
            }
        }
    }

    /// Pointer moved over a point (or off the geometry: `None`). Pure
    /// state update.
    pub fn hover(&mut self, point: Option<EntityRecord>) {
        self.state.hovered = point;
    }

    /// Renderer-side click selection.
    pub fn select(&mut self, point: EntityRecord) {
        self.state.selected = Some(point);
    }

    /// Derive the point-cloud geometry from the current state.
    pub fn projected_points(&self) -> Vec<ProjectedPoint> {
        project_points(&self.state.working_set, self.state.highlighted_id.as_deref())
    }
}
