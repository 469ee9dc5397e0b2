use chainlens_core::controller::{ClusterController, SAMPLE_SIZE_MAX, SAMPLE_SIZE_MIN};
use chainlens_core::error::{VizError, VizResult};
use chainlens_core::record::{EntityRecord, RawRow};
use chainlens_core::source::DataSource;
use std::collections::VecDeque;

// ── Scripted data source ─────────────────────────────────────────────────────

/// Serves pre-queued sample batches and a fixed entity lookup table.
/// An empty queue simulates a transport failure.
struct StubSource {
    batches: VecDeque<Vec<EntityRecord>>,
    entities: Vec<EntityRecord>,
    sample_calls: usize,
}

impl StubSource {
    fn new() -> Self {
        Self {
            batches: VecDeque::new(),
            entities: Vec::new(),
            sample_calls: 0,
        }
    }

    fn queue_batch(&mut self, records: Vec<EntityRecord>) {
        self.batches.push_back(records);
    }

    fn with_entity(mut self, record: EntityRecord) -> Self {
        self.entities.push(record);
        self
    }
}

impl DataSource for StubSource {
    fn fetch_table(&mut self, _path: &str) -> VizResult<Vec<RawRow>> {
        Ok(Vec::new())
    }

    fn fetch_cluster_sample(&mut self, _sample_size: usize) -> VizResult<Vec<EntityRecord>> {
        self.sample_calls += 1;
        self.batches.pop_front().ok_or(VizError::Fetch {
            message: "connection refused".into(),
        })
    }

    fn fetch_entity_by_id(&mut self, entity_id: &str) -> VizResult<EntityRecord> {
        self.entities
            .iter()
            .find(|r| chainlens_core::record::same_entity(&r.entity_id, entity_id))
            .cloned()
            .ok_or_else(|| VizError::NotFound {
                entity_id: entity_id.to_string(),
            })
    }
}

fn point(id: u64) -> EntityRecord {
    EntityRecord {
        entity_id: id.to_string(),
        coords: Some([id as f64, 0.0, 1.0]),
        cluster: Some(1),
        cluster_probs: vec![0.9, 0.1],
        ..EntityRecord::default()
    }
}

fn points(ids: std::ops::Range<u64>) -> Vec<EntityRecord> {
    ids.map(point).collect()
}

// ── Load / resample ──────────────────────────────────────────────────────────

/// Initial state: loading with an empty working set.
#[test]
fn starts_loading_and_empty() {
    let controller = ClusterController::new(1000);
    let state = controller.state();
    assert!(state.loading);
    assert!(state.working_set.is_empty());
    assert_eq!(state.sample_size, 1000);
    assert!(state.error.is_none());
}

/// A successful load replaces the working set, clears the error and
/// leaves the loading state.
#[test]
fn load_replaces_working_set() {
    let mut source = StubSource::new();
    source.queue_batch(points(0..5));

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.working_set.len(), 5);
    assert!(state.error.is_none());
}

/// A failed load surfaces the error but keeps the previous data.
#[test]
fn failed_load_keeps_previous_data() {
    let mut source = StubSource::new();
    source.queue_batch(points(0..5));

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);
    controller.load(&mut source); // queue empty → fetch failure

    let state = controller.state();
    assert!(!state.loading);
    assert_eq!(state.working_set.len(), 5, "stale-but-valid data retained");
    assert!(state.error.as_deref().unwrap_or("").contains("connection refused"));
}

/// Retry re-issues the last load; a success clears the error.
#[test]
fn retry_clears_error_on_success() {
    let mut source = StubSource::new();
    let mut controller = ClusterController::new(1000);

    controller.load(&mut source); // fails
    assert!(controller.state().error.is_some());

    source.queue_batch(points(0..3));
    controller.retry(&mut source);
    assert!(controller.state().error.is_none());
    assert_eq!(controller.state().working_set.len(), 3);
    assert_eq!(source.sample_calls, 2);
}

/// Resampling fully replaces the working set — never a merge.
#[test]
fn resample_replaces_not_merges() {
    let mut source = StubSource::new();
    source.queue_batch(points(0..100));
    source.queue_batch(points(1000..1500));

    let mut controller = ClusterController::new(100);
    controller.load(&mut source);
    assert_eq!(controller.state().working_set.len(), 100);

    controller.resample(&mut source, 25_000);
    let state = controller.state();
    assert_eq!(state.sample_size, 25_000);
    assert_eq!(state.working_set.len(), 500);
    assert!(state.working_set.iter().all(|r| r.entity_id.parse::<u64>().unwrap() >= 1000));
}

/// Out-of-range sample sizes clamp into [100, 25000].
#[test]
fn resample_clamps_sample_size() {
    let mut source = StubSource::new();
    source.queue_batch(points(0..1));
    source.queue_batch(points(0..1));

    let mut controller = ClusterController::new(1000);
    controller.resample(&mut source, 5);
    assert_eq!(controller.state().sample_size, SAMPLE_SIZE_MIN);

    controller.resample(&mut source, 1_000_000);
    assert_eq!(controller.state().sample_size, SAMPLE_SIZE_MAX);
}

// ── Supersession ─────────────────────────────────────────────────────────────

/// Only the most recently *completed* request wins. A stale in-flight
/// response must not overwrite a newer one, whatever order the two were
/// issued in.
#[test]
fn stale_completion_is_dropped() {
    let mut controller = ClusterController::new(1000);

    let first = controller.begin_load();
    let second = controller.begin_load();

    controller.complete_load(second, Ok(points(100..110)));
    assert_eq!(controller.state().working_set.len(), 10);

    // The older request resolves late; its payload is discarded.
    controller.complete_load(first, Ok(points(0..50)));
    let state = controller.state();
    assert_eq!(state.working_set.len(), 10);
    assert!(state.working_set.iter().all(|r| r.entity_id.parse::<u64>().unwrap() >= 100));
}

/// Completions in issue order both apply; the newest still wins.
#[test]
fn in_order_completions_apply_sequentially() {
    let mut controller = ClusterController::new(1000);

    let first = controller.begin_load();
    let second = controller.begin_load();

    controller.complete_load(first, Ok(points(0..5)));
    assert_eq!(controller.state().working_set.len(), 5);

    controller.complete_load(second, Ok(points(10..13)));
    assert_eq!(controller.state().working_set.len(), 3);
}

/// Loading clears on every completion, superseded or not.
#[test]
fn superseded_completion_still_clears_loading() {
    let mut controller = ClusterController::new(1000);

    let first = controller.begin_load();
    let second = controller.begin_load();
    controller.complete_load(second, Ok(points(0..2)));
    assert!(!controller.state().loading);

    let third = controller.begin_load();
    assert!(controller.state().loading);
    controller.complete_load(first, Ok(points(5..9)));
    assert!(!controller.state().loading);
    assert_eq!(controller.state().working_set.len(), 2, "stale payload dropped");

    controller.complete_load(third, Ok(points(20..24)));
    assert_eq!(controller.state().working_set.len(), 4);
}

/// A stale *failure* must not clobber newer data with its error either.
#[test]
fn stale_failure_does_not_set_error() {
    let mut controller = ClusterController::new(1000);

    let first = controller.begin_load();
    let second = controller.begin_load();
    controller.complete_load(second, Ok(points(0..2)));

    controller.complete_load(
        first,
        Err(VizError::Fetch {
            message: "timeout".into(),
        }),
    );
    assert!(controller.state().error.is_none());
    assert_eq!(controller.state().working_set.len(), 2);
}

// ── Search ───────────────────────────────────────────────────────────────────

/// A found entity joins the working set, becomes the selection, and its
/// id becomes the highlight.
#[test]
fn search_appends_highlights_and_selects() {
    let mut source = StubSource::new().with_entity(point(77));
    source.queue_batch(points(0..3));

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);
    controller.search_by_id(&mut source, "77");

    let state = controller.state();
    assert_eq!(state.working_set.len(), 4);
    assert_eq!(state.highlighted_id.as_deref(), Some("77"));
    assert_eq!(state.selected.as_ref().unwrap().entity_id, "77");
    assert!(state.error.is_none());

    let highlighted: Vec<_> = controller
        .projected_points()
        .into_iter()
        .filter(|p| p.highlighted)
        .collect();
    assert_eq!(highlighted.len(), 1);
    assert_eq!(highlighted[0].entity_id, "77");
}

/// Searching for an entity already in the set never duplicates it.
#[test]
fn search_is_idempotent() {
    let mut source = StubSource::new().with_entity(point(1));
    source.queue_batch(points(0..3)); // already contains id 1

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);

    controller.search_by_id(&mut source, "1");
    assert_eq!(controller.state().working_set.len(), 3);
    controller.search_by_id(&mut source, "1");
    assert_eq!(controller.state().working_set.len(), 3);
}

/// A failed search sets the error and touches nothing else — the scene,
/// highlight and selection survive.
#[test]
fn failed_search_preserves_scene() {
    let mut source = StubSource::new().with_entity(point(1));
    source.queue_batch(points(0..3));

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);
    controller.search_by_id(&mut source, "1");

    controller.search_by_id(&mut source, "404");
    let state = controller.state();
    assert!(state.error.as_deref().unwrap_or("").contains("404"));
    assert_eq!(state.working_set.len(), 3);
    assert_eq!(state.highlighted_id.as_deref(), Some("1"));
    assert_eq!(state.selected.as_ref().unwrap().entity_id, "1");
    assert!(!state.loading, "search stays outside the loading indicator");
}

/// An empty identifier is a no-op, not an error.
#[test]
fn search_with_empty_id_is_a_no_op() {
    let mut source = StubSource::new();
    let mut controller = ClusterController::new(1000);

    controller.search_by_id(&mut source, "");
    controller.search_by_id(&mut source, "   ");
    assert!(controller.state().error.is_none());
    assert!(controller.state().selected.is_none());
}

/// Numeric-string spellings match existing integer ids — no duplicate
/// insertion for " 2 " when id 2 is present.
#[test]
fn search_matches_across_id_spellings() {
    let mut source = StubSource::new().with_entity(point(2));
    source.queue_batch(points(0..3));

    let mut controller = ClusterController::new(1000);
    controller.load(&mut source);
    controller.search_by_id(&mut source, " 2 ");
    assert_eq!(controller.state().working_set.len(), 3);
}

// ── Hover / select ───────────────────────────────────────────────────────────

/// Hover is a pure state update: set on enter, cleared on exit.
#[test]
fn hover_sets_and_clears() {
    let mut controller = ClusterController::new(1000);

    controller.hover(Some(point(5)));
    assert_eq!(controller.state().hovered.as_ref().unwrap().entity_id, "5");

    controller.hover(None);
    assert!(controller.state().hovered.is_none());
}

#[test]
fn select_sets_selection() {
    let mut controller = ClusterController::new(1000);
    controller.select(point(9));
    assert_eq!(controller.state().selected.as_ref().unwrap().entity_id, "9");
}

/// Sample size below the minimum at construction is clamped too.
#[test]
fn constructor_clamps_sample_size() {
    let controller = ClusterController::new(1);
    assert_eq!(controller.state().sample_size, SAMPLE_SIZE_MIN);
}
