//! Spatial projection — raw cluster coordinates into the display cube.
//!
//! Bounds are a function of the entire current working set, recomputed in
//! full on every change (the set can shrink as well as grow). Adding one
//! point can therefore shift every other point's position — an accepted
//! consequence of global min-max scaling, not a bug.

use crate::{
    record::{same_entity, EntityRecord},
    types::EntityId,
};
use serde::{Deserialize, Serialize};

/// Edge length of the display cube; coordinates land in [-10, 10].
pub const PROJECTION_SCALE: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub entity_id: EntityId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub highlighted: bool,
}

/// Project every record that carries coordinates.
///
/// Each axis is min-max normalized independently across the whole set,
/// then mapped via `(normalized - 0.5) * scale`. A degenerate axis
/// (max == min) maps every point to the midpoint 0 rather than dividing
/// by zero. At most one point is highlighted: the one whose identifier
/// matches `highlighted_id` under tolerant comparison.
pub fn project_points(
    records: &[EntityRecord],
    highlighted_id: Option<&str>,
) -> Vec<ProjectedPoint> {
    let located: Vec<(&EntityRecord, [f64; 3])> = records
        .iter()
        .filter_map(|r| r.coords.map(|c| (r, c)))
        .collect();

    if located.is_empty() {
        return Vec::new();
    }

    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for (_, coords) in &located {
        for axis in 0..3 {
            min[axis] = min[axis].min(coords[axis]);
            max[axis] = max[axis].max(coords[axis]);
        }
    }

    located
        .into_iter()
        .map(|(record, coords)| {
            let mut out = [0.0f64; 3];
            for axis in 0..3 {
                out[axis] = rescale(coords[axis], min[axis], max[axis]);
            }
            ProjectedPoint {
                entity_id: record.entity_id.clone(),
                x: out[0],
                y: out[1],
                z: out[2],
                highlighted: highlighted_id
                    .is_some_and(|id| same_entity(&record.entity_id, id)),
            }
        })
        .collect()
}

fn rescale(value: f64, min: f64, max: f64) -> f64 {
    let range = max - min;
    if range == 0.0 {
        return 0.0; // degenerate axis: everything at the midpoint
    }
    ((value - min) / range - 0.5) * PROJECTION_SCALE
}
