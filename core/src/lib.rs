//! chainlens-core — blockchain entity analytics.
//!
//! Turns tabular entity-activity records into chart-ready series
//! (categorical distribution, log-scale histogram, summary statistics)
//! and drives the 3D clustering view: min-max projection into a bounded
//! cube plus the interaction state machine (load, resample, search,
//! hover, select).
//!
//! The crate owns no rendering and no transport. Data comes in through
//! the [`source::DataSource`] seam; derived series and projected points
//! go out as plain values for a presentation layer to consume.

pub mod aggregate;
pub mod config;
pub mod controller;
pub mod error;
pub mod projector;
pub mod record;
pub mod source;
pub mod store;
pub mod types;
