//! tess-validity
//!
//! Validity-interval engine over a single [`AttributeStream`]:
//! - open a new version (closing the Current record at the same instant)
//! - validate the stream invariants (single Current, no overlap, no gap,
//!   strictly increasing `valid_since`)
//! - repair gaps and overlaps, one boundary at a time
//!
//! Plus read-only analyses used by the `check` tooling: history breaks,
//! name-history classification across entities and zero-point quality.
//!
//! Deterministic, pure logic. No IO.
//!
//! [`AttributeStream`]: tess_schemas::AttributeStream

mod classify;
mod engine;
mod quality;

pub use classify::{classify_names, HistoryClass, NameClassification};
pub use engine::*;
pub use quality::{zero_point_quality, ZpQuality, ZpQualityBands};
