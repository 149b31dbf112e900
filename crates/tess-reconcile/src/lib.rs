//! tess-reconcile
//!
//! Cross-store reconciliation of attribute histories.
//!
//! Given the same stream from a trusted (primary) and an untrusted (secondary)
//! store, a deterministic merge-walk pairs records by value and time and emits
//! the insert / close / repair operations that make the secondary agree with
//! the primary. Secondary-only records are never deleted; they are returned as
//! conflicts for human review.
//!
//! Deterministic, pure logic. No IO apart from writing review reports.

mod engine;
mod plan;
mod report;
mod types;

pub use engine::reconcile_streams;
pub use plan::{orient, plan_batch, BatchPlan, EntityDiff, StreamPlan};
pub use report::{review_rows, write_csv, write_json, ReviewRow};
pub use types::*;
