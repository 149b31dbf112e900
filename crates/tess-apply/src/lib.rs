//! tess-apply
//!
//! Applies reconciliation changesets to one store.
//!
//! - one transaction per stream; any failure rolls back that stream only
//! - re-applying a changeset is a no-op (ops whose after-state is present are skipped)
//! - ops whose expected before-state is gone are rejected as stale
//! - the stream is re-validated before commit
//! - dry-run replays the same logic against an in-memory copy
//!
//! Applied operations are appended to the audit trail when one is attached.

mod applier;
mod ops;

pub use applier::{
    apply, open_version, Applier, ApplyFailure, ApplyReport, BatchReport, OpOutcome, OpReport,
    StreamOutcome,
};
pub use ops::{classify, OpState};
