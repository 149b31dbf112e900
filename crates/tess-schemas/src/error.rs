use std::fmt;

use crate::{StreamKey, Violation};

/// Error vocabulary shared by the engine, the adapters and the applier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemporalError {
    /// A write would break a stream invariant (second Current, duplicate since, ...).
    ConstraintViolation { reason: String },
    /// No record matched (unknown id, or no Current record to close).
    NotFound { what: String },
    /// A new version or a close does not come strictly after the Current record.
    OutOfOrder { reason: String },
    /// The stream resulting from a changeset would not validate.
    UnsafeChangeset {
        key: StreamKey,
        violations: Vec<Violation>,
    },
    /// Records the engine refuses to resolve on its own.
    Conflict { reason: String },
    /// Geocoding / timezone lookup failed. Never blocks non-location streams.
    EnrichmentUnavailable { reason: String },
    InvalidEntityId { raw: String },
    /// Store I/O failure.
    Backend { context: String, message: String },
}

impl TemporalError {
    pub fn constraint(reason: impl Into<String>) -> Self {
        TemporalError::ConstraintViolation {
            reason: reason.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        TemporalError::NotFound { what: what.into() }
    }

    pub fn out_of_order(reason: impl Into<String>) -> Self {
        TemporalError::OutOfOrder {
            reason: reason.into(),
        }
    }

    pub fn backend(context: impl Into<String>, err: impl fmt::Display) -> Self {
        TemporalError::Backend {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// Short stable label, used in report rows and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            TemporalError::ConstraintViolation { .. } => "constraint_violation",
            TemporalError::NotFound { .. } => "not_found",
            TemporalError::OutOfOrder { .. } => "out_of_order",
            TemporalError::UnsafeChangeset { .. } => "unsafe_changeset",
            TemporalError::Conflict { .. } => "conflict",
            TemporalError::EnrichmentUnavailable { .. } => "enrichment_unavailable",
            TemporalError::InvalidEntityId { .. } => "invalid_entity_id",
            TemporalError::Backend { .. } => "backend",
        }
    }
}

impl fmt::Display for TemporalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemporalError::ConstraintViolation { reason } => {
                write!(f, "constraint violation: {reason}")
            }
            TemporalError::NotFound { what } => write!(f, "not found: {what}"),
            TemporalError::OutOfOrder { reason } => write!(f, "out of order: {reason}"),
            TemporalError::UnsafeChangeset { key, violations } => {
                write!(f, "unsafe changeset for {key}:")?;
                for v in violations {
                    write!(f, " {v};")?;
                }
                Ok(())
            }
            TemporalError::Conflict { reason } => write!(f, "conflict: {reason}"),
            TemporalError::EnrichmentUnavailable { reason } => {
                write!(f, "enrichment unavailable: {reason}")
            }
            TemporalError::InvalidEntityId { raw } => {
                write!(f, "invalid entity id '{raw}' (expected six hex groups separated by ':')")
            }
            TemporalError::Backend { context, message } => {
                write!(f, "backend error ({context}): {message}")
            }
        }
    }
}

impl std::error::Error for TemporalError {}
