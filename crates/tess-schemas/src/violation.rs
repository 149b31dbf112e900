use std::fmt;

use serde::{Deserialize, Serialize};

/// An invariant breach found by validation. Indices refer to the stream's
/// records in `valid_since` order; pairwise kinds name the earlier record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// `records[index].until > records[index + 1].since`.
    Overlap { index: usize },
    /// `records[index].until < records[index + 1].since`.
    Gap { index: usize },
    MultipleCurrent { indices: Vec<usize> },
    /// `records[index + 1].since <= records[index].since`.
    NonMonotonicSince { index: usize },
    InvertedInterval { index: usize },
    /// Current without the open-ended sentinel, or open-ended but Expired.
    StateMismatch { index: usize },
    /// Populated, not deactivated, and nothing is Current.
    NoCurrent,
}

impl Violation {
    pub fn kind(&self) -> &'static str {
        match self {
            Violation::Overlap { .. } => "overlap",
            Violation::Gap { .. } => "gap",
            Violation::MultipleCurrent { .. } => "multiple_current",
            Violation::NonMonotonicSince { .. } => "non_monotonic_since",
            Violation::InvertedInterval { .. } => "inverted_interval",
            Violation::StateMismatch { .. } => "state_mismatch",
            Violation::NoCurrent => "no_current",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Overlap { index } => write!(f, "overlap between records {index} and {}", index + 1),
            Violation::Gap { index } => write!(f, "gap between records {index} and {}", index + 1),
            Violation::MultipleCurrent { indices } => write!(f, "multiple Current records at {indices:?}"),
            Violation::NonMonotonicSince { index } => {
                write!(f, "valid_since does not increase after record {index}")
            }
            Violation::InvertedInterval { index } => write!(f, "record {index} ends before it starts"),
            Violation::StateMismatch { index } => {
                write!(f, "record {index} state disagrees with its valid_until")
            }
            Violation::NoCurrent => write!(f, "no Current record"),
        }
    }
}
