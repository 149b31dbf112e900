use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tess_schemas::{AttrValue, Bounds, IntervalRecord, RecordId, StreamKey, TemporalError};

/// Which store is authoritative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDirection {
    #[default]
    Relational,
    Document,
}

impl TrustDirection {
    pub fn parse(s: &str) -> Result<Self, TemporalError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" => Ok(TrustDirection::Relational),
            "document" => Ok(TrustDirection::Document),
            other => Err(TemporalError::constraint(format!(
                "invalid trust direction '{other}'. expected: relational | document"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustDirection::Relational => "relational",
            TrustDirection::Document => "document",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Boundaries closer than this are treated as equal; also widens pairing.
    pub tolerance: Duration,
    pub trust: TrustDirection,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            tolerance: Duration::zero(),
            trust: TrustDirection::Relational,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// One store-agnostic write. Every op carries the state it expects to find,
/// so a re-applied changeset can tell "already done" from "stale".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    Insert {
        value: AttrValue,
        bounds: Bounds,
        registered: DateTime<Utc>,
    },
    CloseCurrent {
        record_id: RecordId,
        before: Bounds,
        at: DateTime<Utc>,
    },
    Repair {
        record_id: RecordId,
        before: Bounds,
        after: Bounds,
    },
}

impl ChangeOp {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeOp::Insert { .. } => "insert",
            ChangeOp::CloseCurrent { .. } => "close_current",
            ChangeOp::Repair { .. } => "repair",
        }
    }

    /// Earliest `valid_since` touched; operations are ordered by it.
    pub fn affected_since(&self) -> DateTime<Utc> {
        match self {
            ChangeOp::Insert { bounds, .. } => bounds.since,
            ChangeOp::CloseCurrent { before, .. } => before.since,
            ChangeOp::Repair { before, after, .. } => before.since.min(after.since),
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            ChangeOp::Insert { .. } => None,
            ChangeOp::CloseCurrent { record_id, .. } | ChangeOp::Repair { record_id, .. } => {
                Some(*record_id)
            }
        }
    }

    pub fn before(&self) -> Option<Bounds> {
        match self {
            ChangeOp::Insert { .. } => None,
            ChangeOp::CloseCurrent { before, .. } | ChangeOp::Repair { before, .. } => {
                Some(*before)
            }
        }
    }

    pub fn after(&self) -> Bounds {
        match self {
            ChangeOp::Insert { bounds, .. } => *bounds,
            ChangeOp::CloseCurrent { before, at, .. } => Bounds::new(before.since, *at),
            ChangeOp::Repair { after, .. } => *after,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ChangeOp::CloseCurrent { .. } => 0,
            ChangeOp::Repair { .. } => 1,
            ChangeOp::Insert { .. } => 2,
        }
    }

    /// Total order used for changesets: affected since, then closes before
    /// repairs before inserts, then record id.
    pub fn order_key(&self) -> (DateTime<Utc>, u8, Option<RecordId>) {
        (self.affected_since(), self.rank(), self.record_id())
    }
}

/// Ordered operations against a single stream of the secondary store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub key: StreamKey,
    pub ops: Vec<ChangeOp>,
}

impl Changeset {
    pub fn new(key: StreamKey, mut ops: Vec<ChangeOp>) -> Self {
        ops.sort_by_key(|o| o.order_key());
        Self { key, ops }
    }

    pub fn empty(key: StreamKey) -> Self {
        Self {
            key,
            ops: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Secondary-only record with no primary corroboration.
    Uncorroborated,
    /// Secondary record overlaps a primary record holding a different value.
    ValueMismatch,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Uncorroborated => "uncorroborated",
            ConflictKind::ValueMismatch => "value_mismatch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub key: StreamKey,
    pub kind: ConflictKind,
    pub secondary: IntervalRecord,
    /// The disagreeing primary record, for `ValueMismatch`.
    pub primary: Option<IntervalRecord>,
}

/// Result of reconciling one stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub changeset: Changeset,
    pub conflicts: Vec<Conflict>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.changeset.is_empty() && self.conflicts.is_empty()
    }
}
