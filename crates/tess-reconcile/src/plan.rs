use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tess_schemas::{AttributeStream, EntityId, StreamKey, TemporalError, Violation};
use tracing::{info, warn};

use crate::{reconcile_streams, Changeset, Conflict, ReconcileOptions, ReconcileOutcome, TrustDirection};

/// Order `(relational, document)` inputs as `(primary, secondary)`.
pub fn orient<T>(trust: TrustDirection, relational: T, document: T) -> (T, T) {
    match trust {
        TrustDirection::Relational => (relational, document),
        TrustDirection::Document => (document, relational),
    }
}

/// Which entities each store knows about.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDiff {
    pub only_primary: Vec<EntityId>,
    pub only_secondary: Vec<EntityId>,
    pub common: Vec<EntityId>,
}

impl EntityDiff {
    pub fn compute(primary: &[EntityId], secondary: &[EntityId]) -> Self {
        let p: BTreeSet<&EntityId> = primary.iter().collect();
        let s: BTreeSet<&EntityId> = secondary.iter().collect();
        Self {
            only_primary: p.difference(&s).map(|e| (*e).clone()).collect(),
            only_secondary: s.difference(&p).map(|e| (*e).clone()).collect(),
            common: p.intersection(&s).map(|e| (*e).clone()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamPlan {
    Planned(ReconcileOutcome),
    Unsafe {
        key: StreamKey,
        violations: Vec<Violation>,
    },
}

impl StreamPlan {
    pub fn key(&self) -> &StreamKey {
        match self {
            StreamPlan::Planned(o) => &o.changeset.key,
            StreamPlan::Unsafe { key, .. } => key,
        }
    }
}

/// Reconciliation of every stream found in either store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub entities: EntityDiff,
    /// Sorted by stream key.
    pub streams: Vec<StreamPlan>,
}

impl BatchPlan {
    /// Non-empty changesets, in stream order.
    pub fn changesets(&self) -> Vec<&Changeset> {
        self.streams
            .iter()
            .filter_map(|p| match p {
                StreamPlan::Planned(o) if !o.changeset.is_empty() => Some(&o.changeset),
                _ => None,
            })
            .collect()
    }

    pub fn conflicts(&self) -> Vec<&Conflict> {
        self.streams
            .iter()
            .filter_map(|p| match p {
                StreamPlan::Planned(o) => Some(o.conflicts.iter()),
                StreamPlan::Unsafe { .. } => None,
            })
            .flatten()
            .collect()
    }

    pub fn op_count(&self) -> usize {
        self.changesets().iter().map(|c| c.len()).sum()
    }

    pub fn unsafe_count(&self) -> usize {
        self.streams
            .iter()
            .filter(|p| matches!(p, StreamPlan::Unsafe { .. }))
            .count()
    }
}

/// Plan every stream present in either input. A stream missing on one side is
/// reconciled against an empty stream. Unsafe streams are reported, not fatal.
pub fn plan_batch(
    primary: &[AttributeStream],
    secondary: &[AttributeStream],
    opts: &ReconcileOptions,
) -> Result<BatchPlan, TemporalError> {
    let p: BTreeMap<&StreamKey, &AttributeStream> = primary.iter().map(|s| (&s.key, s)).collect();
    let s: BTreeMap<&StreamKey, &AttributeStream> = secondary.iter().map(|s| (&s.key, s)).collect();

    let entity_ids = |m: &BTreeMap<&StreamKey, &AttributeStream>| -> Vec<EntityId> {
        let set: BTreeSet<EntityId> = m.keys().map(|k| k.entity_id.clone()).collect();
        set.into_iter().collect()
    };
    let entities = EntityDiff::compute(&entity_ids(&p), &entity_ids(&s));

    let keys: BTreeSet<&StreamKey> = p.keys().chain(s.keys()).copied().collect();
    let mut streams = Vec::with_capacity(keys.len());
    for key in keys {
        let empty = AttributeStream::empty(key.clone());
        let ps = p.get(key).copied().unwrap_or(&empty);
        let ss = s.get(key).copied().unwrap_or(&empty);
        match reconcile_streams(ps, ss, opts) {
            Ok(outcome) => streams.push(StreamPlan::Planned(outcome)),
            Err(TemporalError::UnsafeChangeset { key, violations }) => {
                warn!(entity_id = %key.entity_id, attribute = %key.attribute, violations = violations.len(), "reconcile: stream left untouched");
                streams.push(StreamPlan::Unsafe { key, violations });
            }
            Err(e) => return Err(e),
        }
    }

    let plan = BatchPlan { entities, streams };
    info!(
        streams = plan.streams.len(),
        ops = plan.op_count(),
        conflicts = plan.conflicts().len(),
        unsafe_streams = plan.unsafe_count(),
        "reconcile: batch planned"
    );
    Ok(plan)
}
