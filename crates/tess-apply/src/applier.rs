use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::json;
use tess_audit::AuditWriter;
use tess_reconcile::{ChangeOp, Changeset};
use tess_schemas::{AttrValue, Bounds, NewIntervalRecord, StreamKey, TemporalError};
use tess_store::{DocumentStore, IntervalStore};
use tess_validity::{open_new_version, validate};
use tracing::{info, warn};

use crate::ops::{classify, OpState};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    AlreadyApplied,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpReport {
    pub op_index: usize,
    pub kind: &'static str,
    pub outcome: OpOutcome,
}

/// Successful application (or dry-run) of one stream's changeset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyReport {
    pub key: StreamKey,
    pub dry_run: bool,
    pub ops: Vec<OpReport>,
    /// Set when the store committed but the audit trail could not record it.
    pub audit_error: Option<String>,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.ops
            .iter()
            .filter(|o| o.outcome == OpOutcome::Applied)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.ops.len() - self.applied()
    }
}

/// A stream whose changeset was rolled back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyFailure {
    pub key: StreamKey,
    /// Failing operation; `None` when post-apply validation failed.
    pub op_index: Option<usize>,
    pub reason: TemporalError,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op_index {
            Some(i) => write!(f, "{}: op {i} failed: {}", self.key, self.reason),
            None => write!(f, "{}: {}", self.key, self.reason),
        }
    }
}

impl std::error::Error for ApplyFailure {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    pub key: StreamKey,
    pub result: Result<ApplyReport, ApplyFailure>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub streams: Vec<StreamOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> Vec<&ApplyFailure> {
        self.streams
            .iter()
            .filter_map(|s| s.result.as_ref().err())
            .collect()
    }

    /// Committed streams whose audit append failed.
    pub fn audit_errors(&self) -> Vec<(&StreamKey, &str)> {
        self.streams
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .filter_map(|r| r.audit_error.as_deref().map(|e| (&r.key, e)))
            .collect()
    }

    pub fn applied_ops(&self) -> usize {
        self.streams
            .iter()
            .filter_map(|s| s.result.as_ref().ok())
            .map(|r| r.applied())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Applier
// ---------------------------------------------------------------------------

/// Changeset applier with an optional audit trail.
#[derive(Default)]
pub struct Applier {
    audit: Option<AuditWriter>,
}

impl Applier {
    pub fn new() -> Self {
        Self { audit: None }
    }

    pub fn with_audit(audit: AuditWriter) -> Self {
        Self { audit: Some(audit) }
    }

    pub fn audit(&self) -> Option<&AuditWriter> {
        self.audit.as_ref()
    }

    /// Apply one stream's changeset. Dry-run touches nothing in `store`.
    pub async fn apply(
        &mut self,
        changeset: &Changeset,
        store: &mut dyn IntervalStore,
        dry_run: bool,
    ) -> Result<ApplyReport, ApplyFailure> {
        let key = &changeset.key;
        let fail = |op_index: Option<usize>, reason: TemporalError| ApplyFailure {
            key: key.clone(),
            op_index,
            reason,
        };

        if dry_run {
            let stream = store.load_stream(key).await.map_err(|e| fail(None, e))?;
            let mut sim = DocumentStore::in_memory();
            sim.seed(stream);
            let report = run_in_tx(changeset, &mut sim).await;
            if let Err(f) = &report {
                warn!(
                    entity_id = %key.entity_id,
                    attribute = %key.attribute,
                    op_index = ?f.op_index,
                    reason = %f.reason,
                    "dry-run: changeset would fail"
                );
            }
            return report.map(|mut r| {
                r.dry_run = true;
                r
            });
        }

        match run_in_tx(changeset, store).await {
            Ok(mut report) => {
                info!(
                    entity_id = %key.entity_id,
                    attribute = %key.attribute,
                    applied = report.applied(),
                    skipped = report.skipped(),
                    "apply: stream committed"
                );
                if let Err(e) = self.record_applied(changeset, &report) {
                    warn!(
                        entity_id = %key.entity_id,
                        attribute = %key.attribute,
                        error = %format!("{e:#}"),
                        "audit: committed changeset not recorded"
                    );
                    report.audit_error = Some(format!("{e:#}"));
                }
                Ok(report)
            }
            Err(failure) => {
                warn!(
                    entity_id = %key.entity_id,
                    attribute = %key.attribute,
                    op_index = ?failure.op_index,
                    reason = %failure.reason,
                    "apply: stream rolled back"
                );
                if let Err(e) = self.record_rollback(&failure) {
                    warn!(
                        entity_id = %key.entity_id,
                        attribute = %key.attribute,
                        error = %format!("{e:#}"),
                        "audit: rollback not recorded"
                    );
                }
                Err(failure)
            }
        }
    }

    /// Apply many changesets; a failing stream does not stop the others.
    pub async fn apply_batch(
        &mut self,
        changesets: &[Changeset],
        store: &mut dyn IntervalStore,
        dry_run: bool,
    ) -> BatchReport {
        let mut streams = Vec::with_capacity(changesets.len());
        for cs in changesets {
            let result = self.apply(cs, store, dry_run).await;
            streams.push(StreamOutcome {
                key: cs.key.clone(),
                result,
            });
        }
        BatchReport { streams }
    }

    fn record_applied(&mut self, cs: &Changeset, report: &ApplyReport) -> anyhow::Result<()> {
        let Some(audit) = self.audit.as_mut() else {
            return Ok(());
        };
        for r in report.ops.iter().filter(|r| r.outcome == OpOutcome::Applied) {
            let op = &cs.ops[r.op_index];
            let payload = json!({ "op_index": r.op_index, "op": op });
            audit.append(&cs.key, op.kind(), payload)?;
        }
        Ok(())
    }

    fn record_rollback(&mut self, failure: &ApplyFailure) -> anyhow::Result<()> {
        let Some(audit) = self.audit.as_mut() else {
            return Ok(());
        };
        let payload = json!({
            "op_index": failure.op_index,
            "reason": failure.reason.to_string(),
            "error_kind": failure.reason.kind(),
        });
        audit.append(&failure.key, "rollback", payload)?;
        Ok(())
    }
}

/// All ops of one changeset in one store transaction, then validate, then commit.
async fn run_in_tx(
    changeset: &Changeset,
    store: &mut dyn IntervalStore,
) -> Result<ApplyReport, ApplyFailure> {
    let key = &changeset.key;
    store.begin(key).await.map_err(|e| ApplyFailure {
        key: key.clone(),
        op_index: None,
        reason: e,
    })?;

    match run_ops(changeset, store).await {
        Ok(ops) => {
            if let Err(e) = store.commit().await {
                if let Err(rb) = store.rollback().await {
                    warn!(entity_id = %key.entity_id, attribute = %key.attribute, error = %rb, "rollback after failed commit failed");
                }
                return Err(ApplyFailure {
                    key: key.clone(),
                    op_index: None,
                    reason: e,
                });
            }
            Ok(ApplyReport {
                key: key.clone(),
                dry_run: false,
                ops,
                audit_error: None,
            })
        }
        Err(failure) => {
            if let Err(e) = store.rollback().await {
                warn!(entity_id = %key.entity_id, attribute = %key.attribute, error = %e, "rollback failed");
            }
            Err(failure)
        }
    }
}

async fn run_ops(
    changeset: &Changeset,
    store: &mut dyn IntervalStore,
) -> Result<Vec<OpReport>, ApplyFailure> {
    let key = &changeset.key;
    let fail = |op_index: Option<usize>, reason: TemporalError| ApplyFailure {
        key: key.clone(),
        op_index,
        reason,
    };

    let mut reports = Vec::with_capacity(changeset.ops.len());
    for (i, op) in changeset.ops.iter().enumerate() {
        let stream = store.load_stream(key).await.map_err(|e| fail(Some(i), e))?;
        let outcome = match classify(&stream, op) {
            OpState::Done => OpOutcome::AlreadyApplied,
            OpState::Stale(reason) => return Err(fail(Some(i), reason)),
            OpState::Pending => {
                execute(key, op, store).await.map_err(|e| fail(Some(i), e))?;
                OpOutcome::Applied
            }
        };
        reports.push(OpReport {
            op_index: i,
            kind: op.kind(),
            outcome,
        });
    }

    let after = store.load_stream(key).await.map_err(|e| fail(None, e))?;
    let violations = validate(&after);
    if !violations.is_empty() {
        return Err(fail(
            None,
            TemporalError::UnsafeChangeset {
                key: key.clone(),
                violations,
            },
        ));
    }
    Ok(reports)
}

async fn execute(
    key: &StreamKey,
    op: &ChangeOp,
    store: &mut dyn IntervalStore,
) -> Result<(), TemporalError> {
    match op {
        ChangeOp::Insert {
            value,
            bounds,
            registered,
        } => {
            let rec = NewIntervalRecord::new(key.clone(), value.clone(), *bounds, *registered);
            store.insert(rec).await?;
        }
        ChangeOp::CloseCurrent { at, .. } => {
            store.close_current(key, *at).await?;
        }
        ChangeOp::Repair {
            record_id, after, ..
        } => {
            store.repair(*record_id, after.since, after.until).await?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Convenience entry points
// ---------------------------------------------------------------------------

/// Apply without an audit trail.
pub async fn apply(
    changeset: &Changeset,
    store: &mut dyn IntervalStore,
    dry_run: bool,
) -> Result<ApplyReport, ApplyFailure> {
    Applier::new().apply(changeset, store, dry_run).await
}

/// Add a new version of `key` through `store`: `close_current` + `insert`
/// planned by the validity engine against the stored stream.
pub async fn open_version(
    applier: &mut Applier,
    store: &mut dyn IntervalStore,
    key: &StreamKey,
    value: AttrValue,
    at: DateTime<Utc>,
    dry_run: bool,
) -> Result<ApplyReport, ApplyFailure> {
    let fail = |reason: TemporalError| ApplyFailure {
        key: key.clone(),
        op_index: None,
        reason,
    };

    let stream = store.load_stream(key).await.map_err(fail)?;
    let mut planned = stream.clone();
    open_new_version(&mut planned, value.clone(), at).map_err(fail)?;

    let mut ops = Vec::new();
    if let Some(cur) = stream.current() {
        ops.push(ChangeOp::CloseCurrent {
            record_id: cur.record_id,
            before: cur.bounds(),
            at,
        });
    }
    ops.push(ChangeOp::Insert {
        value,
        bounds: Bounds::open(at),
        registered: Utc::now(),
    });

    applier.apply(&Changeset::new(key.clone(), ops), store, dry_run).await
}
