use chrono::{DateTime, Duration, Utc};
use tess_schemas::{AttributeStream, IntervalRecord, TemporalError};
use tess_validity::validate;
use tracing::debug;

use crate::{ChangeOp, Changeset, Conflict, ConflictKind, ReconcileOptions, ReconcileOutcome};

fn within(a: DateTime<Utc>, b: DateTime<Utc>, tol: Duration) -> bool {
    (a - b).abs() <= tol
}

/// Same value and (overlapping, or starting within tolerance of each other).
fn corroborates(p: &IntervalRecord, s: &IntervalRecord, tol: Duration) -> bool {
    p.value == s.value && (p.overlaps(s) || within(p.valid_since, s.valid_since, tol))
}

fn equivalent(p: &IntervalRecord, s: &IntervalRecord, tol: Duration) -> bool {
    p.valid_state == s.valid_state
        && within(p.valid_since, s.valid_since, tol)
        && within(p.valid_until, s.valid_until, tol)
}

/// Pair each secondary record with the earliest unpaired primary record that
/// corroborates it. Both streams are walked in `valid_since` order.
fn pair(
    primary: &[IntervalRecord],
    secondary: &[IntervalRecord],
    tol: Duration,
) -> Vec<Option<usize>> {
    let mut taken = vec![false; primary.len()];
    secondary
        .iter()
        .map(|s| {
            let hit = (0..primary.len()).find(|&i| !taken[i] && corroborates(&primary[i], s, tol));
            if let Some(i) = hit {
                taken[i] = true;
            }
            hit
        })
        .collect()
}

/// Compute the changeset that makes `secondary` agree with `primary`.
///
/// Both streams must share a key and should already be normalized. If the
/// secondary stream that would result from the changeset does not validate,
/// `UnsafeChangeset` is returned and nothing is planned.
pub fn reconcile_streams(
    primary: &AttributeStream,
    secondary: &AttributeStream,
    opts: &ReconcileOptions,
) -> Result<ReconcileOutcome, TemporalError> {
    if primary.key != secondary.key {
        return Err(TemporalError::constraint(format!(
            "cannot reconcile {} against {}",
            primary.key, secondary.key
        )));
    }
    let key = &secondary.key;
    let tol = opts.tolerance;
    let pairs = pair(&primary.records, &secondary.records, tol);

    let mut ops: Vec<ChangeOp> = Vec::new();
    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut hypothetical = secondary.clone();
    hypothetical.deactivated = secondary.deactivated || primary.deactivated;

    // 1) Paired records: repair the secondary side to the primary's bounds.
    for (si, pi) in pairs.iter().enumerate() {
        let s = &secondary.records[si];
        let Some(pi) = pi else {
            continue;
        };
        let p = &primary.records[*pi];
        if equivalent(p, s, tol) {
            continue;
        }

        let closes_only = s.is_current() && !p.is_current() && within(p.valid_since, s.valid_since, tol);
        let op = if closes_only {
            ChangeOp::CloseCurrent {
                record_id: s.record_id,
                before: s.bounds(),
                at: p.valid_until,
            }
        } else {
            ChangeOp::Repair {
                record_id: s.record_id,
                before: s.bounds(),
                after: p.bounds(),
            }
        };
        hypothetical.records[si].set_bounds(op.after());
        ops.push(op);
    }

    // 2) Unpaired primary records: insert where the secondary has room.
    let paired: Vec<usize> = pairs.iter().flatten().copied().collect();
    for (pi, p) in primary.records.iter().enumerate() {
        if paired.contains(&pi) {
            continue;
        }
        // Occupied by a secondary record with another value; reported below.
        // A zero-length retired record strictly inside `p` occupies it too,
        // which usually leaves a gap and makes the plan unsafe.
        if hypothetical.records.iter().any(|h| h.overlaps(p)) {
            continue;
        }
        let op = ChangeOp::Insert {
            value: p.value.clone(),
            bounds: p.bounds(),
            registered: p.registered,
        };
        let mut placeholder = p.clone();
        placeholder.record_id = hypothetical.next_record_id();
        hypothetical.records.push(placeholder);
        ops.push(op);
    }

    // 3) Unpaired secondary records: never deleted, surfaced as conflicts.
    for (si, s) in secondary.records.iter().enumerate() {
        if pairs[si].is_some() {
            continue;
        }
        let clash = primary
            .records
            .iter()
            .find(|p| p.value != s.value && p.overlaps(s));
        conflicts.push(Conflict {
            key: key.clone(),
            kind: if clash.is_some() {
                ConflictKind::ValueMismatch
            } else {
                ConflictKind::Uncorroborated
            },
            secondary: s.clone(),
            primary: clash.cloned(),
        });
    }

    let hypothetical = AttributeStream::new(key.clone(), hypothetical.records)
        .with_deactivated(hypothetical.deactivated);
    let violations = validate(&hypothetical);
    if !violations.is_empty() {
        debug!(entity_id = %key.entity_id, attribute = %key.attribute, violations = violations.len(), "reconcile: unsafe changeset");
        return Err(TemporalError::UnsafeChangeset {
            key: key.clone(),
            violations,
        });
    }

    debug!(
        entity_id = %key.entity_id,
        attribute = %key.attribute,
        ops = ops.len(),
        conflicts = conflicts.len(),
        "reconcile: stream planned"
    );
    Ok(ReconcileOutcome {
        changeset: Changeset::new(key.clone(), ops),
        conflicts,
    })
}
