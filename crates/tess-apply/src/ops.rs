use tess_reconcile::ChangeOp;
use tess_schemas::{AttributeStream, TemporalError};

/// Where an operation stands against a stream's present state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OpState {
    /// Before-state present; the op can run.
    Pending,
    /// After-state already present.
    Done,
    /// Neither; the store moved on since the changeset was planned.
    Stale(TemporalError),
}

pub fn classify(stream: &AttributeStream, op: &ChangeOp) -> OpState {
    match op {
        ChangeOp::Insert { value, bounds, .. } => {
            let present = stream
                .records
                .iter()
                .any(|r| r.value == *value && r.bounds() == *bounds);
            if present {
                OpState::Done
            } else {
                OpState::Pending
            }
        }
        ChangeOp::CloseCurrent { record_id, before, .. } | ChangeOp::Repair { record_id, before, .. } => {
            let Some(r) = stream.records.iter().find(|r| r.record_id == *record_id) else {
                return OpState::Stale(TemporalError::not_found(format!(
                    "record {record_id} in {}",
                    stream.key
                )));
            };
            let after = op.after();
            if r.bounds() == after && r.valid_state == after.state() {
                OpState::Done
            } else if r.bounds() == *before {
                if matches!(op, ChangeOp::CloseCurrent { .. }) && !r.is_current() {
                    return OpState::Stale(TemporalError::constraint(format!(
                        "{}: record {record_id} is no longer Current",
                        stream.key
                    )));
                }
                OpState::Pending
            } else {
                OpState::Stale(TemporalError::constraint(format!(
                    "{}: record {record_id} is {}, expected {before}",
                    stream.key,
                    r.bounds()
                )))
            }
        }
    }
}
