//! Write rules shared by every adapter. Each check runs against the stream as
//! loaded inside the write's transaction.

use chrono::{DateTime, Utc};
use tess_schemas::{AttributeStream, Bounds, NewIntervalRecord, RecordId, TemporalError};

pub(crate) fn check_insert(
    stream: &AttributeStream,
    new: &NewIntervalRecord,
) -> Result<(), TemporalError> {
    let key = &stream.key;
    if new.key != *key {
        return Err(TemporalError::constraint(format!(
            "record for {} checked against stream {key}",
            new.key
        )));
    }
    if new.value.attribute() != key.attribute {
        return Err(TemporalError::constraint(format!(
            "{key}: value of kind {} does not belong here",
            new.value.attribute()
        )));
    }
    if new.bounds.until < new.bounds.since {
        return Err(TemporalError::constraint(format!(
            "{key}: inverted bounds {}",
            new.bounds
        )));
    }
    if new.bounds.state().is_current() {
        if let Some(cur) = stream.current() {
            return Err(TemporalError::constraint(format!(
                "{key}: second Current record (existing {} since {})",
                cur.record_id, cur.valid_since
            )));
        }
    }
    let preceding = stream
        .records
        .iter()
        .rev()
        .find(|r| r.valid_since <= new.bounds.since);
    if let Some(p) = preceding {
        if p.valid_since == new.bounds.since {
            return Err(TemporalError::constraint(format!(
                "{key}: valid_since {} is not after preceding record {}",
                new.bounds.since, p.record_id
            )));
        }
    }
    Ok(())
}

/// Returns the index of the Current record to close.
pub(crate) fn check_close(
    stream: &AttributeStream,
    at: DateTime<Utc>,
) -> Result<usize, TemporalError> {
    let idx = stream
        .current_index()
        .ok_or_else(|| TemporalError::not_found(format!("Current record of {}", stream.key)))?;
    let cur = &stream.records[idx];
    if at < cur.valid_since {
        return Err(TemporalError::out_of_order(format!(
            "{}: close at {at} precedes Current since {}",
            stream.key, cur.valid_since
        )));
    }
    Ok(idx)
}

/// Returns the index of the record being repaired.
pub(crate) fn check_repair(
    stream: &AttributeStream,
    record_id: RecordId,
    bounds: Bounds,
) -> Result<usize, TemporalError> {
    let idx = stream
        .position_of(record_id)
        .ok_or_else(|| TemporalError::not_found(format!("record {record_id} in {}", stream.key)))?;
    if bounds.until < bounds.since {
        return Err(TemporalError::constraint(format!(
            "{}: inverted bounds {bounds} for {record_id}",
            stream.key
        )));
    }
    for (i, r) in stream.records.iter().enumerate() {
        if i == idx {
            continue;
        }
        if bounds.state().is_current() && r.is_current() {
            return Err(TemporalError::constraint(format!(
                "{}: repair of {record_id} would make a second Current record",
                stream.key
            )));
        }
        if r.valid_since == bounds.since {
            return Err(TemporalError::constraint(format!(
                "{}: repair of {record_id} duplicates valid_since of {}",
                stream.key, r.record_id
            )));
        }
    }
    Ok(idx)
}
