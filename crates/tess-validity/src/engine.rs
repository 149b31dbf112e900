use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tess_schemas::{
    open_ended, AttrValue, AttributeStream, Bounds, IntervalRecord, RecordId, TemporalError,
    ValidState, Violation,
};

/// One boundary rewrite performed on an in-memory stream.
///
/// Engine repairs are returned so callers can persist them through an adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryRepair {
    pub record_id: RecordId,
    pub before: Bounds,
    pub after: Bounds,
}

/// A discontinuity in a stream: `records[index]` ends before `records[index + 1]` starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryBreak {
    pub index: usize,
    pub break_end: DateTime<Utc>,
    pub break_start: DateTime<Utc>,
}

/// Tabular view of one record, as printed by the `history` command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub record_id: RecordId,
    pub value: String,
    pub valid_since: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// `true` when the next record starts exactly where this one ends (or this is the last).
    pub contiguous: bool,
    pub valid_state: ValidState,
    /// Whole days in effect; Current records count up to `now`.
    pub valid_days: i64,
}

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Add a version: close the Current record at `at` and append `[at, +inf)` Current.
///
/// - empty stream: the first record is appended
/// - Current present: `at` must be strictly after its `valid_since`
/// - no Current (closed or deactivated history): `at` must equal the end of
///   the last record, so the history stays contiguous
///
/// Returns the id given to the new record.
pub fn open_new_version(
    stream: &mut AttributeStream,
    value: AttrValue,
    at: DateTime<Utc>,
) -> Result<RecordId, TemporalError> {
    if value.attribute() != stream.key.attribute {
        return Err(TemporalError::constraint(format!(
            "value of kind {} cannot be added to {} stream {}",
            value.attribute(),
            stream.key.attribute,
            stream.key
        )));
    }
    if at >= open_ended() {
        return Err(TemporalError::out_of_order(format!(
            "version at {at} is not before the open-ended sentinel"
        )));
    }

    if let Some(idx) = stream.current_index() {
        let current = &stream.records[idx];
        if at <= current.valid_since {
            return Err(TemporalError::out_of_order(format!(
                "{}: new version at {at} is not after Current since {}",
                stream.key, current.valid_since
            )));
        }
        if current.value == value {
            return Err(TemporalError::constraint(format!(
                "{}: value {value} is already Current",
                stream.key
            )));
        }
    } else if let Some(last) = stream.last() {
        if at <= last.valid_since || at != last.valid_until {
            return Err(TemporalError::out_of_order(format!(
                "{}: new version at {at} does not start where the last record {} ends",
                stream.key,
                last.bounds()
            )));
        }
    }

    if let Some(idx) = stream.current_index() {
        let since = stream.records[idx].valid_since;
        stream.records[idx].set_bounds(Bounds::new(since, at));
    }

    let record_id = stream.next_record_id();
    stream.records.push(IntervalRecord {
        record_id,
        entity_id: stream.key.entity_id.clone(),
        attribute: stream.key.attribute,
        value,
        valid_since: at,
        valid_until: open_ended(),
        valid_state: ValidState::Current,
        registered: at,
    });
    stream.deactivated = false;
    Ok(record_id)
}

/// Close the Current record at `at` without opening a new one.
pub fn close_current(
    stream: &mut AttributeStream,
    at: DateTime<Utc>,
) -> Result<RecordId, TemporalError> {
    let idx = stream
        .current_index()
        .ok_or_else(|| TemporalError::not_found(format!("Current record of {}", stream.key)))?;
    let current = &mut stream.records[idx];
    if at < current.valid_since {
        return Err(TemporalError::out_of_order(format!(
            "{}: close at {at} precedes Current since {}",
            stream.key, current.valid_since
        )));
    }
    current.set_bounds(Bounds::new(current.valid_since, at));
    Ok(current.record_id)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Report every invariant violation in `stream`. Never mutates.
///
/// Output is sorted for deterministic comparison.
pub fn validate(stream: &AttributeStream) -> Vec<Violation> {
    let recs = &stream.records;
    let mut out = Vec::new();

    for (i, r) in recs.iter().enumerate() {
        if r.valid_until < r.valid_since {
            out.push(Violation::InvertedInterval { index: i });
        }
        if r.is_current() != r.is_open_ended() {
            out.push(Violation::StateMismatch { index: i });
        }
    }

    for (i, w) in recs.windows(2).enumerate() {
        let (a, b) = (&w[0], &w[1]);
        if b.valid_since <= a.valid_since {
            out.push(Violation::NonMonotonicSince { index: i });
        } else if a.valid_until > b.valid_since {
            out.push(Violation::Overlap { index: i });
        } else if a.valid_until < b.valid_since {
            out.push(Violation::Gap { index: i });
        }
    }

    let current: Vec<usize> = recs
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_current())
        .map(|(i, _)| i)
        .collect();
    if current.len() > 1 {
        out.push(Violation::MultipleCurrent { indices: current });
    } else if current.is_empty() && !recs.is_empty() && !stream.deactivated {
        out.push(Violation::NoCurrent);
    }

    out.sort();
    out
}

pub fn is_valid(stream: &AttributeStream) -> bool {
    validate(stream).is_empty()
}

// ---------------------------------------------------------------------------
// Repairs
// ---------------------------------------------------------------------------

fn neighbours(
    stream: &AttributeStream,
    index: usize,
) -> Result<(&IntervalRecord, &IntervalRecord), TemporalError> {
    match (stream.records.get(index), stream.records.get(index + 1)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(TemporalError::constraint(format!(
            "{}: no record pair at index {index} (stream has {} records)",
            stream.key,
            stream.len()
        ))),
    }
}

fn rewrite(stream: &mut AttributeStream, index: usize, after: Bounds) -> BoundaryRepair {
    let r = &mut stream.records[index];
    let before = r.bounds();
    r.set_bounds(after);
    BoundaryRepair {
        record_id: r.record_id,
        before,
        after,
    }
}

/// Extend `records[index].until` to `records[index + 1].since`.
pub fn repair_gap(
    stream: &mut AttributeStream,
    index: usize,
) -> Result<BoundaryRepair, TemporalError> {
    let (a, b) = neighbours(stream, index)?;
    if a.valid_until >= b.valid_since {
        return Err(TemporalError::constraint(format!(
            "{}: no gap after record {index}",
            stream.key
        )));
    }
    let after = Bounds::new(a.valid_since, b.valid_since);
    Ok(rewrite(stream, index, after))
}

/// Truncate `records[index].until` down to `records[index + 1].since`; the newer record wins.
pub fn repair_overlap(
    stream: &mut AttributeStream,
    index: usize,
) -> Result<BoundaryRepair, TemporalError> {
    let (a, b) = neighbours(stream, index)?;
    if a.valid_until <= b.valid_since {
        return Err(TemporalError::constraint(format!(
            "{}: no overlap after record {index}",
            stream.key
        )));
    }
    if b.valid_since <= a.valid_since {
        return Err(TemporalError::constraint(format!(
            "{}: records {index} and {} start together, truncation would invert",
            stream.key,
            index + 1
        )));
    }
    let after = Bounds::new(a.valid_since, b.valid_since);
    Ok(rewrite(stream, index, after))
}

/// Rewrite the boundaries of `records[index]` and re-validate.
///
/// The stream is re-sorted. If the rewrite introduces a violation that was not
/// already present, the stream is restored and `ConstraintViolation` returned.
pub fn repair_bounds(
    stream: &mut AttributeStream,
    index: usize,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<BoundaryRepair, TemporalError> {
    if index >= stream.len() {
        return Err(TemporalError::not_found(format!(
            "{}: record index {index}",
            stream.key
        )));
    }
    if until < since {
        return Err(TemporalError::constraint(format!(
            "{}: inverted bounds [{since}, {until})",
            stream.key
        )));
    }

    let saved = stream.records.clone();
    let before_violations = validate(stream);

    let repair = rewrite(stream, index, Bounds::new(since, until));
    let resorted = AttributeStream::new(stream.key.clone(), std::mem::take(&mut stream.records));
    stream.records = resorted.records;

    let introduced: Vec<Violation> = validate(stream)
        .into_iter()
        .filter(|v| !before_violations.contains(v))
        .collect();
    if !introduced.is_empty() {
        stream.records = saved;
        let detail: Vec<String> = introduced.iter().map(|v| v.to_string()).collect();
        return Err(TemporalError::constraint(format!(
            "{}: repair of {} to {} introduces: {}",
            stream.key,
            repair.record_id,
            repair.after,
            detail.join("; ")
        )));
    }
    Ok(repair)
}

/// Repair every overlap and gap, oldest first, until none remain that a
/// boundary truncation/extension can fix.
pub fn normalize(stream: &mut AttributeStream) -> Vec<BoundaryRepair> {
    let mut repairs = Vec::new();
    loop {
        let mut progressed = false;
        for v in validate(stream) {
            let attempt = match v {
                Violation::Overlap { index } => repair_overlap(stream, index),
                Violation::Gap { index } => repair_gap(stream, index),
                _ => continue,
            };
            if let Ok(r) = attempt {
                repairs.push(r);
                progressed = true;
                break;
            }
        }
        if !progressed {
            return repairs;
        }
    }
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

pub fn history_breaks(stream: &AttributeStream) -> Vec<HistoryBreak> {
    stream
        .records
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0].valid_until < w[1].valid_since)
        .map(|(index, w)| HistoryBreak {
            index,
            break_end: w[0].valid_until,
            break_start: w[1].valid_since,
        })
        .collect()
}

/// `true` when the newest record has been closed (no open-ended tail).
pub fn is_truncated(stream: &AttributeStream) -> bool {
    stream
        .last()
        .map(|r| r.valid_state == ValidState::Expired)
        .unwrap_or(false)
}

pub fn history_rows(stream: &AttributeStream, now: DateTime<Utc>) -> Vec<HistoryRow> {
    let recs = &stream.records;
    recs.iter()
        .enumerate()
        .map(|(i, r)| {
            let contiguous = recs
                .get(i + 1)
                .map(|next| next.valid_since == r.valid_until)
                .unwrap_or(true);
            let end = if r.is_open_ended() { now } else { r.valid_until };
            HistoryRow {
                record_id: r.record_id,
                value: r.value.to_string(),
                valid_since: r.valid_since,
                valid_until: r.valid_until,
                contiguous,
                valid_state: r.valid_state,
                valid_days: end.signed_duration_since(r.valid_since).num_days().max(0),
            }
        })
        .collect()
}
