//! Builders shared by scenario tests across the workspace.
//!
//! Timestamps are expressed in whole hours after a fixed epoch so scenarios
//! read like the `T0`, `T1`, ... notation used in reviews.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fs;
use tess_schemas::{
    open_ended, AttrValue, Attribute, AttributeStream, Bounds, EntityId, IntervalRecord,
    RecordId, StreamKey, ValidState,
};

/// Fixed scenario epoch: 2020-01-01T00:00:00Z.
pub const EPOCH_SECS: i64 = 1_577_836_800;

pub const MAC_A: &str = "5C:CF:7F:76:06:DB";
pub const MAC_B: &str = "18:FE:34:CF:E9:A3";

/// `T<n>`: epoch + n hours.
pub fn ts(n: i64) -> DateTime<Utc> {
    match Utc.timestamp_opt(EPOCH_SECS, 0).single() {
        Some(t) => t + Duration::hours(n),
        None => DateTime::<Utc>::MIN_UTC,
    }
}

/// The open-ended sentinel.
pub fn inf() -> DateTime<Utc> {
    open_ended()
}

pub fn mac(raw: &str) -> EntityId {
    match EntityId::parse(raw) {
        Ok(id) => id,
        Err(e) => panic!("testkit: bad mac {raw}: {e}"),
    }
}

pub fn key(raw_mac: &str, attribute: Attribute) -> StreamKey {
    StreamKey::new(mac(raw_mac), attribute)
}

pub fn name_key(raw_mac: &str) -> StreamKey {
    key(raw_mac, Attribute::Name)
}

/// Value shorthand for a name stream (`v("V1")`).
pub fn v(name: &str) -> AttrValue {
    AttrValue::name(name)
}

/// A record whose state follows `until`.
pub fn rec(
    id: i64,
    key: &StreamKey,
    value: AttrValue,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> IntervalRecord {
    IntervalRecord {
        record_id: RecordId(id),
        entity_id: key.entity_id.clone(),
        attribute: key.attribute,
        value,
        valid_since: since,
        valid_until: until,
        valid_state: ValidState::for_until(until),
        registered: since,
    }
}

/// A record with an explicit (possibly inconsistent) state.
pub fn rec_with_state(
    id: i64,
    key: &StreamKey,
    value: AttrValue,
    bounds: Bounds,
    state: ValidState,
) -> IntervalRecord {
    let mut r = rec(id, key, value, bounds.since, bounds.until);
    r.valid_state = state;
    r
}

/// Build a stream from `(value, since_hour, until_hour)` triples; `None` means open-ended.
/// Ids are assigned 1.. in the given order.
pub fn stream(key: &StreamKey, spans: &[(&str, i64, Option<i64>)]) -> AttributeStream {
    let records = spans
        .iter()
        .enumerate()
        .map(|(i, (value, since, until))| {
            let until = until.map(ts).unwrap_or_else(inf);
            rec(i as i64 + 1, key, v(value), ts(*since), until)
        })
        .collect();
    AttributeStream::new(key.clone(), records)
}

/// Same as [`stream`] with ids offset by `first_id - 1`, for two-store scenarios.
pub fn stream_from(
    first_id: i64,
    key: &StreamKey,
    spans: &[(&str, i64, Option<i64>)],
) -> AttributeStream {
    let mut s = stream(key, spans);
    for r in &mut s.records {
        r.record_id = RecordId(r.record_id.0 + first_id - 1);
    }
    s
}

/// `(value, since, until)` view of a stream, for compact assertions.
pub fn spans(stream: &AttributeStream) -> Vec<(String, DateTime<Utc>, DateTime<Utc>, ValidState)> {
    stream
        .records
        .iter()
        .map(|r| (r.value.to_string(), r.valid_since, r.valid_until, r.valid_state))
        .collect()
}

pub fn load_stream_json(path: &str) -> Result<AttributeStream> {
    let s = fs::read_to_string(path).with_context(|| format!("read stream: {path}"))?;
    let stream: AttributeStream = serde_json::from_str(&s).context("parse stream json")?;
    Ok(stream)
}
