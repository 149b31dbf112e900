use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityId, TemporalError};

/// Epoch seconds of `2999-12-31T23:59:59Z`, the `valid_until` of every Current record.
pub const OPEN_ENDED_TS: i64 = 32_503_679_999;

/// Zero points are stored in thousandths of a magnitude (no floats in comparisons).
pub const ZP_SCALE: i64 = 1_000;

/// The open-ended sentinel as a timestamp.
pub fn open_ended() -> DateTime<Utc> {
    match Utc.timestamp_opt(OPEN_ENDED_TS, 0).single() {
        Some(t) => t,
        None => DateTime::<Utc>::MAX_UTC,
    }
}

// ---------------------------------------------------------------------------
// Attribute
// ---------------------------------------------------------------------------

/// Which versioned attribute of a photometer a stream tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Name,
    ZeroPoint,
    Location,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Name, Attribute::ZeroPoint, Attribute::Location];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Name => "name",
            Attribute::ZeroPoint => "zero_point",
            Attribute::Location => "location",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TemporalError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Attribute::Name),
            "zero_point" | "zp" => Ok(Attribute::ZeroPoint),
            "location" => Ok(Attribute::Location),
            other => Err(TemporalError::ConstraintViolation {
                reason: format!(
                    "invalid attribute '{other}'. expected one of: name | zero_point | location"
                ),
            }),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Value payload
// ---------------------------------------------------------------------------

/// Attribute payload carried by an interval record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttrValue {
    Name { name: String },
    ZeroPoint { zp_milli: i64, filter: String },
    Location { location_id: i64 },
}

impl AttrValue {
    pub fn name(name: impl Into<String>) -> Self {
        AttrValue::Name { name: name.into() }
    }

    pub fn zero_point(zp_milli: i64, filter: impl Into<String>) -> Self {
        AttrValue::ZeroPoint {
            zp_milli,
            filter: filter.into(),
        }
    }

    pub fn location(location_id: i64) -> Self {
        AttrValue::Location { location_id }
    }

    pub fn attribute(&self) -> Attribute {
        match self {
            AttrValue::Name { .. } => Attribute::Name,
            AttrValue::ZeroPoint { .. } => Attribute::ZeroPoint,
            AttrValue::Location { .. } => Attribute::Location,
        }
    }

    /// Parse a CLI-style value for `attribute`.
    ///
    /// - name: the raw string
    /// - zero_point: `"<zp>"` or `"<zp>/<filter>"`, e.g. `"20.44/UV/IR-740"`
    /// - location: integer location id
    pub fn parse_for(attribute: Attribute, raw: &str) -> Result<Self, TemporalError> {
        let raw = raw.trim();
        match attribute {
            Attribute::Name => {
                if raw.is_empty() {
                    return Err(TemporalError::ConstraintViolation {
                        reason: "name value must not be empty".to_string(),
                    });
                }
                Ok(AttrValue::name(raw))
            }
            Attribute::ZeroPoint => {
                let (zp, filter) = match raw.split_once('/') {
                    Some((zp, filter)) => (zp, filter),
                    None => (raw, "UV/IR-740"),
                };
                Ok(AttrValue::zero_point(parse_zero_point(zp)?, filter.trim()))
            }
            Attribute::Location => {
                let id = raw
                    .parse::<i64>()
                    .map_err(|_| TemporalError::ConstraintViolation {
                        reason: format!("invalid location id '{raw}'"),
                    })?;
                Ok(AttrValue::location(id))
            }
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Name { name } => write!(f, "{name}"),
            AttrValue::ZeroPoint { zp_milli, filter } => {
                write!(f, "{}/{filter}", format_zero_point(*zp_milli))
            }
            AttrValue::Location { location_id } => write!(f, "location#{location_id}"),
        }
    }
}

/// Parse a decimal zero point (`"20.44"`) into thousandths without going through floats.
pub fn parse_zero_point(raw: &str) -> Result<i64, TemporalError> {
    let bad = || TemporalError::ConstraintViolation {
        reason: format!("invalid zero point '{raw}'"),
    };

    let s = raw.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() || frac_part.len() > 3 {
        return Err(bad());
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(bad());
    }

    let int_val: i64 = int_part.parse().map_err(|_| bad())?;
    let mut frac = frac_part.to_string();
    while frac.len() < 3 {
        frac.push('0');
    }
    let frac_val: i64 = frac.parse().map_err(|_| bad())?;

    let v = int_val
        .checked_mul(ZP_SCALE)
        .and_then(|x| x.checked_add(frac_val))
        .ok_or_else(bad)?;
    Ok(if neg { -v } else { v })
}

pub fn format_zero_point(zp_milli: i64) -> String {
    let sign = if zp_milli < 0 { "-" } else { "" };
    let abs = zp_milli.abs();
    format!("{sign}{}.{:02}", abs / ZP_SCALE, (abs % ZP_SCALE) / 10)
}

// ---------------------------------------------------------------------------
// Validity state
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValidState {
    Current,
    Expired,
}

impl ValidState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidState::Current => "Current",
            ValidState::Expired => "Expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self, TemporalError> {
        match s {
            "Current" => Ok(ValidState::Current),
            "Expired" => Ok(ValidState::Expired),
            other => Err(TemporalError::ConstraintViolation {
                reason: format!("invalid valid_state: {other}"),
            }),
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, ValidState::Current)
    }

    /// State implied by a `valid_until` value: Current iff open-ended.
    pub fn for_until(valid_until: DateTime<Utc>) -> Self {
        if valid_until == open_ended() {
            ValidState::Current
        } else {
            ValidState::Expired
        }
    }
}

// ---------------------------------------------------------------------------
// Keys and records
// ---------------------------------------------------------------------------

/// Store-assigned record identifier. Opaque to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one attribute stream: `(entity_id, attribute)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamKey {
    pub entity_id: EntityId,
    pub attribute: Attribute,
}

impl StreamKey {
    pub fn new(entity_id: EntityId, attribute: Attribute) -> Self {
        Self {
            entity_id,
            attribute,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.attribute)
    }
}

/// Half-open validity window `[since, until)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bounds {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Bounds {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since, until }
    }

    pub fn open(since: DateTime<Utc>) -> Self {
        Self::new(since, open_ended())
    }

    pub fn state(&self) -> ValidState {
        ValidState::for_until(self.until)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let until = if self.until == open_ended() {
            "+inf".to_string()
        } else {
            self.until.to_rfc3339()
        };
        write!(f, "[{}, {})", self.since.to_rfc3339(), until)
    }
}

/// Persisted shape: `(entity_id, attribute, value, valid_since, valid_until, valid_state, registered)`
/// plus the store's record id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub record_id: RecordId,
    pub entity_id: EntityId,
    pub attribute: Attribute,
    pub value: AttrValue,
    pub valid_since: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub valid_state: ValidState,
    /// Audit only; never used in interval math.
    pub registered: DateTime<Utc>,
}

impl IntervalRecord {
    pub fn key(&self) -> StreamKey {
        StreamKey::new(self.entity_id.clone(), self.attribute)
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.valid_since, self.valid_until)
    }

    /// Half-open overlap: `A.since < B.until && B.since < A.until`.
    ///
    /// A zero-length record `[t, t)` overlaps any record whose window
    /// strictly contains `t`.
    pub fn overlaps(&self, other: &IntervalRecord) -> bool {
        self.valid_since < other.valid_until && other.valid_since < self.valid_until
    }

    pub fn is_current(&self) -> bool {
        self.valid_state == ValidState::Current
    }

    pub fn is_open_ended(&self) -> bool {
        self.valid_until == open_ended()
    }

    pub fn duration(&self) -> Duration {
        self.valid_until.signed_duration_since(self.valid_since)
    }

    /// Rewrite boundaries; state follows `until`.
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.valid_since = bounds.since;
        self.valid_until = bounds.until;
        self.valid_state = bounds.state();
    }
}

/// A record not yet persisted. The store assigns the id; state follows `valid_until`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIntervalRecord {
    pub key: StreamKey,
    pub value: AttrValue,
    pub bounds: Bounds,
    pub registered: DateTime<Utc>,
}

impl NewIntervalRecord {
    pub fn new(key: StreamKey, value: AttrValue, bounds: Bounds, registered: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            bounds,
            registered,
        }
    }

    pub fn into_record(self, record_id: RecordId) -> IntervalRecord {
        IntervalRecord {
            record_id,
            entity_id: self.key.entity_id,
            attribute: self.key.attribute,
            value: self.value,
            valid_since: self.bounds.since,
            valid_until: self.bounds.until,
            valid_state: self.bounds.state(),
            registered: self.registered,
        }
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// Ordered history of one attribute of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStream {
    pub key: StreamKey,
    /// Sorted by `valid_since` ascending.
    pub records: Vec<IntervalRecord>,
    /// A deactivated entity may legitimately have no Current record.
    #[serde(default)]
    pub deactivated: bool,
}

impl AttributeStream {
    pub fn empty(key: StreamKey) -> Self {
        Self {
            key,
            records: Vec::new(),
            deactivated: false,
        }
    }

    /// Builds a stream, sorting by `(valid_since, record_id)` so ties stay deterministic.
    pub fn new(key: StreamKey, mut records: Vec<IntervalRecord>) -> Self {
        records.sort_by(|a, b| {
            a.valid_since
                .cmp(&b.valid_since)
                .then(a.record_id.cmp(&b.record_id))
        });
        Self {
            key,
            records,
            deactivated: false,
        }
    }

    pub fn with_deactivated(mut self, deactivated: bool) -> Self {
        self.deactivated = deactivated;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The last record flagged Current, if any.
    pub fn current(&self) -> Option<&IntervalRecord> {
        self.records.iter().rev().find(|r| r.is_current())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.records.iter().rposition(|r| r.is_current())
    }

    pub fn last(&self) -> Option<&IntervalRecord> {
        self.records.last()
    }

    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        self.records.iter().position(|r| r.record_id == id)
    }

    /// Value in effect at instant `t`, if any.
    pub fn value_at(&self, t: DateTime<Utc>) -> Option<&AttrValue> {
        self.records
            .iter()
            .find(|r| r.valid_since <= t && t < r.valid_until)
            .map(|r| &r.value)
    }

    /// Next record id not used by this stream (for in-memory planning).
    pub fn next_record_id(&self) -> RecordId {
        RecordId(
            self.records
                .iter()
                .map(|r| r.record_id.0)
                .max()
                .unwrap_or(0)
                + 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + h * 3600, 0).single().unwrap()
    }

    fn rec(id: i64, since: DateTime<Utc>, until: DateTime<Utc>) -> IntervalRecord {
        IntervalRecord {
            record_id: RecordId(id),
            entity_id: EntityId::parse("AA:BB:CC:DD:EE:FF").unwrap(),
            attribute: Attribute::Name,
            value: AttrValue::name("stars1"),
            valid_since: since,
            valid_until: until,
            valid_state: ValidState::for_until(until),
            registered: since,
        }
    }

    #[test]
    fn sentinel_is_year_2999() {
        assert_eq!(open_ended().to_rfc3339(), "2999-12-31T23:59:59+00:00");
    }

    #[test]
    fn overlaps_is_half_open() {
        let a = rec(1, t(0), t(5));
        let b = rec(2, t(5), open_ended());
        let c = rec(3, t(4), t(6));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn zero_duration_inside_window_overlaps() {
        let a = rec(1, t(0), t(5));
        let z = rec(2, t(3), t(3));
        assert!(a.overlaps(&z));
        assert!(z.overlaps(&a));

        // At either edge of the window it does not.
        assert!(!a.overlaps(&rec(3, t(0), t(0))));
        assert!(!a.overlaps(&rec(4, t(5), t(5))));
    }

    #[test]
    fn zero_point_parsing_is_exact() {
        assert_eq!(parse_zero_point("20.44").unwrap(), 20_440);
        assert_eq!(parse_zero_point("20").unwrap(), 20_000);
        assert_eq!(parse_zero_point("0.5").unwrap(), 500);
        assert_eq!(parse_zero_point("-1.25").unwrap(), -1_250);
        assert!(parse_zero_point("20.4444").is_err());
        assert!(parse_zero_point("abc").is_err());
        assert_eq!(format_zero_point(20_440), "20.44");
    }

    #[test]
    fn zero_point_value_parses_filter() {
        let v = AttrValue::parse_for(Attribute::ZeroPoint, "20.50/UV/IR-740").unwrap();
        assert_eq!(v, AttrValue::zero_point(20_500, "UV/IR-740"));
    }

    #[test]
    fn stream_sorts_and_reports_current() {
        let key = StreamKey::new(EntityId::parse("AA:BB:CC:DD:EE:FF").unwrap(), Attribute::Name);
        let s = AttributeStream::new(key, vec![rec(2, t(5), open_ended()), rec(1, t(0), t(5))]);
        assert_eq!(s.records[0].record_id, RecordId(1));
        assert_eq!(s.current().map(|r| r.record_id), Some(RecordId(2)));
        assert_eq!(s.next_record_id(), RecordId(3));
        assert_eq!(s.value_at(t(1)), Some(&AttrValue::name("stars1")));
    }
}
