use chrono::{TimeZone, Utc};
use tess_schemas::*;

#[test]
fn scenario_interval_record_serializes_canonical_tuple() {
    let since = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
    let key = StreamKey::new(EntityId::parse("5C:CF:7F:76:6:DB").unwrap(), Attribute::ZeroPoint);
    let rec = NewIntervalRecord::new(
        key,
        AttrValue::zero_point(20_440, "UV/IR-740"),
        Bounds::open(since),
        since,
    )
    .into_record(RecordId(7));

    assert!(rec.is_current());
    assert!(rec.is_open_ended());

    let v = serde_json::to_value(&rec).unwrap();
    assert_eq!(v["entity_id"], "5C:CF:7F:76:06:DB");
    assert_eq!(v["attribute"], "zero_point");
    assert_eq!(v["value"]["kind"], "zero_point");
    assert_eq!(v["value"]["zp_milli"], 20_440);
    assert_eq!(v["valid_state"], "Current");
    assert_eq!(v["valid_until"], "2999-12-31T23:59:59Z");

    let back: IntervalRecord = serde_json::from_value(v).unwrap();
    assert_eq!(back, rec);
}

#[test]
fn scenario_unpadded_entity_id_is_rejected_on_bad_input_only() {
    let err = serde_json::from_str::<EntityId>("\"not-a-mac\"").unwrap_err();
    assert!(err.to_string().contains("invalid entity id"));

    let ok: EntityId = serde_json::from_str("\"a:b:c:d:e:f\"").unwrap();
    assert_eq!(ok.as_str(), "0A:0B:0C:0D:0E:0F");
}

#[test]
fn scenario_state_follows_until_on_bound_rewrite() {
    let t0 = Utc.timestamp_opt(1_600_000_000, 0).single().unwrap();
    let t1 = Utc.timestamp_opt(1_600_086_400, 0).single().unwrap();
    let key = StreamKey::new(EntityId::parse("AA:BB:CC:DD:EE:FF").unwrap(), Attribute::Name);
    let mut rec = NewIntervalRecord::new(key, AttrValue::name("stars100"), Bounds::open(t0), t0)
        .into_record(RecordId(1));

    rec.set_bounds(Bounds::new(t0, t1));
    assert_eq!(rec.valid_state, ValidState::Expired);
    assert_eq!(rec.duration().num_seconds(), 86_400);

    rec.set_bounds(Bounds::open(t0));
    assert_eq!(rec.valid_state, ValidState::Current);
}
