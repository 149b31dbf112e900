use tess_reconcile::*;
use tess_schemas::*;
use tess_testkit::*;

#[test]
fn scenario_uncorroborated_secondary_record_is_a_conflict_with_no_ops() {
    let k = name_key(MAC_A);
    let primary = stream(&k, &[("V1", 5, None)]);
    let secondary = stream_from(10, &k, &[("OLD", 0, Some(5)), ("V1", 5, None)]);

    let out = reconcile_streams(&primary, &secondary, &ReconcileOptions::default()).unwrap();

    assert!(out.changeset.is_empty());
    assert_eq!(out.conflicts.len(), 1);
    assert_eq!(out.conflicts[0].kind, ConflictKind::Uncorroborated);
    assert_eq!(out.conflicts[0].secondary.record_id, RecordId(10));
    assert!(out.conflicts[0].primary.is_none());
}

#[test]
fn scenario_value_mismatch_is_reported_without_touching_either_side() {
    let k = name_key(MAC_A);
    let primary = stream(&k, &[("V1", 0, Some(5)), ("V2", 5, None)]);
    let secondary = stream_from(10, &k, &[("V1", 0, Some(5)), ("X", 5, None)]);

    let out = reconcile_streams(&primary, &secondary, &ReconcileOptions::default()).unwrap();

    assert!(out.changeset.is_empty(), "V2 has no room in the secondary");
    assert_eq!(out.conflicts.len(), 1);
    let c = &out.conflicts[0];
    assert_eq!(c.kind, ConflictKind::ValueMismatch);
    assert_eq!(c.primary.as_ref().map(|p| p.value.clone()), Some(v("V2")));
}

#[test]
fn scenario_changeset_that_would_break_secondary_is_unsafe() {
    // The stray secondary X occupies V3's window, so V3 cannot be inserted
    // and the secondary would keep a gap between V2 and X.
    let k = name_key(MAC_A);
    let primary = stream(&k, &[("V1", 0, Some(5)), ("V2", 5, Some(8)), ("V3", 8, None)]);
    let secondary = stream_from(10, &k, &[("V1", 0, Some(5)), ("V2", 5, Some(8)), ("X", 9, None)]);

    let err = reconcile_streams(&primary, &secondary, &ReconcileOptions::default()).unwrap_err();
    match err {
        TemporalError::UnsafeChangeset { key, violations } => {
            assert_eq!(key, k);
            assert!(!violations.is_empty());
        }
        other => panic!("expected UnsafeChangeset, got {other}"),
    }
}

#[test]
fn scenario_retired_zero_length_record_blocks_insert_over_its_instant() {
    // R was retired at the instant it started; it still sits inside V1's
    // window, so V1 is not inserted and the secondary keeps a hole before V2.
    let k = name_key(MAC_A);
    let primary = stream(&k, &[("V1", 0, Some(5)), ("V2", 5, None)]);
    let secondary = stream_from(10, &k, &[("R", 3, Some(3)), ("V2", 5, None)]);

    let err = reconcile_streams(&primary, &secondary, &ReconcileOptions::default()).unwrap_err();
    match err {
        TemporalError::UnsafeChangeset { violations, .. } => {
            assert!(violations.contains(&Violation::Gap { index: 0 }));
        }
        other => panic!("expected UnsafeChangeset, got {other}"),
    }
}
