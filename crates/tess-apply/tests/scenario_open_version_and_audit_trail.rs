use std::fs;

use tess_apply::{open_version, Applier};
use tess_audit::{verify_hash_chain, AuditWriter, VerifyResult};
use tess_reconcile::{ChangeOp, Changeset};
use tess_schemas::*;
use tess_store::{DocumentStore, IntervalStore};
use tess_testkit::*;

#[tokio::test]
async fn scenario_open_version_closes_current_and_inserts() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    store.seed(stream(&k, &[("V1", 0, None)]));
    let mut applier = Applier::new();

    let report = open_version(&mut applier, &mut store, &k, v("V2"), ts(5), false)
        .await
        .unwrap();
    let kinds: Vec<&str> = report.ops.iter().map(|o| o.kind).collect();
    assert_eq!(kinds, vec!["close_current", "insert"]);

    assert_eq!(
        spans(&store.load_stream(&k).await.unwrap()),
        vec![
            ("V1".to_string(), ts(0), ts(5), ValidState::Expired),
            ("V2".to_string(), ts(5), inf(), ValidState::Current),
        ]
    );
}

#[tokio::test]
async fn scenario_open_version_on_empty_stream_inserts_first_record() {
    let k = name_key(MAC_B);
    let mut store = DocumentStore::in_memory();
    let mut applier = Applier::new();

    let report = open_version(&mut applier, &mut store, &k, v("W1"), ts(2), false)
        .await
        .unwrap();
    assert_eq!(report.applied(), 1);
    let s = store.load_stream(&k).await.unwrap();
    assert_eq!(s.len(), 1);
    assert!(s.records[0].is_current());
}

#[tokio::test]
async fn scenario_open_version_rejects_unchanged_and_out_of_order() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    let original = stream(&k, &[("V1", 0, Some(3)), ("V2", 3, None)]);
    store.seed(original.clone());
    let mut applier = Applier::new();

    let same = open_version(&mut applier, &mut store, &k, v("V2"), ts(8), false)
        .await
        .unwrap_err();
    assert!(matches!(
        same.reason,
        TemporalError::ConstraintViolation { .. }
    ));

    let early = open_version(&mut applier, &mut store, &k, v("V3"), ts(3), false)
        .await
        .unwrap_err();
    assert!(matches!(early.reason, TemporalError::OutOfOrder { .. }));

    assert_eq!(store.load_stream(&k).await.unwrap(), original);
}

#[tokio::test]
async fn scenario_applied_ops_and_rollbacks_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit").join("apply.jsonl");
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    store.seed(stream(&k, &[("V1", 0, Some(6)), ("V2", 6, None)]));

    let mut applier = Applier::with_audit(AuditWriter::open(&log, true).unwrap());
    let good = Changeset::new(
        k.clone(),
        vec![
            ChangeOp::Repair {
                record_id: RecordId(1),
                before: Bounds::new(ts(0), ts(6)),
                after: Bounds::new(ts(0), ts(5)),
            },
            ChangeOp::Repair {
                record_id: RecordId(2),
                before: Bounds::open(ts(6)),
                after: Bounds::open(ts(5)),
            },
        ],
    );
    applier.apply(&good, &mut store, false).await.unwrap();
    // Already applied: nothing new is written.
    applier.apply(&good, &mut store, false).await.unwrap();

    let stale = Changeset::new(
        k.clone(),
        vec![ChangeOp::CloseCurrent {
            record_id: RecordId(2),
            before: Bounds::open(ts(9)),
            at: ts(10),
        }],
    );
    applier.apply(&stale, &mut store, false).await.unwrap_err();
    // Dry runs leave no trace.
    applier.apply(&good, &mut store, true).await.unwrap();

    let content = fs::read_to_string(&log).unwrap();
    let actions: Vec<String> = content
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(actions, vec!["repair", "repair", "rollback"]);
    assert_eq!(
        verify_hash_chain(&log).unwrap(),
        VerifyResult::Valid { lines: 3 }
    );
}

#[tokio::test]
async fn scenario_unwritable_audit_trail_does_not_mask_store_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    store.seed(stream(&k, &[("V1", 0, Some(6)), ("V2", 6, None)]));

    let mut applier = Applier::with_audit(AuditWriter::open(&log, true).unwrap());
    // Appends now hit a directory and fail.
    fs::create_dir(&log).unwrap();

    let drift = Changeset::new(
        k.clone(),
        vec![
            ChangeOp::Repair {
                record_id: RecordId(1),
                before: Bounds::new(ts(0), ts(6)),
                after: Bounds::new(ts(0), ts(5)),
            },
            ChangeOp::Repair {
                record_id: RecordId(2),
                before: Bounds::open(ts(6)),
                after: Bounds::open(ts(5)),
            },
        ],
    );
    let report = applier.apply(&drift, &mut store, false).await.unwrap();
    assert_eq!(report.applied(), 2);
    assert!(report.audit_error.is_some());
    assert_eq!(
        spans(&store.load_stream(&k).await.unwrap()),
        vec![
            ("V1".to_string(), ts(0), ts(5), ValidState::Expired),
            ("V2".to_string(), ts(5), inf(), ValidState::Current),
        ]
    );

    // The rollback keeps its own reason, not the audit error.
    let stale = Changeset::new(
        k.clone(),
        vec![ChangeOp::Repair {
            record_id: RecordId(1),
            before: Bounds::new(ts(0), ts(7)),
            after: Bounds::new(ts(0), ts(8)),
        }],
    );
    let failure = applier.apply(&stale, &mut store, false).await.unwrap_err();
    assert_eq!(failure.op_index, Some(0));
    assert!(matches!(
        failure.reason,
        TemporalError::ConstraintViolation { .. }
    ));

    let batch = applier.apply_batch(&[drift], &mut store, false).await;
    assert!(batch.failures().is_empty());
    assert!(batch.audit_errors().is_empty(), "nothing new to record");
}
