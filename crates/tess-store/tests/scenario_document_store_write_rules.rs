use tess_schemas::*;
use tess_store::{DocumentStore, IntervalStore};
use tess_testkit::*;

fn new_open(key: &StreamKey, value: &str, since: i64) -> NewIntervalRecord {
    NewIntervalRecord::new(key.clone(), v(value), Bounds::open(ts(since)), ts(since))
}

#[tokio::test]
async fn scenario_insert_rejects_second_current_record() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    store.insert(new_open(&k, "V1", 0)).await.unwrap();

    let err = store.insert(new_open(&k, "V2", 5)).await.unwrap_err();
    assert!(matches!(err, TemporalError::ConstraintViolation { .. }));
    assert_eq!(store.load_stream(&k).await.unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_close_then_insert_builds_contiguous_history() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    let first = store.insert(new_open(&k, "V1", 0)).await.unwrap();

    let closed = store.close_current(&k, ts(5)).await.unwrap();
    assert_eq!(closed, first);
    store.insert(new_open(&k, "V2", 5)).await.unwrap();

    let s = store.load_stream(&k).await.unwrap();
    assert_eq!(
        spans(&s),
        vec![
            ("V1".to_string(), ts(0), ts(5), ValidState::Expired),
            ("V2".to_string(), ts(5), inf(), ValidState::Current),
        ]
    );
}

#[tokio::test]
async fn scenario_close_current_errors() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    assert!(matches!(
        store.close_current(&k, ts(1)).await,
        Err(TemporalError::NotFound { .. })
    ));

    store.insert(new_open(&k, "V1", 3)).await.unwrap();
    assert!(matches!(
        store.close_current(&k, ts(1)).await,
        Err(TemporalError::OutOfOrder { .. })
    ));
}

#[tokio::test]
async fn scenario_repair_derives_state_and_rejects_unknown_id() {
    let k = name_key(MAC_A);
    let mut store = DocumentStore::in_memory();
    let id = store.insert(new_open(&k, "V1", 0)).await.unwrap();

    let r = store.repair(id, ts(0), ts(4)).await.unwrap();
    assert_eq!(r.valid_state, ValidState::Expired);
    let r = store.repair(id, ts(0), inf()).await.unwrap();
    assert_eq!(r.valid_state, ValidState::Current);

    assert!(matches!(
        store.repair(RecordId(999), ts(0), ts(1)).await,
        Err(TemporalError::NotFound { .. })
    ));
}

#[tokio::test]
async fn scenario_rollback_restores_stream_and_scope_is_enforced() {
    let k = name_key(MAC_A);
    let other = name_key(MAC_B);
    let mut store = DocumentStore::in_memory();
    store.insert(new_open(&k, "V1", 0)).await.unwrap();

    store.begin(&k).await.unwrap();
    store.close_current(&k, ts(2)).await.unwrap();
    store.insert(new_open(&k, "V2", 2)).await.unwrap();
    assert!(matches!(
        store.insert(new_open(&other, "X", 0)).await,
        Err(TemporalError::ConstraintViolation { .. })
    ));
    store.rollback().await.unwrap();

    let s = store.load_stream(&k).await.unwrap();
    assert_eq!(s.len(), 1);
    assert!(s.records[0].is_current());
    assert_eq!(store.entities().await.unwrap(), vec![mac(MAC_A)]);
}

#[tokio::test]
async fn scenario_export_file_round_trips_through_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photometers.json");
    let k = key(MAC_A, Attribute::ZeroPoint);

    {
        let mut store = DocumentStore::open(&path).unwrap();
        store.begin(&k).await.unwrap();
        store
            .insert(NewIntervalRecord::new(
                k.clone(),
                AttrValue::zero_point(20_440, "UV/IR-740"),
                Bounds::open(ts(0)),
                ts(0),
            ))
            .await
            .unwrap();
        store.commit().await.unwrap();
    }

    let mut reopened = DocumentStore::open(&path).unwrap();
    let s = reopened.load_stream(&k).await.unwrap();
    assert_eq!(s.len(), 1);
    assert_eq!(s.records[0].value, AttrValue::zero_point(20_440, "UV/IR-740"));

    let next = reopened
        .insert(NewIntervalRecord::new(
            name_key(MAC_A),
            v("stars1"),
            Bounds::open(ts(0)),
            ts(0),
        ))
        .await
        .unwrap();
    assert_eq!(next, RecordId(2), "ids continue after the highest persisted id");
}
