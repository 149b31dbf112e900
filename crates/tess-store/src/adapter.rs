use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tess_schemas::{
    AttributeStream, EntityId, IntervalRecord, NewIntervalRecord, RecordId, StreamKey,
    TemporalError,
};

/// Which kind of backing store an adapter talks to. Drives the trust direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Relational,
    Document,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Relational => "relational",
            StoreKind::Document => "document",
        }
    }
}

/// Read/write surface of one backing store.
///
/// Mutations issued outside `begin`/`commit` are wrapped in an implicit
/// single-operation transaction. While a transaction is open only its stream
/// may be touched.
#[async_trait]
pub trait IntervalStore: Send {
    fn kind(&self) -> StoreKind;

    /// Every entity the store knows about, sorted.
    async fn entities(&mut self) -> Result<Vec<EntityId>, TemporalError>;

    /// Records of one stream sorted by `valid_since`. Unknown streams are empty.
    async fn load_stream(&mut self, key: &StreamKey) -> Result<AttributeStream, TemporalError>;

    /// Persist a new record. Rejects a second Current record and a
    /// `valid_since` equal to the preceding record's.
    async fn insert(&mut self, record: NewIntervalRecord) -> Result<RecordId, TemporalError>;

    /// Close the Current record of `key` at `at`.
    async fn close_current(
        &mut self,
        key: &StreamKey,
        at: DateTime<Utc>,
    ) -> Result<RecordId, TemporalError>;

    /// Rewrite a record's boundaries; the state follows `new_until`.
    /// The caller re-validates the stream.
    async fn repair(
        &mut self,
        record_id: RecordId,
        new_since: DateTime<Utc>,
        new_until: DateTime<Utc>,
    ) -> Result<IntervalRecord, TemporalError>;

    async fn begin(&mut self, key: &StreamKey) -> Result<(), TemporalError>;

    async fn commit(&mut self) -> Result<(), TemporalError>;

    async fn rollback(&mut self) -> Result<(), TemporalError>;
}

pub(crate) fn ensure_scope(open: Option<&StreamKey>, key: &StreamKey) -> Result<(), TemporalError> {
    match open {
        Some(k) if k != key => Err(TemporalError::constraint(format!(
            "transaction is scoped to {k}; refusing to touch {key}"
        ))),
        _ => Ok(()),
    }
}
