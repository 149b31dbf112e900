use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tess_schemas::{
    AttributeStream, Attribute, Bounds, EntityId, IntervalRecord, NewIntervalRecord, RecordId,
    StreamKey, TemporalError,
};
use tracing::debug;

use crate::adapter::{ensure_scope, IntervalStore, StoreKind};
use crate::rules::{check_close, check_insert, check_repair};

// ---------------------------------------------------------------------------
// Document shapes
// ---------------------------------------------------------------------------

/// All versioned attributes of one photometer, keyed by attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotometerDocument {
    pub entity_id: EntityId,
    #[serde(default)]
    pub deactivated: bool,
    #[serde(default)]
    pub streams: BTreeMap<Attribute, Vec<IntervalRecord>>,
}

impl PhotometerDocument {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            deactivated: false,
            streams: BTreeMap::new(),
        }
    }

    fn stream(&self, attribute: Attribute) -> AttributeStream {
        let key = StreamKey::new(self.entity_id.clone(), attribute);
        let records = self.streams.get(&attribute).cloned().unwrap_or_default();
        AttributeStream::new(key, records).with_deactivated(self.deactivated)
    }
}

/// On-disk layout of a document export.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentExport {
    #[serde(default)]
    pub photometers: Vec<PhotometerDocument>,
}

struct DocTx {
    key: StreamKey,
    /// Document as it was at `begin`; `None` if the entity did not exist.
    snapshot: Option<PhotometerDocument>,
    next_id: i64,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Identifier-keyed document store.
///
/// Loaded from a JSON export and written back after every committed change.
/// Without a path it lives in memory only.
pub struct DocumentStore {
    path: Option<PathBuf>,
    docs: BTreeMap<EntityId, PhotometerDocument>,
    next_id: i64,
    tx: Option<DocTx>,
}

impl DocumentStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            docs: BTreeMap::new(),
            next_id: 1,
            tx: None,
        }
    }

    /// Open an export file. A missing file starts an empty store at that path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TemporalError> {
        let path = path.as_ref().to_path_buf();
        let export = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| TemporalError::backend(format!("read {}", path.display()), e))?;
            serde_json::from_str::<DocumentExport>(&raw)
                .map_err(|e| TemporalError::backend(format!("parse {}", path.display()), e))?
        } else {
            DocumentExport::default()
        };
        let mut store = Self::from_export(export)?;
        store.path = Some(path);
        Ok(store)
    }

    pub fn from_export(export: DocumentExport) -> Result<Self, TemporalError> {
        let mut docs = BTreeMap::new();
        let mut max_id = 0;
        for mut doc in export.photometers {
            for (attribute, records) in doc.streams.iter_mut() {
                for r in records.iter_mut() {
                    if r.entity_id != doc.entity_id || r.attribute != *attribute {
                        return Err(TemporalError::constraint(format!(
                            "document {} holds record {} of {}/{}",
                            doc.entity_id, r.record_id, r.entity_id, r.attribute
                        )));
                    }
                    max_id = max_id.max(r.record_id.0);
                }
                records.sort_by(|a, b| {
                    a.valid_since
                        .cmp(&b.valid_since)
                        .then(a.record_id.cmp(&b.record_id))
                });
            }
            if docs.insert(doc.entity_id.clone(), doc).is_some() {
                return Err(TemporalError::constraint(
                    "document export holds the same entity twice",
                ));
            }
        }
        Ok(Self {
            path: None,
            docs,
            next_id: max_id + 1,
            tx: None,
        })
    }

    /// Seed a whole stream, bypassing write rules. For loading legacy data
    /// that is known to be inconsistent.
    pub fn seed(&mut self, stream: AttributeStream) {
        for r in &stream.records {
            self.next_id = self.next_id.max(r.record_id.0 + 1);
        }
        let doc = self
            .docs
            .entry(stream.key.entity_id.clone())
            .or_insert_with(|| PhotometerDocument::new(stream.key.entity_id.clone()));
        doc.deactivated = doc.deactivated || stream.deactivated;
        doc.streams.insert(stream.key.attribute, stream.records);
    }

    pub fn export(&self) -> DocumentExport {
        DocumentExport {
            photometers: self.docs.values().cloned().collect(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the export file (no-op for in-memory stores).
    pub fn flush(&self) -> Result<(), TemporalError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body = serde_json::to_string_pretty(&self.export())
            .map_err(|e| TemporalError::backend("serialize document export", e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| TemporalError::backend(format!("write {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .map_err(|e| TemporalError::backend(format!("rename to {}", path.display()), e))?;
        Ok(())
    }

    fn stream_of(&self, key: &StreamKey) -> AttributeStream {
        match self.docs.get(&key.entity_id) {
            Some(doc) => doc.stream(key.attribute),
            None => AttributeStream::empty(key.clone()),
        }
    }

    fn records_mut(&mut self, key: &StreamKey) -> &mut Vec<IntervalRecord> {
        self.docs
            .entry(key.entity_id.clone())
            .or_insert_with(|| PhotometerDocument::new(key.entity_id.clone()))
            .streams
            .entry(key.attribute)
            .or_default()
    }

    fn key_of(&self, record_id: RecordId) -> Option<StreamKey> {
        self.docs.values().find_map(|doc| {
            doc.streams.iter().find_map(|(attribute, records)| {
                records
                    .iter()
                    .any(|r| r.record_id == record_id)
                    .then(|| StreamKey::new(doc.entity_id.clone(), *attribute))
            })
        })
    }

    /// Runs `op` inside the open transaction, or inside an implicit one.
    fn scoped<T>(
        &mut self,
        key: &StreamKey,
        op: impl FnOnce(&mut Self) -> Result<T, TemporalError>,
    ) -> Result<T, TemporalError> {
        ensure_scope(self.tx.as_ref().map(|t| &t.key), key)?;
        if self.tx.is_some() {
            return op(self);
        }
        self.open_tx(key);
        match op(self) {
            Ok(v) => {
                self.commit_tx()?;
                Ok(v)
            }
            Err(e) => {
                self.rollback_tx();
                Err(e)
            }
        }
    }

    fn open_tx(&mut self, key: &StreamKey) {
        self.tx = Some(DocTx {
            key: key.clone(),
            snapshot: self.docs.get(&key.entity_id).cloned(),
            next_id: self.next_id,
        });
    }

    /// The transaction stays open until the flush succeeds, so a failed
    /// commit can still be rolled back.
    fn commit_tx(&mut self) -> Result<(), TemporalError> {
        if self.tx.is_none() {
            return Err(TemporalError::constraint("commit without an open transaction"));
        }
        self.flush()?;
        self.tx = None;
        Ok(())
    }

    fn rollback_tx(&mut self) {
        if let Some(tx) = self.tx.take() {
            match tx.snapshot {
                Some(doc) => {
                    self.docs.insert(tx.key.entity_id.clone(), doc);
                }
                None => {
                    self.docs.remove(&tx.key.entity_id);
                }
            }
            self.next_id = tx.next_id;
        }
    }
}

#[async_trait]
impl IntervalStore for DocumentStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Document
    }

    async fn entities(&mut self) -> Result<Vec<EntityId>, TemporalError> {
        Ok(self.docs.keys().cloned().collect())
    }

    async fn load_stream(&mut self, key: &StreamKey) -> Result<AttributeStream, TemporalError> {
        Ok(self.stream_of(key))
    }

    async fn insert(&mut self, record: NewIntervalRecord) -> Result<RecordId, TemporalError> {
        let key = record.key.clone();
        self.scoped(&key, |s| {
            check_insert(&s.stream_of(&key), &record)?;
            let id = RecordId(s.next_id);
            s.next_id += 1;
            let rec = record.into_record(id);
            debug!(entity_id = %key.entity_id, attribute = %key.attribute, record_id = id.0, "document insert");
            let records = s.records_mut(&key);
            records.push(rec);
            records.sort_by(|a, b| a.valid_since.cmp(&b.valid_since));
            Ok(id)
        })
    }

    async fn close_current(
        &mut self,
        key: &StreamKey,
        at: DateTime<Utc>,
    ) -> Result<RecordId, TemporalError> {
        self.scoped(key, |s| {
            let stream = s.stream_of(key);
            let idx = check_close(&stream, at)?;
            let id = stream.records[idx].record_id;
            let since = stream.records[idx].valid_since;
            if let Some(r) = s.records_mut(key).iter_mut().find(|r| r.record_id == id) {
                r.set_bounds(Bounds::new(since, at));
            }
            debug!(entity_id = %key.entity_id, attribute = %key.attribute, record_id = id.0, "document close_current");
            Ok(id)
        })
    }

    async fn repair(
        &mut self,
        record_id: RecordId,
        new_since: DateTime<Utc>,
        new_until: DateTime<Utc>,
    ) -> Result<IntervalRecord, TemporalError> {
        let key = self
            .key_of(record_id)
            .ok_or_else(|| TemporalError::not_found(format!("record {record_id}")))?;
        let bounds = Bounds::new(new_since, new_until);
        self.scoped(&key, |s| {
            check_repair(&s.stream_of(&key), record_id, bounds)?;
            let records = s.records_mut(&key);
            let mut out = None;
            for r in records.iter_mut() {
                if r.record_id == record_id {
                    r.set_bounds(bounds);
                    out = Some(r.clone());
                }
            }
            records.sort_by(|a, b| a.valid_since.cmp(&b.valid_since));
            debug!(entity_id = %key.entity_id, attribute = %key.attribute, record_id = record_id.0, "document repair");
            out.ok_or_else(|| TemporalError::not_found(format!("record {record_id}")))
        })
    }

    async fn begin(&mut self, key: &StreamKey) -> Result<(), TemporalError> {
        if let Some(open) = &self.tx {
            return Err(TemporalError::constraint(format!(
                "transaction already open for {}",
                open.key
            )));
        }
        self.open_tx(key);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TemporalError> {
        self.commit_tx()
    }

    async fn rollback(&mut self) -> Result<(), TemporalError> {
        self.rollback_tx();
        Ok(())
    }
}
