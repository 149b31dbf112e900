//! Append-only audit trail of store writes.
//!
//! One canonical (sorted-key, compact) JSON object per line. With the hash
//! chain enabled each line carries `hash_prev` (previous line's `hash_self`)
//! and `hash_self` (SHA-256 of the line without `hash_self`), so any edit,
//! deletion or reordering is detectable by [`verify_hash_chain`].

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tess_schemas::StreamKey;
use uuid::Uuid;

/// Namespace for deterministic event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x7e55_a0d1_7c3a_4f0e_9b1d_6a2f_51c8_e903);

pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    session_id: Uuid,
    last_hash: Option<String>,
    /// Number of events in the log; the next event's sequence number.
    seq: u64,
}

impl AuditWriter {
    /// Open (or create) a log, resuming the chain from its last line.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create_dir_all {:?}", parent))?;
            }
        }

        let mut seq = 0u64;
        let mut last_hash = None;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("read audit log {:?}", path))?;
            for (i, line) in content.lines().enumerate() {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let ev: AuditEvent = serde_json::from_str(trimmed)
                    .with_context(|| format!("parse audit event at line {}", i + 1))?;
                seq = ev.seq + 1;
                last_hash = ev.hash_self;
            }
        }

        Ok(Self {
            path,
            hash_chain,
            session_id: Uuid::new_v4(),
            last_hash,
            seq,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Append one event about `key`.
    pub fn append(&mut self, key: &StreamKey, action: &str, payload: Value) -> Result<AuditEvent> {
        let event_id = derive_event_id(self.last_hash.as_deref(), self.seq, &payload)?;

        let mut ev = AuditEvent {
            event_id,
            session_id: self.session_id,
            seq: self.seq,
            ts_utc: Utc::now(),
            entity_id: key.entity_id.to_string(),
            attribute: key.attribute.to_string(),
            action: action.to_string(),
            payload,
            hash_prev: None,
            hash_self: None,
        };

        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            let h = compute_event_hash(&ev)?;
            ev.hash_self = Some(h.clone());
            self.last_hash = Some(h);
        }

        append_line(&self.path, &canonical_json_line(&ev)?)?;
        self.seq += 1;
        Ok(ev)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    /// One per writer instance (one CLI invocation).
    pub session_id: Uuid,
    pub seq: u64,
    pub ts_utc: DateTime<Utc>,
    pub entity_id: String,
    pub attribute: String,
    /// `insert` | `close_current` | `repair` | `rollback` ...
    pub action: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// UUIDv5 over `(previous hash, sequence, canonical payload)`. No RNG.
fn derive_event_id(last_hash: Option<&str>, seq: u64, payload: &Value) -> Result<Uuid> {
    let canonical = serde_json::to_string(&sort_keys(payload)).context("canonical payload")?;
    let name = format!("{}|{}|{}", last_hash.unwrap_or("GENESIS"), seq, canonical);
    Ok(Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()))
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open audit log {:?}", path))?;
    f.write_all(line.as_bytes())
        .context("write audit line failed")?;
    f.write_all(b"\n").context("write newline failed")?;
    Ok(())
}

fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit event failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// SHA-256 of the canonical event with `hash_self` cleared.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let mut clone = ev.clone();
    clone.hash_self = None;
    let canonical = canonical_json_line(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read audit log {:?}", path.as_ref()))?;
    verify_hash_chain_str(&content)
}

pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;
    let mut lines = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let ev: AuditEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit event at line {}", i + 1))?;
        lines += 1;

        if ev.seq != expected_seq {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("seq mismatch: expected {expected_seq}, got {}", ev.seq),
            });
        }
        if ev.hash_prev != prev_hash {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, ev.hash_prev
                ),
            });
        }
        let claimed = ev
            .hash_self
            .as_ref()
            .ok_or_else(|| anyhow!("line {} has no hash_self; log was written without a chain", i + 1))?;
        let recomputed = compute_event_hash(&ev)?;
        if *claimed != recomputed {
            return Ok(VerifyResult::Broken {
                line: i + 1,
                reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
            });
        }

        prev_hash = ev.hash_self.clone();
        expected_seq += 1;
    }

    Ok(VerifyResult::Valid { lines })
}
