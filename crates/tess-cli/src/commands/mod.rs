//! Command handlers for `tess`.
//!
//! Shared plumbing (store specs, config loading, audit wiring) lives here;
//! each submodule owns one group of subcommands.

pub mod check;
pub mod enrich;
pub mod reconcile;

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tess_apply::Applier;
use tess_audit::AuditWriter;
use tess_config::secrets::resolve_secrets;
use tess_config::{
    load_layered_yaml, report_unused_keys, ConfigMode, LoadedConfig, Settings, UnusedKeyPolicy,
};
use tess_schemas::{Attribute, AttributeStream, EntityId, StreamKey};
use tess_store::{connect_url, DocumentStore, IntervalStore, PgStore};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Store specs
// ---------------------------------------------------------------------------

/// `pg` (relational store, URL from the configured env var) or `doc:<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    Pg,
    Doc(PathBuf),
}

impl StoreSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("pg") {
            return Ok(StoreSpec::Pg);
        }
        match raw.strip_prefix("doc:") {
            Some(path) if !path.is_empty() => Ok(StoreSpec::Doc(PathBuf::from(path))),
            _ => bail!("invalid store '{raw}'. expected: pg | doc:<path>"),
        }
    }
}

impl std::fmt::Display for StoreSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreSpec::Pg => write!(f, "pg"),
            StoreSpec::Doc(p) => write!(f, "doc:{}", p.display()),
        }
    }
}

pub async fn open_store(spec: &StoreSpec, loaded: &LoadedConfig) -> Result<Box<dyn IntervalStore>> {
    match spec {
        StoreSpec::Pg => {
            let secrets = resolve_secrets(&loaded.config_json, true)?;
            let url = secrets.database_url.unwrap_or_default();
            let pool = connect_url(&url)
                .await
                .with_context(|| format!("connect via {}", secrets.database_url_env))?;
            Ok(Box::new(PgStore::new(pool)))
        }
        StoreSpec::Doc(path) => {
            let store = DocumentStore::open(path)
                .with_context(|| format!("open document store {}", path.display()))?;
            Ok(Box::new(store))
        }
    }
}

/// Every non-empty stream of every entity, sorted by key.
pub async fn load_all_streams(store: &mut dyn IntervalStore) -> Result<Vec<AttributeStream>> {
    let mut out = Vec::new();
    for entity in store.entities().await? {
        for attribute in Attribute::ALL {
            let key = StreamKey::new(entity.clone(), attribute);
            let stream = store.load_stream(&key).await?;
            if !stream.is_empty() {
                out.push(stream);
            }
        }
    }
    info!(store = store.kind().as_str(), streams = out.len(), "loaded streams");
    Ok(out)
}

pub fn stream_key(mac: &str, attribute: &str) -> Result<StreamKey> {
    let entity_id = EntityId::parse(mac)?;
    let attribute = Attribute::parse(attribute)?;
    Ok(StreamKey::new(entity_id, attribute))
}

// ---------------------------------------------------------------------------
// Config + audit
// ---------------------------------------------------------------------------

/// Load the layered config (or defaults) and warn about keys `mode` ignores.
pub fn load_config(paths: &[String], mode: ConfigMode) -> Result<(LoadedConfig, Settings)> {
    let loaded = if paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
        load_layered_yaml(&refs)?
    };
    let report = report_unused_keys(mode, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    for ptr in &report.unused_leaf_pointers {
        warn!(mode = report.mode.as_str(), pointer = ptr.as_str(), "config key not used in this mode");
    }
    let settings = loaded.settings()?;
    Ok((loaded, settings))
}

pub fn applier_for(settings: &Settings) -> Result<Applier> {
    match &settings.apply.audit_path {
        Some(path) => {
            let writer = AuditWriter::open(path, settings.apply.audit_hash_chain)
                .with_context(|| format!("open audit log {path}"))?;
            Ok(Applier::with_audit(writer))
        }
        None => Ok(Applier::new()),
    }
}

/// `--live` wins; otherwise the configured default applies.
pub fn is_dry_run(live_flag: bool, settings: &Settings) -> bool {
    !live_flag && settings.apply.dry_run
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_spec_parse() {
        assert_eq!(StoreSpec::parse("pg").unwrap(), StoreSpec::Pg);
        assert_eq!(
            StoreSpec::parse("doc:exports/a.json").unwrap(),
            StoreSpec::Doc(PathBuf::from("exports/a.json"))
        );
        assert!(StoreSpec::parse("doc:").is_err());
        assert!(StoreSpec::parse("mongo").is_err());
    }
}
