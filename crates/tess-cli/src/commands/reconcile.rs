//! `reconcile` and `version open`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tess_apply::open_version;
use tess_config::ConfigMode;
use tess_reconcile::{
    orient, plan_batch, review_rows, write_csv, write_json, Changeset, ReconcileOptions,
    TrustDirection,
};
use tess_schemas::AttrValue;
use tracing::info;

use super::{applier_for, is_dry_run, load_all_streams, load_config, open_store, stream_key, StoreSpec};

pub struct ReconcileArgs<'a> {
    pub relational: &'a str,
    /// Falls back to `/stores/document/path`.
    pub document: Option<&'a str>,
    pub trust: Option<&'a str>,
    pub tolerance_secs: Option<i64>,
    pub live: bool,
    pub report: Option<&'a Path>,
    pub config: &'a [String],
}

pub async fn reconcile(args: ReconcileArgs<'_>) -> Result<()> {
    let mode = if args.live {
        ConfigMode::Apply
    } else {
        ConfigMode::Reconcile
    };
    let (loaded, settings) = load_config(args.config, mode)?;
    let dry_run = is_dry_run(args.live, &settings);

    let trust = TrustDirection::parse(args.trust.unwrap_or(settings.reconcile.trust.as_str()))?;
    let tolerance_secs = args.tolerance_secs.unwrap_or(settings.reconcile.tolerance_secs);
    if tolerance_secs < 0 {
        bail!("--tolerance-secs must not be negative");
    }
    let opts = ReconcileOptions {
        tolerance: Duration::seconds(tolerance_secs),
        trust,
    };

    let relational_spec = StoreSpec::parse(args.relational)?;
    let document_spec = match (args.document, &settings.stores.document_path) {
        (Some(raw), _) => StoreSpec::parse(raw)?,
        (None, Some(path)) => StoreSpec::Doc(path.into()),
        (None, None) => bail!("no document store: pass --document or set stores.document.path"),
    };
    let mut relational = open_store(&relational_spec, &loaded).await?;
    let mut document = open_store(&document_spec, &loaded).await?;
    let relational_streams = load_all_streams(relational.as_mut()).await?;
    let document_streams = load_all_streams(document.as_mut()).await?;

    let (primary, secondary) = orient(trust, &relational_streams, &document_streams);
    let plan = plan_batch(primary, secondary, &opts)?;

    println!(
        "trust={} tolerance_secs={} config_hash={}",
        trust.as_str(),
        tolerance_secs,
        loaded.config_hash
    );
    println!(
        "entities only_primary={} only_secondary={} common={}",
        plan.entities.only_primary.len(),
        plan.entities.only_secondary.len(),
        plan.entities.common.len()
    );

    let rows = review_rows(&plan);
    for r in &rows {
        println!(
            "review entity_id={} attribute={} kind={} record_id={} value={} before={} after={}",
            r.entity_id,
            r.attribute,
            r.kind,
            r.record_id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            r.value.as_deref().unwrap_or("-"),
            r.before.as_deref().unwrap_or("-"),
            r.after.as_deref().unwrap_or("-"),
        );
    }
    if let Some(path) = args.report {
        let is_csv = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            write_csv(path, &rows)?;
        } else {
            write_json(path, &rows)?;
        }
        println!("report={}", path.display());
    }
    println!(
        "streams={} ops={} conflicts={} unsafe={}",
        plan.streams.len(),
        plan.op_count(),
        plan.conflicts().len(),
        plan.unsafe_count()
    );

    let changesets: Vec<Changeset> = plan
        .changesets()
        .into_iter()
        .filter(|cs| !cs.is_empty())
        .cloned()
        .collect();
    let target = match trust {
        TrustDirection::Relational => document.as_mut(),
        TrustDirection::Document => relational.as_mut(),
    };
    info!(
        relational = %relational_spec,
        document = %document_spec,
        target_store = target.kind().as_str(),
        dry_run,
        changesets = changesets.len(),
        "reconcile: applying"
    );
    let mut applier = applier_for(&settings)?;
    let report = applier.apply_batch(&changesets, target, dry_run).await;
    for f in report.failures() {
        println!("failed {f}");
    }
    for (key, err) in report.audit_errors() {
        println!("audit_error stream={key} error={err}");
    }
    println!(
        "mode={} applied={} failed={}",
        if dry_run { "dry_run" } else { "live" },
        report.applied_ops(),
        report.failures().len()
    );
    Ok(())
}

pub struct VersionOpenArgs<'a> {
    pub store: &'a str,
    pub mac: &'a str,
    pub attribute: &'a str,
    pub value: &'a str,
    pub at: Option<&'a str>,
    pub live: bool,
    pub config: &'a [String],
}

pub async fn version_open(args: VersionOpenArgs<'_>) -> Result<()> {
    let (loaded, settings) = load_config(args.config, ConfigMode::Apply)?;
    let dry_run = is_dry_run(args.live, &settings);
    let key = stream_key(args.mac, args.attribute)?;
    let value = AttrValue::parse_for(key.attribute, args.value)?;
    let at = match args.at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("--at must be RFC 3339, got '{raw}'"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let spec = StoreSpec::parse(args.store)?;
    let mut store = open_store(&spec, &loaded).await?;
    let mut applier = applier_for(&settings)?;
    let report = open_version(&mut applier, store.as_mut(), &key, value.clone(), at, dry_run).await?;

    println!("stream={} value={} at={}", key, value, at.to_rfc3339());
    for op in &report.ops {
        println!("op index={} kind={} outcome={:?}", op.op_index, op.kind, op.outcome);
    }
    if let Some(err) = &report.audit_error {
        println!("audit_error stream={key} error={err}");
    }
    println!(
        "mode={} applied={}",
        if dry_run { "dry_run" } else { "live" },
        report.applied()
    );
    Ok(())
}
