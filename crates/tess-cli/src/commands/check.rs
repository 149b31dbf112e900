//! Read-only reports (`history`, `check`) and `normalize`.

use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use tess_config::{ConfigMode, Settings};
use tess_reconcile::{ChangeOp, Changeset};
use tess_schemas::{format_zero_point, AttrValue, AttributeStream, Bounds, RecordId};
use tess_validity::{
    classify_names, history_breaks, history_rows, is_truncated, normalize, validate,
    zero_point_quality, ZpQualityBands,
};

use super::{applier_for, is_dry_run, load_all_streams, load_config, open_store, stream_key, StoreSpec};

pub async fn history(store: &str, mac: &str, attribute: &str, config: &[String]) -> Result<()> {
    let (loaded, _) = load_config(config, ConfigMode::Check)?;
    let spec = StoreSpec::parse(store)?;
    let key = stream_key(mac, attribute)?;
    let mut store = open_store(&spec, &loaded).await?;
    let stream = store.load_stream(&key).await?;

    println!("stream={} records={}", key, stream.len());
    for row in history_rows(&stream, Utc::now()) {
        println!(
            "record id={} value={} since={} until={} state={} contiguous={} valid_days={}",
            row.record_id.0,
            row.value,
            row.valid_since.to_rfc3339(),
            row.valid_until.to_rfc3339(),
            row.valid_state.as_str(),
            row.contiguous,
            row.valid_days
        );
    }
    for b in history_breaks(&stream) {
        println!(
            "break index={} from={} to={}",
            b.index,
            b.break_end.to_rfc3339(),
            b.break_start.to_rfc3339()
        );
    }
    let violations = validate(&stream);
    for v in &violations {
        println!("violation kind={} detail={}", v.kind(), v);
    }
    println!(
        "violations={} truncated={} deactivated={}",
        violations.len(),
        is_truncated(&stream),
        stream.deactivated
    );
    Ok(())
}

fn bands(settings: &Settings) -> ZpQualityBands {
    let milli = |mag: f64| (mag * 1000.0).round() as i64;
    ZpQualityBands {
        absurd_below: milli(settings.quality.zp_absurd_below),
        plausible_min: milli(settings.quality.zp_plausible_min),
        plausible_max: milli(settings.quality.zp_plausible_max),
    }
}

pub async fn check(store: &str, config: &[String]) -> Result<()> {
    let (loaded, settings) = load_config(config, ConfigMode::Check)?;
    let spec = StoreSpec::parse(store)?;
    let mut store = open_store(&spec, &loaded).await?;
    let streams = load_all_streams(store.as_mut()).await?;

    let mut invalid = 0usize;
    for s in &streams {
        let violations = validate(s);
        if !violations.is_empty() {
            invalid += 1;
        }
        for v in violations {
            println!("violation stream={} kind={} detail={}", s.key, v.kind(), v);
        }
    }

    let classes = classify_names(&streams);
    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    for c in &classes {
        *tally.entry(c.class.as_str()).or_default() += 1;
        if !c.shared_with.is_empty() || c.names.len() > 1 {
            let shared: Vec<String> = c.shared_with.iter().map(|e| e.to_string()).collect();
            println!(
                "names entity_id={} class={} names={} shared_with={}",
                c.entity_id,
                c.class.as_str(),
                c.names.join(","),
                shared.join(",")
            );
        }
    }

    let bands = bands(&settings);
    for r in streams.iter().flat_map(|s| s.current()) {
        if let AttrValue::ZeroPoint { zp_milli, filter } = &r.value {
            let q = zero_point_quality(&bands, *zp_milli);
            println!(
                "zero_point entity_id={} zp={} filter={} quality={}",
                r.entity_id,
                format_zero_point(*zp_milli),
                filter,
                q.as_str()
            );
        }
    }

    let summary: Vec<String> = tally.iter().map(|(k, n)| format!("{k}={n}")).collect();
    println!("name_classes {}", summary.join(" "));
    println!("streams={} invalid={}", streams.len(), invalid);
    Ok(())
}

/// Store-level changeset for the boundary repairs `normalize` found.
/// Repeated rewrites of one record collapse into a single repair.
fn normalize_changeset(stream: &AttributeStream) -> Changeset {
    let mut scratch = stream.clone();
    let mut per_record: BTreeMap<RecordId, (Bounds, Bounds)> = BTreeMap::new();
    for r in normalize(&mut scratch) {
        per_record
            .entry(r.record_id)
            .and_modify(|(_, after)| *after = r.after)
            .or_insert((r.before, r.after));
    }
    let ops = per_record
        .into_iter()
        .filter(|(_, (before, after))| before != after)
        .map(|(record_id, (before, after))| ChangeOp::Repair {
            record_id,
            before,
            after,
        })
        .collect();
    Changeset::new(stream.key.clone(), ops)
}

pub async fn normalize_store(store: &str, live: bool, config: &[String]) -> Result<()> {
    let (loaded, settings) = load_config(config, ConfigMode::Apply)?;
    let dry_run = is_dry_run(live, &settings);
    let spec = StoreSpec::parse(store)?;
    let mut store = open_store(&spec, &loaded).await?;
    let streams = load_all_streams(store.as_mut()).await?;

    let changesets: Vec<Changeset> = streams
        .iter()
        .map(normalize_changeset)
        .filter(|cs| !cs.is_empty())
        .collect();
    for cs in &changesets {
        for op in &cs.ops {
            if let ChangeOp::Repair {
                record_id,
                before,
                after,
            } = op
            {
                println!(
                    "repair stream={} record_id={} before={} after={}",
                    cs.key, record_id.0, before, after
                );
            }
        }
    }

    let mut applier = applier_for(&settings)?;
    let report = applier.apply_batch(&changesets, store.as_mut(), dry_run).await;
    for f in report.failures() {
        println!("failed {f}");
    }
    for (key, err) in report.audit_errors() {
        println!("audit_error stream={key} error={err}");
    }
    println!(
        "mode={} streams={} applied={} failed={}",
        if dry_run { "dry_run" } else { "live" },
        changesets.len(),
        report.applied_ops(),
        report.failures().len()
    );
    Ok(())
}
