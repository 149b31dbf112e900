use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tess_schemas::Bounds;

use crate::{BatchPlan, ChangeOp, StreamPlan};

/// One human-reviewable line of a reconciliation plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRow {
    pub entity_id: String,
    pub attribute: String,
    /// `insert` | `close_current` | `repair` | `conflict:<kind>` | `unsafe`
    pub kind: String,
    pub record_id: Option<i64>,
    pub value: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

fn show(b: Bounds) -> String {
    format!("{b} {}", b.state().as_str())
}

pub fn review_rows(plan: &BatchPlan) -> Vec<ReviewRow> {
    let mut rows = Vec::new();
    for sp in &plan.streams {
        let key = sp.key();
        let entity_id = key.entity_id.to_string();
        let attribute = key.attribute.to_string();
        match sp {
            StreamPlan::Planned(outcome) => {
                for op in &outcome.changeset.ops {
                    let value = match op {
                        ChangeOp::Insert { value, .. } => Some(value.to_string()),
                        _ => None,
                    };
                    rows.push(ReviewRow {
                        entity_id: entity_id.clone(),
                        attribute: attribute.clone(),
                        kind: op.kind().to_string(),
                        record_id: op.record_id().map(|r| r.0),
                        value,
                        before: op.before().map(show),
                        after: Some(show(op.after())),
                    });
                }
                for c in &outcome.conflicts {
                    rows.push(ReviewRow {
                        entity_id: entity_id.clone(),
                        attribute: attribute.clone(),
                        kind: format!("conflict:{}", c.kind.as_str()),
                        record_id: Some(c.secondary.record_id.0),
                        value: Some(c.secondary.value.to_string()),
                        before: Some(show(c.secondary.bounds())),
                        after: c
                            .primary
                            .as_ref()
                            .map(|p| format!("primary {} = {}", show(p.bounds()), p.value)),
                    });
                }
            }
            StreamPlan::Unsafe { violations, .. } => {
                let detail: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                rows.push(ReviewRow {
                    entity_id,
                    attribute,
                    kind: "unsafe".to_string(),
                    record_id: None,
                    value: None,
                    before: Some(detail.join("; ")),
                    after: None,
                });
            }
        }
    }
    rows
}

pub fn write_json(path: &Path, rows: &[ReviewRow]) -> Result<()> {
    let body = serde_json::to_string_pretty(rows).context("serialize review rows")?;
    std::fs::write(path, body).with_context(|| format!("write review report: {}", path.display()))?;
    Ok(())
}

/// `;`-separated, one header line, one row per operation or conflict.
pub fn write_csv(path: &Path, rows: &[ReviewRow]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("open review csv: {}", path.display()))?;
    for row in rows {
        w.serialize(row).context("write review csv row")?;
    }
    w.flush().context("flush review csv")?;
    Ok(())
}
