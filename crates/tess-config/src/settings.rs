//! Typed view over the merged config. Every key is optional; defaults match
//! the values the tools were tuned with.

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_DATABASE_URL_ENV: &str = "TESS_DATABASE_URL";
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileSettings {
    /// `relational` or `document`.
    pub trust: String,
    pub tolerance_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplySettings {
    pub dry_run: bool,
    pub audit_path: Option<String>,
    pub audit_hash_chain: bool,
}

/// Zero points in magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitySettings {
    pub zp_absurd_below: f64,
    pub zp_plausible_min: f64,
    pub zp_plausible_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichSettings {
    pub base_url: String,
    pub nearby_distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSettings {
    /// Name of the env var holding the relational store URL.
    pub relational_url_env: String,
    pub document_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub reconcile: ReconcileSettings,
    pub apply: ApplySettings,
    pub quality: QualitySettings,
    pub enrich: EnrichSettings,
    pub stores: StoreSettings,
}

fn at<'a>(cfg: &'a Value, pointer: &str) -> Option<&'a Value> {
    cfg.pointer(pointer).filter(|v| !v.is_null())
}

fn str_at(cfg: &Value, pointer: &str) -> Result<Option<String>> {
    match at(cfg, pointer) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => bail!("CONFIG_TYPE {pointer}: expected string, got {other}"),
    }
}

fn bool_at(cfg: &Value, pointer: &str, default: bool) -> Result<bool> {
    match at(cfg, pointer) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => bail!("CONFIG_TYPE {pointer}: expected bool, got {other}"),
    }
}

fn f64_at(cfg: &Value, pointer: &str, default: f64) -> Result<f64> {
    match at(cfg, pointer) {
        None => Ok(default),
        Some(v) => match v.as_f64() {
            Some(x) => Ok(x),
            None => bail!("CONFIG_TYPE {pointer}: expected number, got {v}"),
        },
    }
}

fn i64_at(cfg: &Value, pointer: &str, default: i64) -> Result<i64> {
    match at(cfg, pointer) {
        None => Ok(default),
        Some(v) => match v.as_i64() {
            Some(x) => Ok(x),
            None => bail!("CONFIG_TYPE {pointer}: expected integer, got {v}"),
        },
    }
}

impl Settings {
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let trust = str_at(cfg, "/reconcile/trust")?.unwrap_or_else(|| "relational".to_string());
        if !matches!(trust.as_str(), "relational" | "document") {
            bail!("CONFIG_INVALID /reconcile/trust: '{trust}' (expected relational | document)");
        }
        let tolerance_secs = i64_at(cfg, "/reconcile/tolerance_secs", 0)?;
        if tolerance_secs < 0 {
            bail!("CONFIG_INVALID /reconcile/tolerance_secs: {tolerance_secs} is negative");
        }

        let quality = QualitySettings {
            zp_absurd_below: f64_at(cfg, "/quality/zp_absurd_below", 10.0)?,
            zp_plausible_min: f64_at(cfg, "/quality/zp_plausible_min", 18.5)?,
            zp_plausible_max: f64_at(cfg, "/quality/zp_plausible_max", 20.5)?,
        };
        if !(quality.zp_absurd_below <= quality.zp_plausible_min
            && quality.zp_plausible_min <= quality.zp_plausible_max)
        {
            bail!(
                "CONFIG_INVALID /quality: need zp_absurd_below <= zp_plausible_min <= zp_plausible_max"
            );
        }

        let nearby_distance_m = f64_at(cfg, "/enrich/nearby_distance_m", 200.0)?;
        if nearby_distance_m < 0.0 {
            bail!("CONFIG_INVALID /enrich/nearby_distance_m: {nearby_distance_m} is negative");
        }

        Ok(Self {
            reconcile: ReconcileSettings {
                trust,
                tolerance_secs,
            },
            apply: ApplySettings {
                dry_run: bool_at(cfg, "/apply/dry_run", true)?,
                audit_path: str_at(cfg, "/apply/audit_path")?,
                audit_hash_chain: bool_at(cfg, "/apply/audit_hash_chain", true)?,
            },
            quality,
            enrich: EnrichSettings {
                base_url: str_at(cfg, "/enrich/base_url")?
                    .unwrap_or_else(|| DEFAULT_GEOCODER_URL.to_string()),
                nearby_distance_m,
            },
            stores: StoreSettings {
                relational_url_env: str_at(cfg, "/stores/relational/url_env")?
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL_ENV.to_string()),
                document_path: str_at(cfg, "/stores/document/path")?,
            },
        })
    }
}
