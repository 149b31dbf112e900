//! Runtime secret resolution.
//!
//! The config stores env var NAMES only (`/stores/relational/url_env`).
//! Callers resolve once at startup and pass the result on; error messages name
//! the variable, never its value. `Debug` output is redacted.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::settings::DEFAULT_DATABASE_URL_ENV;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Env var the URL was read from.
    pub database_url_env: String,
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the relational store URL. With `require_database` a missing or
/// blank variable is an error naming the variable.
pub fn resolve_secrets(config_json: &Value, require_database: bool) -> Result<ResolvedSecrets> {
    let var = config_json
        .pointer("/stores/relational/url_env")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_DATABASE_URL_ENV)
        .to_string();

    let database_url = resolve_env(&var);
    if require_database && database_url.is_none() {
        bail!("SECRETS_MISSING: required env var '{var}' (relational store url) is not set or empty");
    }
    Ok(ResolvedSecrets {
        database_url_env: var,
        database_url,
    })
}
