use predicates::prelude::*;
use std::path::PathBuf;

fn repo_config(name: &str) -> anyhow::Result<String> {
    let p: PathBuf = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join(name)
        .canonicalize()?;
    Ok(p.to_string_lossy().to_string())
}

#[test]
fn cli_config_hash_is_stable_across_runs() -> anyhow::Result<()> {
    let base = repo_config("base.yaml")?;
    let site = repo_config("site.yaml")?;

    let run = || -> anyhow::Result<String> {
        let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
        cmd.args(["config-hash", &base, &site]);
        let out = cmd.assert().success().get_output().stdout.clone();
        Ok(String::from_utf8(out)?)
    };
    let first = run()?;
    let second = run()?;
    assert_eq!(first, second);
    assert!(first.starts_with("config_hash="));
    // Layering: the site layer's tolerance wins over the base default.
    assert!(first.contains("\"tolerance_secs\":60"));
    Ok(())
}

#[test]
fn cli_refuses_literal_secrets_in_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let bad = dir.path().join("bad.yaml");
    std::fs::write(
        &bad,
        "stores:\n  relational:\n    url_env: postgres://tess:hunter2@db/tess\n",
    )?;

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args(["config-hash"]).arg(&bad);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("hunter2").not());
    Ok(())
}

#[test]
fn cli_pg_store_without_url_names_the_missing_variable() -> anyhow::Result<()> {
    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.env_remove(tess_store::ENV_DB_URL)
        .args(["check", "--store", "pg"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING"))
        .stderr(predicate::str::contains(tess_store::ENV_DB_URL));
    Ok(())
}

/// DB-backed; skipped if TESS_DATABASE_URL is not set.
#[test]
fn cli_db_migrate_then_status() -> anyhow::Result<()> {
    let url = match std::env::var(tess_store::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TESS_DATABASE_URL not set");
            return Ok(());
        }
    };

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.env(tess_store::ENV_DB_URL, &url).args(["db", "migrate"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("migrations_applied=true"));

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.env(tess_store::ENV_DB_URL, &url).args(["db", "status"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("db_ok=true has_interval_table=true"));
    Ok(())
}
