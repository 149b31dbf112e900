use predicates::prelude::*;
use std::path::Path;
use tess_store::DocumentStore;
use tess_testkit::*;

fn seed(path: &Path) -> anyhow::Result<String> {
    let mut store = DocumentStore::open(path)?;
    store.seed(stream(&name_key(MAC_A), &[("stars1", 0, None)]));
    store.flush()?;
    Ok(format!("doc:{}", path.display()))
}

/// Config layer that turns on the audit trail under `dir`.
fn audit_config(dir: &Path) -> anyhow::Result<(String, std::path::PathBuf)> {
    let audit = dir.join("audit.jsonl");
    let cfg = dir.join("site.yaml");
    std::fs::write(
        &cfg,
        format!("apply:\n  audit_path: {}\n", audit.display()),
    )?;
    Ok((cfg.to_string_lossy().to_string(), audit))
}

#[test]
fn cli_version_open_closes_current_and_inserts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = seed(&dir.path().join("doc.json"))?;

    let open = |live: bool| -> anyhow::Result<assert_cmd::assert::Assert> {
        let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
        cmd.args([
            "version",
            "open",
            "--store",
            &store,
            "--mac",
            MAC_A,
            "--attribute",
            "name",
            "--value",
            "stars1b",
            "--at",
            "2020-01-02T00:00:00Z",
        ]);
        if live {
            cmd.arg("--live");
        }
        Ok(cmd.assert())
    };

    open(false)?
        .success()
        .stdout(predicate::str::contains("op index=0 kind=close_current outcome=Applied"))
        .stdout(predicate::str::contains("op index=1 kind=insert outcome=Applied"))
        .stdout(predicate::str::contains("mode=dry_run applied=2"));

    open(true)?
        .success()
        .stdout(predicate::str::contains("mode=live applied=2"));

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args(["history", "--store", &store, "--mac", MAC_A, "--attribute", "name"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("records=2"))
        .stdout(predicate::str::contains("violations=0"));

    // Same value again: nothing to version.
    open(true)?.failure();
    Ok(())
}

#[test]
fn cli_version_open_rejects_malformed_instant() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = seed(&dir.path().join("doc.json"))?;

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args([
        "version", "open", "--store", &store, "--mac", MAC_A, "--attribute", "name", "--value",
        "stars1b", "--at", "yesterday",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
    Ok(())
}

#[test]
fn cli_live_apply_writes_verifiable_audit_trail() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = seed(&dir.path().join("doc.json"))?;
    let (cfg, audit) = audit_config(dir.path())?;

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args([
        "version",
        "open",
        "--store",
        &store,
        "--mac",
        MAC_A,
        "--attribute",
        "name",
        "--value",
        "stars1b",
        "--at",
        "2020-01-02T00:00:00Z",
        "--live",
        "--config",
        &cfg,
    ]);
    cmd.assert().success();

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args(["audit", "verify"]).arg(&audit);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("audit_valid=true lines=2"));

    // Tamper with the first event's payload; the chain no longer verifies.
    let body = std::fs::read_to_string(&audit)?;
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();
    let mut first: serde_json::Value = serde_json::from_str(&lines[0])?;
    first["payload"]["op_index"] = serde_json::json!(7);
    lines[0] = serde_json::to_string(&first)?;
    std::fs::write(&audit, lines.join("\n") + "\n")?;

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.args(["audit", "verify"]).arg(&audit);
    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("audit_valid=false line=1"));
    Ok(())
}
