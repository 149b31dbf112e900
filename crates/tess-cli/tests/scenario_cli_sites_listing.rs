use predicates::prelude::*;

const LISTING: &str = "\
source;name;longitude;latitude;place;town;sub_region;region;country;timezone
document;stars1;-3.7038;40.4168;Observatorio;Madrid;;;Spain;Europe/Madrid
relational;stars2;-3.7038;40.4168;Azotea;Madrid;;;Spain;Europe/Madrid
document;stars3;-3.7038;40.4178;Observatorio Norte;Madrid;;;Spain;Europe/Madrid
document;stars4;2.1734;41.3851;Observatorio;Barcelona;;;Spain;Europe/Madrid
";

#[test]
fn cli_sites_flags_shared_split_and_nearby_locations() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let listing = dir.path().join("sites.csv");
    std::fs::write(&listing, LISTING)?;
    let export = dir.path().join("flagged.csv");

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.arg("sites").arg(&listing).arg("--export").arg(&export);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("names=stars1,stars2 issues=place"))
        .stdout(predicate::str::contains("split_place place=Observatorio names=stars1,stars4"))
        .stdout(predicate::str::contains("nearby a=stars1 b=stars3 distance_m=111"))
        .stdout(predicate::str::contains(
            "sites=4 coordinates=3 inconsistent=1 split_places=1 nearby=1 nearby_m=200",
        ))
        .stdout(predicate::str::contains("rows=4"));

    let body = std::fs::read_to_string(&export)?;
    assert!(body.starts_with("source;name;longitude;latitude;place"));
    assert_eq!(body.lines().count(), 5);
    Ok(())
}

#[test]
fn cli_sites_radius_can_be_narrowed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let listing = dir.path().join("sites.csv");
    std::fs::write(&listing, LISTING)?;

    let mut cmd = assert_cmd::Command::cargo_bin("tess")?;
    cmd.arg("sites").arg(&listing).args(["--nearby-m", "50"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("nearby=0 nearby_m=50"))
        .stdout(predicate::str::contains("nearby a=").not());
    Ok(())
}
