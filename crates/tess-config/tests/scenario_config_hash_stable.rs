use tess_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
reconcile:
  trust: "relational"
  tolerance_secs: 0
quality:
  zp_plausible_min: 18.5
  zp_plausible_max: 20.5
stores:
  relational:
    url_env: "TESS_DATABASE_URL"
  document:
    path: "exports/photometers.json"
"#;

const BASE_YAML_REORDERED: &str = r#"
stores:
  document:
    path: "exports/photometers.json"
  relational:
    url_env: "TESS_DATABASE_URL"
quality:
  zp_plausible_max: 20.5
  zp_plausible_min: 18.5
reconcile:
  tolerance_secs: 0
  trust: "relational"
"#;

const OVERLAY_YAML: &str = r#"
reconcile:
  trust: "document"
apply:
  dry_run: false
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(
        a.config_hash, b.config_hash,
        "key order in the source must not change the hash"
    );
}

#[test]
fn overlay_overrides_and_keeps_base_keys() {
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_ne!(merged.config_hash, base.config_hash);

    let s = merged.settings().unwrap();
    assert_eq!(s.reconcile.trust, "document");
    assert!(!s.apply.dry_run);
    assert_eq!(s.reconcile.tolerance_secs, 0);
    assert_eq!(
        s.stores.document_path.as_deref(),
        Some("exports/photometers.json")
    );
}

#[test]
fn hash_is_64_hex_chars_and_empty_config_is_stable() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));

    let a = load_layered_yaml_from_strings(&["{}"]).unwrap();
    let b = load_layered_yaml_from_strings(&[]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
