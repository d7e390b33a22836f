use std::{env, fs, path::PathBuf};

use octowl_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("octowl.toml");

    let toml_content = r#"
[worklist]
data_folder = "/var/lib/octowl/worklist"
file_prefix = "mwl"
template_file = "/etc/octowl/template.dcm"

[network]
port = 11112
ae_title = "RIS_MWL"
max_receive_pdu_length = 32768
dimse_timeout_secs = 10

[logging]
level = "debug"

[status]
report_interval_secs = 60
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unset keys keep their defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.worklist.data_folder, PathBuf::from("/var/lib/octowl/worklist"));
    assert_eq!(cfg.worklist.file_prefix, "mwl");
    assert_eq!(
        cfg.worklist.template_file.as_deref(),
        Some(PathBuf::from("/etc/octowl/template.dcm").as_path())
    );
    assert_eq!(cfg.network.port, 11112);
    assert_eq!(cfg.network.ae_title, "RIS_MWL");
    assert_eq!(cfg.network.dimse_timeout_secs, 10);
    assert_eq!(cfg.network.acse_timeout_secs, 30);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.status.report_interval_secs, 60);

    // 2) Env override should win over file
    unsafe {
        env::set_var("OCTOWL__NETWORK__PORT", "4242");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.network.port, 4242);
    unsafe {
        env::remove_var("OCTOWL__NETWORK__PORT");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[network]
ae_title = "THIS_AE_TITLE_IS_TOO_LONG"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("ae_title"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let missing = dir.path().join("absent.toml");
    let cfg = load_config(missing.to_str()).expect("defaults are valid");
    assert_eq!(cfg.worklist.file_prefix, "dataset");
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.report_interval().as_secs(), 5);
}
