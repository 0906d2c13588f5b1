use std::fs;

use shutter_config::{RunSetting, load_file, persist_shutter_run};
use tempfile::tempdir;

#[test]
fn persist_rewrites_run_and_keeps_other_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shutter.toml");
    fs::write(
        &path,
        r#"
[shutter]
address = "21"
bus = "point-to-point"
shutter_run = "AUTO"
min_step_ms = 80

[simulator]
travel_ms = 4000
"#,
    )
    .unwrap();

    persist_shutter_run(&path, 18_250).expect("persist");

    let cfg = load_file(&path).expect("reload");
    assert_eq!(cfg.shutter.run_setting().unwrap(), RunSetting::Millis(18_250));
    assert_eq!(cfg.shutter.address, "21");
    assert_eq!(cfg.shutter.min_step_ms, 80);
    assert_eq!(cfg.simulator.travel_ms, 4000);
    // Written as a decimal string
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("shutter_run = \"18250\""), "{text}");
    // No temp file left behind
    assert!(!dir.path().join("shutter.toml.new").exists());
}

#[test]
fn persist_adds_missing_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "[shutter]\naddress = \"7\"\n").unwrap();
    persist_shutter_run(&path, 5000).unwrap();
    let cfg = load_file(&path).unwrap();
    assert_eq!(cfg.shutter.run_setting().unwrap(), RunSetting::Millis(5000));
}

#[test]
fn persist_reports_missing_file() {
    let dir = tempdir().unwrap();
    let err = persist_shutter_run(&dir.path().join("absent.toml"), 5000).expect_err("no file");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn persist_keeps_comments_and_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shutter.toml");
    let before = r#"# Living room shutter
[shutter]
address = "21"
shutter_run = "AUTO"    # learned on first move
min_step_ms = 50

[logging]
# file = "logs/shutter.log"
level = "info"
"#;
    fs::write(&path, before).unwrap();

    persist_shutter_run(&path, 18_250).unwrap();

    let after = fs::read_to_string(&path).unwrap();
    let expected = before.replace("\"AUTO\"", "\"18250\"");
    assert_eq!(after, expected);
}

#[test]
fn persist_refuses_non_table_shutter() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cfg.toml");
    fs::write(&path, "shutter = 5\n").unwrap();
    let err = persist_shutter_run(&path, 5000).expect_err("not a table");
    assert!(format!("{err}").contains("not a table"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "shutter = 5\n");
}
