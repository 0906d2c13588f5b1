use shutter_core::TomlRunStore;
use shutter_traits::RunStore;

const CFG: &str = r#"
[shutter]
address = "765432101"
bus = "zigbee"
shutter_run = "AUTO"

[simulator]
travel_ms = 18000
"#;

#[test]
fn learned_run_is_written_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shutter.toml");
    std::fs::write(&path, CFG).unwrap();

    let mut store = TomlRunStore::new(&path);
    store.persist_run(18_250).unwrap();

    let table: toml::Table = std::fs::read_to_string(&path).unwrap().parse().unwrap();
    assert_eq!(table["shutter"]["shutter_run"].as_str(), Some("18250"));
    assert_eq!(table["simulator"]["travel_ms"].as_integer(), Some(18_000));

    // The file still loads as a valid configuration.
    let cfg = shutter_config::load_file(&path).unwrap();
    assert_eq!(
        cfg.shutter.run_setting().unwrap(),
        shutter_config::RunSetting::Millis(18_250)
    );
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TomlRunStore::new(dir.path().join("absent.toml"));
    let err = store.persist_run(5_000).unwrap_err();
    assert!(err.to_string().contains("read config"), "{err}");
}
