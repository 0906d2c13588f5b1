#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parsing, validation and shutter-run resolution must reject bad input
    // gracefully and never panic.
    if let Ok(cfg) = toml::from_str::<shutter_config::Config>(data) {
        let _ = cfg.validate();
        let _ = cfg.shutter.run_setting();
    }
    let _ = shutter_config::RunSetting::parse(data);
});
