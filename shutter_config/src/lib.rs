#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and shutter-run handling for the shutter controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `RunSetting` parses the shutter-run literal (`AUTO` or milliseconds).
//! - `persist_shutter_run` writes a learned run back into the TOML file,
//!   leaving the rest of the document untouched.
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

mod atomic;

pub use atomic::write_atomic;

/// Smallest accepted configured shutter run, in milliseconds.
pub const MIN_SHUTTER_RUN_MS: u64 = 1000;

/// Literal that means "unknown, learn it by calibration".
pub const AUTO_LITERAL: &str = "AUTO";

/// Parsed shutter-run setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunSetting {
    #[default]
    Auto,
    Millis(u64),
}

impl RunSetting {
    /// Parse `AUTO` (any case) or a decimal integer >= 1000.
    pub fn parse(s: &str) -> eyre::Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(AUTO_LITERAL) {
            return Ok(RunSetting::Auto);
        }
        let ms: u64 = s.parse().map_err(|_| {
            eyre::eyre!("shutter_run must be AUTO or an integer >= {MIN_SHUTTER_RUN_MS}, got {s:?}")
        })?;
        if ms < MIN_SHUTTER_RUN_MS {
            eyre::bail!("shutter_run must be AUTO or an integer >= {MIN_SHUTTER_RUN_MS}, got {ms}");
        }
        Ok(RunSetting::Millis(ms))
    }
}

impl FromStr for RunSetting {
    type Err = eyre::Report;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RunSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunSetting::Auto => f.write_str(AUTO_LITERAL),
            RunSetting::Millis(ms) => write!(f, "{ms}"),
        }
    }
}

/// Raw `shutter_run` value as written in TOML: a string or a bare integer.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RunLiteral {
    Text(String),
    Number(i64),
}

impl RunLiteral {
    /// Text form handed to `RunSetting::parse`.
    pub fn as_text(&self) -> String {
        match self {
            RunLiteral::Text(s) => s.clone(),
            RunLiteral::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BusCfg {
    #[default]
    Zigbee,
    PointToPoint,
}

#[derive(Debug, Deserialize)]
pub struct ShutterSection {
    /// Bus address ("where") of the actuator.
    pub address: String,
    #[serde(default)]
    pub bus: BusCfg,
    /// `AUTO`, an integer >= 1000, or the same integer as a string.
    /// Absent means `AUTO`.
    #[serde(default)]
    pub shutter_run: Option<RunLiteral>,
    /// Moves shorter than this are not executed.
    #[serde(default = "default_min_step_ms")]
    pub min_step_ms: u64,
}

fn default_min_step_ms() -> u64 {
    50
}

impl ShutterSection {
    /// Shutter run as text, defaulting to `AUTO`.
    pub fn run_text(&self) -> String {
        self.shutter_run
            .as_ref()
            .map_or_else(|| AUTO_LITERAL.to_string(), RunLiteral::as_text)
    }

    /// Parsed shutter run. An error here is a device configuration error,
    /// not a reason to refuse loading the file.
    pub fn run_setting(&self) -> eyre::Result<RunSetting> {
        RunSetting::parse(&self.run_text())
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulatorCfg {
    /// Physical time for a full 0..100 traversal of the simulated motor.
    pub travel_ms: u64,
    /// Initial physical position (0 = open, 100 = closed).
    pub start_position: u8,
    /// Artificial delay per sent frame, emulating a synchronous bus ack.
    pub ack_delay_ms: u64,
}

impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            travel_ms: 20_000,
            start_position: 30,
            ack_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub shutter: ShutterSection,
    #[serde(default)]
    pub simulator: SimulatorCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Shutter
        if self.shutter.address.trim().is_empty() {
            eyre::bail!("shutter.address must not be empty");
        }
        if self.shutter.min_step_ms == 0 {
            eyre::bail!("shutter.min_step_ms must be >= 1");
        }
        if self.shutter.min_step_ms > 10_000 {
            eyre::bail!("shutter.min_step_ms is unreasonably large (>10s)");
        }
        // shutter_run is deliberately not checked here; see ShutterSection::run_setting

        // Simulator
        if self.simulator.travel_ms == 0 {
            eyre::bail!("simulator.travel_ms must be >= 1");
        }
        if self.simulator.travel_ms > 10 * 60 * 1000 {
            eyre::bail!("simulator.travel_ms is unreasonably large (>10min)");
        }
        if self.simulator.start_position > 100 {
            eyre::bail!("simulator.start_position must be in [0, 100]");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

/// Rewrite `shutter.shutter_run` in the TOML file at `path` with a learned
/// value. Comments, key order and formatting of the rest of the file are
/// kept, as is a trailing comment on the replaced line. The write is atomic.
pub fn persist_shutter_run(path: &Path, run_ms: u64) -> eyre::Result<()> {
    const KEY: &str = "shutter_run";
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let mut doc: toml_edit::DocumentMut = text
        .parse()
        .map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?;
    let shutter = doc.entry("shutter").or_insert_with(toml_edit::table);
    let Some(table) = shutter.as_table_like_mut() else {
        eyre::bail!("config {}: [shutter] is not a table", path.display());
    };

    let mut value = toml_edit::Value::from(run_ms.to_string());
    if let Some(old) = table.get(KEY).and_then(toml_edit::Item::as_value) {
        *value.decor_mut() = old.decor().clone();
    }
    table.insert(KEY, toml_edit::Item::Value(value));

    write_atomic(path, doc.to_string().as_bytes())
        .map_err(|e| eyre::eyre!("write config {}: {e}", path.display()))
}
