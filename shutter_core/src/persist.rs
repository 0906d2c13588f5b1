//! `RunStore` backed by the TOML configuration file.

use std::path::PathBuf;

use shutter_traits::RunStore;

/// Rewrites `shutter.shutter_run` in the config file atomically.
#[derive(Debug, Clone)]
pub struct TomlRunStore {
    path: PathBuf,
}

impl TomlRunStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl RunStore for TomlRunStore {
    fn persist_run(&mut self, run_ms: u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        shutter_config::persist_shutter_run(&self.path, run_ms).map_err(|e| {
            let msg = format!("{e:#}");
            Box::<dyn std::error::Error + Send + Sync>::from(msg)
        })
    }
}
