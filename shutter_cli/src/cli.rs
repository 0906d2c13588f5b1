//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "shutter", version, about = "Roller shutter controller (simulated gateway)")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/shutter.toml")]
    pub config: PathBuf,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

fn parse_percent(s: &str) -> Result<u8, String> {
    let t = s.trim().trim_end_matches('%');
    match t.parse::<u8>() {
        Ok(p) if p <= 100 => Ok(p),
        _ => Err(format!("{s:?} is not a percentage in 0..=100")),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Move to one or more positions in turn (0 = open, 100 = closed)
    Goto {
        /// Target percentages
        #[arg(required = true, value_parser = parse_percent)]
        targets: Vec<u8>,
        /// Give up waiting for a move after this many seconds
        #[arg(long, value_name = "SECS", default_value_t = 120)]
        timeout_s: u64,
    },
    /// Send a command in text form: UP, DOWN, STOP or a percentage
    Send {
        /// Command text
        command: String,
        #[arg(long, value_name = "SECS", default_value_t = 120)]
        timeout_s: u64,
    },
    /// Forget the shutter run, learn it again and end at TARGET
    Calibrate {
        #[arg(long, value_parser = parse_percent, default_value = "50")]
        target: u8,
        #[arg(long, value_name = "SECS", default_value_t = 300)]
        timeout_s: u64,
    },
    /// Print the current estimate and controller state
    Status,
    /// Quick health check (config loads, simulated gateway answers)
    SelfCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_parser_accepts_suffix() {
        assert_eq!(parse_percent("40"), Ok(40));
        assert_eq!(parse_percent("100%"), Ok(100));
        assert!(parse_percent("101").is_err());
        assert!(parse_percent("up").is_err());
    }
}
