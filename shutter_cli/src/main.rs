#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod cli;
mod error_fmt;
mod session;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use shutter_core::Command;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};
use crate::session::{MoveReport, Session};

/// Exit code after Ctrl-C stopped a move.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    let code = match real_main(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            if *JSON_MODE.get().unwrap_or(&false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

fn real_main(cli: &Cli) -> eyre::Result<i32> {
    let cfg = shutter_config::load_file(&cli.config)?;
    init_tracing(cli, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&shutdown);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .wrap_err("install Ctrl-C handler")?;
    }

    let session = Session::open(&cfg, &cli.config, Arc::clone(&shutdown))?;
    match &cli.cmd {
        Commands::Goto { targets, timeout_s } => {
            let timeout = Duration::from_secs(*timeout_s);
            for &target in targets {
                let report = session.execute(Command::GoToPercent(target), timeout)?;
                print_move(cli, &report);
                if report.interrupted {
                    return Ok(EXIT_INTERRUPTED);
                }
            }
        }
        Commands::Send { command, timeout_s } => {
            let cmd: Command = command.parse()?;
            let report = session.execute(cmd, Duration::from_secs(*timeout_s))?;
            print_move(cli, &report);
            if report.interrupted {
                return Ok(EXIT_INTERRUPTED);
            }
        }
        Commands::Calibrate { target, timeout_s } => {
            let report = session.calibrate(*target, Duration::from_secs(*timeout_s))?;
            print_move(cli, &report);
            if report.interrupted {
                return Ok(EXIT_INTERRUPTED);
            }
        }
        Commands::Status => {
            let report = session.status();
            if cli.json {
                println!("{}", report.to_json());
            } else {
                println!("{}", report.render());
            }
        }
        Commands::SelfCheck => {
            let report = session.status();
            if cli.json {
                println!("{}", serde_json::json!({ "ok": true, "status": report.to_json() }));
            } else {
                println!("OK ({})", report.render());
            }
        }
    }
    Ok(0)
}

fn print_move(cli: &Cli, report: &MoveReport) {
    if cli.json {
        println!("{}", report.to_json());
    } else {
        println!("{}", report.render());
    }
}

/// Console logs go to stderr (pretty or JSON); `[logging] file` adds a JSON
/// file sink with optional rotation. `RUST_LOG` overrides the level.
fn init_tracing(cli: &Cli, logging: &shutter_config::Logging) -> eyre::Result<()> {
    let level = logging
        .level
        .clone()
        .filter(|_| cli.log_level == "info")
        .unwrap_or_else(|| cli.log_level.clone());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let console = if cli.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };

    let file = match logging.file.as_deref() {
        Some(path) => {
            let path = Path::new(path);
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file {} has no file name", path.display()))?;
            let appender = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
