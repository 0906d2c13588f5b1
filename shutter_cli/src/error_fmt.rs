//! Human-readable error descriptions and structured JSON error formatting.

use shutter_core::error::{BuildError, ShutterError};

/// Stable short name of an error for JSON consumers.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<ShutterError>() {
        return match se {
            ShutterError::Config(_) => "Config",
            ShutterError::UnsupportedCommand(_) => "UnsupportedCommand",
            ShutterError::UnsupportedEvent(_) => "UnsupportedEvent",
            ShutterError::InsufficientInformation(_) => "InsufficientInformation",
            ShutterError::Busy(_) => "Busy",
            ShutterError::Gateway(_) => "Gateway",
            ShutterError::Timeout => "Timeout",
            ShutterError::Persist(_) => "Persist",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingGateway => {
                "What happened: No gateway was provided to the shutter.\nLikely causes: The bus connection failed to initialize.\nHow to fix: Check the gateway settings and pass it via with_gateway(...).".to_string()
            }
            BuildError::MissingAddress => {
                "What happened: No shutter address was configured.\nLikely causes: [shutter] address missing from the TOML.\nHow to fix: Set shutter.address in the config file.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/shutter.toml for a sample."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<ShutterError>() {
        return match se {
            ShutterError::Busy(motion) => format!(
                "What happened: The shutter is {motion}; a new target is only accepted when it is stopped.\nHow to fix: Wait for the current move to finish or send STOP first."
            ),
            ShutterError::InsufficientInformation(what) => format!(
                "What happened: Cannot compute the move ({what}).\nLikely causes: The position is unknown because the shutter was moved without a known shutter run.\nHow to fix: Send the shutter to 0 or 100 once, or run `shutter calibrate`."
            ),
            ShutterError::UnsupportedCommand(cmd) => format!(
                "What happened: Unsupported command {cmd:?}.\nHow to fix: Use UP, DOWN, STOP or a percentage between 0 and 100."
            ),
            ShutterError::Timeout => {
                "What happened: The shutter did not settle or answer in time.\nLikely causes: Gateway not acknowledging, or a timeout shorter than the travel time.\nHow to fix: Raise --timeout-s or check the gateway link.".to_string()
            }
            ShutterError::Config(msg) => format!(
                "What happened: Invalid shutter setting ({msg}).\nHow to fix: Set shutter.shutter_run to AUTO or a number of milliseconds >= 1000."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: The config file could not be read.\nHow to fix: Pass an existing file with --config. Original: {msg}"
        );
    }
    if lower.starts_with("parse config") {
        return format!(
            "What happened: The config file is not valid TOML for this program.\nLikely causes: Typo, missing [shutter] section, or a value of the wrong type.\nHow to fix: Compare with etc/shutter.toml. Original: {msg}"
        );
    }
    if lower.contains("must be") || lower.contains("unreasonably large") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything untyped returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<ShutterError>() {
        return match se {
            ShutterError::Config(_) | ShutterError::UnsupportedCommand(_) => 2,
            ShutterError::Busy(_) => 3,
            ShutterError::InsufficientInformation(_) => 4,
            ShutterError::Timeout => 5,
            ShutterError::Gateway(_) => 6,
            ShutterError::UnsupportedEvent(_) | ShutterError::Persist(_) => 1,
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
