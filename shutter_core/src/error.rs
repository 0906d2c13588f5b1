use thiserror::Error;

use crate::status::MotionState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShutterError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unsupported command: {0}")]
    UnsupportedCommand(String),
    #[error("unsupported event: {0}")]
    UnsupportedEvent(String),
    #[error("insufficient information: {0}")]
    InsufficientInformation(&'static str),
    #[error("shutter is busy ({0}), target rejected")]
    Busy(MotionState),
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("gateway timeout")]
    Timeout,
    #[error("persistence error: {0}")]
    Persist(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing gateway")]
    MissingGateway,
    #[error("missing shutter address")]
    MissingAddress,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
