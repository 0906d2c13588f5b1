use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("gateway ack timeout")]
    AckTimeout,
    #[error("gateway disconnected")]
    Disconnected,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
