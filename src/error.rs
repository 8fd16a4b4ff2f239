use thiserror::Error;

use crate::host::TargetMode;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Target mode conflict: {requested} target requested while in {current} mode")]
    ModeConflict {
        current: TargetMode,
        requested: TargetMode,
    },

    #[error("Channel '{channel}' is already registered with a different payload type")]
    ChannelTypeMismatch { channel: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, IpcError>;

impl From<bincode::Error> for IpcError {
    fn from(err: bincode::Error) -> Self {
        IpcError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        IpcError::Serialization(err.to_string())
    }
}
