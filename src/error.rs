use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("NOT_PAUSED: Process must be paused/suspended before emulating.")]
    NotPaused,

    #[error("CONNECT_FAILED: Could not reach emulation worker at {addr}: {source}")]
    ConnectFailure {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PROTOCOL_ERROR: {0}")]
    Protocol(String),

    #[error("PROTOCOL_ERROR: Worker requested unknown host function '{0}'")]
    UnknownCallback(String),

    #[error("WORKER_ERROR: {0}")]
    Worker(String),

    #[error("WORKER_TIMEOUT: No message from emulation worker within {0:?}")]
    WorkerTimeout(Duration),

    #[error("HOST_ERROR: {0}")]
    Host(String),

    #[error("LAUNCH_FAILED: Failed to start emulation worker: {0}")]
    Launch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// `NotPaused` is a warning; everything else abandons the request.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::NotPaused)
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::UnknownCallback(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
