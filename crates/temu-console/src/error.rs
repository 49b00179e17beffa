use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("a terminal session is already active in this process")]
    SessionActive,

    #[error("{op} failed: {source}")]
    Terminal {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to install terminal signal handlers: {0}")]
    SignalHandler(#[source] io::Error),
}
