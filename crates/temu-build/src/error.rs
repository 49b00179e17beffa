use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{desc} failed ({}): {command}", exit_status(.code))]
    CommandFailed {
        desc: String,
        command: String,
        code: Option<i32>,
    },

    #[error("missing required command: {program}")]
    MissingCommand { program: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid build descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("object {} would be produced by more than one compile step", .0.display())]
    DuplicateObject(PathBuf),

    #[error("link reported success but produced no artifact at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
