use thiserror::Error;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("unknown machine name: {0}")]
    UnknownMachineClass(String),

    #[error("a machine is already loaded; tear it down before loading another")]
    AlreadyLoaded,

    #[error("no machine loaded")]
    NotLoaded,

    #[error("firmware image is empty")]
    EmptyFirmware,

    #[error("{kind} image too large: {len} bytes")]
    FileTooLarge { kind: &'static str, len: usize },

    #[error("invalid machine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to initialize machine {machine}: {reason}")]
    InitFailed { machine: String, reason: String },
}
