//! Machine bootstrap and execution driver.
//!
//! A [`Vm`] resolves a [`MachineClass`] by name from its [`ClassRegistry`], builds the
//! [`MachineConfig`] record (generic defaults, then class defaults, then [`LoadOptions`] and
//! the firmware image), constructs the machine with a console attached, and then steps it
//! with a fixed cycle budget ([`MAX_EXEC_CYCLE`]).

mod class;
mod config;
mod error;
mod report;
mod vm;

pub use class::{ClassRegistry, Machine, MachineClass};
pub use config::{FileKind, FileSlot, MachineConfig};
pub use error::{Result, VmError};
pub use report::{ErrorReporter, RecordingReporter, StderrReporter};
pub use vm::{
    run, LoadOptions, Vm, BIOS_FILE_NAME, DEFAULT_HEIGHT, DEFAULT_MACHINE, DEFAULT_RAM_SIZE,
    DEFAULT_WIDTH, MAX_EXEC_CYCLE,
};
