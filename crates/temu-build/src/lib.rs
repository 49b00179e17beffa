//! Builds the emulator's C sources into one loadable shared artifact.
//!
//! A [`BuildDescriptor`] names the sources and feature switches; [`BuildPlan`] expands it into
//! compile steps (the CPU core once per register width) and a link; [`Builder`] runs the plan
//! through a [`CommandRunner`] and installs the artifact atomically.

mod builder;
mod descriptor;
mod error;
pub mod glue;
mod plan;
mod runner;
mod toolchain;

pub use builder::{BuildOutcome, Builder};
pub use descriptor::{
    BuildDescriptor, CpuCore, DisplayBackend, Features, ARTIFACT_FILE_NAME, SUPPORTED_XLENS,
};
pub use error::{BuildError, Result};
pub use plan::{BuildPlan, CompileStep, LinkStep, Role};
pub use runner::{CommandRunner, ProcessRunner};
pub use toolchain::{render_command, Toolchain};
