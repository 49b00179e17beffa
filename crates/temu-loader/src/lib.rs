//! Opens a built emulator artifact and exposes its machine classes to the bootstrap.
//!
//! [`Artifact::open`] checks the artifact is present, maps it and resolves every exported
//! entry point up front. [`registry`] then wraps each compiled machine class as a
//! [`temu_machine::MachineClass`], so the rest of the harness drives C machines through the
//! same [`temu_machine::Vm`] as any other.
#![cfg(unix)]

mod artifact;
mod error;
mod ffi;
mod machine;

pub use artifact::Artifact;
pub use error::{LoadError, Result};
pub use machine::{registry, ArtifactClass, ArtifactMachine, ArtifactReporter};
