use std::fs;
use std::path::{Path, PathBuf};

use crate::descriptor::BuildDescriptor;
use crate::error::{BuildError, Result};
use crate::glue::{self, GLUE_SOURCE};
use crate::plan::BuildPlan;
use crate::runner::{CommandRunner, ProcessRunner};
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The artifact was already present.
    Skipped,
    Built,
}

/// Compiles and links one artifact.
///
/// The link writes to a staging path next to the artifact and is renamed into place only
/// after it succeeds, so a failed build never leaves a partial artifact behind.
pub struct Builder<R = ProcessRunner> {
    descriptor: BuildDescriptor,
    toolchain: Toolchain,
    runner: R,
}

impl Builder<ProcessRunner> {
    pub fn with_process_runner(descriptor: BuildDescriptor, toolchain: Toolchain) -> Self {
        Self::new(descriptor, toolchain, ProcessRunner::new())
    }
}

impl<R: CommandRunner> Builder<R> {
    pub fn new(descriptor: BuildDescriptor, toolchain: Toolchain, runner: R) -> Self {
        Self {
            descriptor,
            toolchain,
            runner,
        }
    }

    pub fn descriptor(&self) -> &BuildDescriptor {
        &self.descriptor
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn glue_path(&self) -> PathBuf {
        self.descriptor.object_dir.join(GLUE_SOURCE)
    }

    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .descriptor
            .artifact
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "libtemu.so".into());
        name.push(format!(".tmp-{}", std::process::id()));
        self.descriptor.artifact.with_file_name(name)
    }

    pub fn plan(&self) -> Result<BuildPlan> {
        BuildPlan::new(&self.descriptor, &self.glue_path(), &self.staging_path())
    }

    /// Builds unless the artifact already exists. `force` always rebuilds.
    pub fn ensure(&self, force: bool) -> Result<BuildOutcome> {
        let artifact = &self.descriptor.artifact;
        if !force && artifact.is_file() {
            tracing::debug!(artifact = %artifact.display(), "artifact present; skipping build");
            return Ok(BuildOutcome::Skipped);
        }
        self.build()?;
        Ok(BuildOutcome::Built)
    }

    pub fn build(&self) -> Result<()> {
        let plan = self.plan()?;
        let desc = &self.descriptor;

        tracing::info!(
            artifact = %desc.artifact.display(),
            steps = plan.compile.len(),
            "building emulator artifact"
        );

        create_dir_all(&desc.object_dir)?;
        if let Some(parent) = desc.artifact.parent() {
            if !parent.as_os_str().is_empty() {
                create_dir_all(parent)?;
            }
        }

        let glue_path = self.glue_path();
        fs::write(&glue_path, glue::render(&desc.features.version))
            .map_err(|source| io_error(&glue_path, source))?;

        for step in &plan.compile {
            let mut cmd = self.toolchain.compile_command(&desc.source_dir, step);
            self.runner.run_step(&step.describe(), &mut cmd)?;
        }

        let staging = &plan.link.output;
        let linked = self
            .runner
            .run_step(
                &format!("link {}", file_name(&desc.artifact)),
                &mut self.toolchain.link_command(&plan.link),
            )
            .and_then(|()| {
                if staging.is_file() {
                    Ok(())
                } else {
                    Err(BuildError::MissingOutput(staging.clone()))
                }
            });
        if let Err(err) = linked {
            let _ = fs::remove_file(staging);
            return Err(err);
        }

        fs::rename(staging, &desc.artifact).map_err(|source| {
            let _ = fs::remove_file(staging);
            io_error(&desc.artifact, source)
        })?;
        tracing::info!(artifact = %desc.artifact.display(), "artifact ready");
        Ok(())
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> BuildError {
    BuildError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
