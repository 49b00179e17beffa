use std::env;
use std::io;
use std::process::Command;

use crate::error::{BuildError, Result};
use crate::toolchain::render_command;

/// Executes one external build step.
pub trait CommandRunner {
    fn run_step(&self, desc: &str, cmd: &mut Command) -> Result<()>;
}

/// Runs steps as child processes, echoing each one to stderr.
#[derive(Debug)]
pub struct ProcessRunner {
    github_actions: bool,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        let github_actions = env::var("GITHUB_ACTIONS")
            .map(|v| v == "true")
            .unwrap_or(false);
        Self { github_actions }
    }
}

impl CommandRunner for ProcessRunner {
    fn run_step(&self, desc: &str, cmd: &mut Command) -> Result<()> {
        let rendered = render_command(cmd);
        if self.github_actions {
            eprintln!("::group::{desc}");
        } else {
            eprintln!("==> {desc}");
        }
        eprintln!("{rendered}");

        let status = cmd.status();

        if self.github_actions {
            eprintln!("::endgroup::");
        }

        let program = cmd.get_program().to_string_lossy().into_owned();
        let status = status.map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => BuildError::MissingCommand { program },
            _ => BuildError::Spawn { program, source },
        })?;

        if status.success() {
            tracing::debug!(step = desc, "build step finished");
            Ok(())
        } else {
            Err(BuildError::CommandFailed {
                desc: desc.to_string(),
                command: rendered,
                code: status.code(),
            })
        }
    }
}
