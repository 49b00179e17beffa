//! Runs a reference emulator on the same image alongside the harness, for a bounded time.
//!
//! A watchdog thread kills the reference once its time is up. A console exit (`C-a x` or end
//! of input) leaves through `process::exit` without joining the watchdog, so a reference that
//! is still running is killed from an exit hook instead. A fatal signal skips exit hooks; only
//! Linux, through the parent-death signal, kills the reference in that case.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, Once, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Pid of the reference emulator, until its watchdog reaps it.
static LIVE: Mutex<Option<u32>> = Mutex::new(None);
static EXIT_HOOK: Once = Once::new();

fn live() -> MutexGuard<'static, Option<u32>> {
    LIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn kill_live_reference() {
    if let Some(pid) = live().take() {
        // SAFETY: the watchdog has not reaped `pid`, so it still names the reference.
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    }
}

extern "C" fn kill_at_exit() {
    kill_live_reference();
}

/// A running reference emulator and the watchdog that ends it.
#[derive(Debug)]
pub struct Reference {
    pid: u32,
    watchdog: JoinHandle<io::Result<ExitStatus>>,
}

impl Reference {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Blocks until the reference has exited or been killed.
    pub fn wait(self) -> io::Result<ExitStatus> {
        self.watchdog
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("cross-validation watchdog panicked")))
    }
}

/// Starts `program <image>` with its output sent to `log`, and kills it after `bound`.
pub fn spawn(program: &OsStr, image: &Path, log: &Path, bound: Duration) -> Result<Reference> {
    let log_file =
        File::create(log).with_context(|| format!("failed to create {}", log.display()))?;
    let log_err = log_file
        .try_clone()
        .with_context(|| format!("failed to reopen {}", log.display()))?;

    let mut cmd = Command::new(program);
    cmd.arg(image)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_err));

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: prctl is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| {
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn().with_context(|| {
        format!(
            "failed to start reference emulator {}",
            program.to_string_lossy()
        )
    })?;
    let pid = child.id();
    *live() = Some(pid);
    EXIT_HOOK.call_once(|| {
        // SAFETY: registering a plain `extern "C"` function.
        if unsafe { libc::atexit(kill_at_exit) } != 0 {
            tracing::warn!("failed to register reference emulator cleanup at exit");
        }
    });
    tracing::info!(
        pid,
        program = %program.to_string_lossy(),
        seconds = bound.as_secs_f64(),
        log = %log.display(),
        "reference emulator started"
    );

    let watchdog = thread::Builder::new()
        .name("cross-validate".to_string())
        .spawn(move || watch(child, bound))
        .context("failed to start cross-validation watchdog")?;
    Ok(Reference { pid, watchdog })
}

fn watch(mut child: Child, bound: Duration) -> io::Result<ExitStatus> {
    let deadline = Instant::now() + bound;
    loop {
        if let Some(status) = try_reap(&mut child)? {
            tracing::info!(%status, "reference emulator exited");
            return Ok(status);
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }

    {
        let mut live = live();
        match child.kill() {
            Ok(()) => tracing::info!(pid = child.id(), "reference emulator stopped"),
            // Exited between the last poll and the kill.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => return Err(err),
        }
        forget(&mut live, child.id());
    }
    child.wait()
}

/// Polls the child while holding `LIVE`, so the exit hook never signals a reaped pid.
fn try_reap(child: &mut Child) -> io::Result<Option<ExitStatus>> {
    let mut live = live();
    let status = child.try_wait()?;
    if status.is_some() {
        forget(&mut live, child.id());
    }
    Ok(status)
}

fn forget(live: &mut Option<u32>, pid: u32) {
    if *live == Some(pid) {
        *live = None;
    }
}
