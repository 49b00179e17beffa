// The harness drives the host terminal and `dlopen`s the artifact, both of which are
// Unix-only. Keep a stub `main` so the workspace still builds elsewhere.
#[cfg(not(unix))]
fn main() {
    eprintln!("temu-harness requires a Unix host");
    std::process::exit(1);
}

#[cfg(unix)]
mod cross_validate;
#[cfg(unix)]
mod image;

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    native::main()
}

#[cfg(unix)]
mod native {
    use std::ffi::OsString;
    use std::fs;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use clap::Parser;
    use temu_build::{BuildDescriptor, BuildOutcome, Builder, DisplayBackend, Toolchain};
    use temu_console::{TerminalConsole, TerminalSession};
    use temu_loader::{registry, Artifact, ArtifactReporter};
    use temu_machine::{run, LoadOptions, Vm, DEFAULT_HEIGHT, DEFAULT_MACHINE, DEFAULT_WIDTH};
    use tracing_subscriber::EnvFilter;

    use crate::{cross_validate, image};

    #[derive(Debug, Parser)]
    #[command(
        name = "temu-harness",
        about = "Build the emulator artifact, load a machine from it and run it on this terminal",
        after_help = "Console: C-a x exits, C-a h prints help, C-a C-a sends C-a."
    )]
    pub struct Args {
        /// Firmware image to boot (`.elf` or `.bin`). Defaults to `<tmp>/test.elf`.
        image: Option<PathBuf>,

        /// Rebuild the artifact even if one already exists.
        #[arg(long, visible_alias = "force-rebuild")]
        build: bool,

        /// Never build; fail if the artifact is missing.
        #[arg(long, conflicts_with = "build")]
        no_build: bool,

        /// Where the artifact is built and loaded from. Defaults to `<tmp>/libtemu.so`.
        #[arg(long, env = "TEMU_ARTIFACT")]
        artifact: Option<PathBuf>,

        /// Directory holding the emulator's C sources and headers.
        #[arg(long, env = "TEMU_SOURCE_DIR", default_value = ".")]
        source_dir: PathBuf,

        /// Machine class to instantiate.
        #[arg(long, default_value = DEFAULT_MACHINE)]
        machine: String,

        /// Guest RAM size in MiB.
        #[arg(long, default_value_t = 100)]
        ram: u64,

        #[arg(long, default_value_t = DEFAULT_WIDTH)]
        width: u32,

        #[arg(long, default_value_t = DEFAULT_HEIGHT)]
        height: u32,

        /// Display device (class default when omitted).
        #[arg(long)]
        display: Option<String>,

        /// Input device (class default when omitted).
        #[arg(long)]
        input: Option<String>,

        /// Kernel command line.
        #[arg(long)]
        cmdline: Option<String>,

        /// Let C-c raise SIGINT instead of reaching the guest.
        #[arg(long)]
        allow_ctrlc: bool,

        /// Build with the emulator's debug dump switches.
        #[arg(long)]
        debug_dumps: bool,

        /// Build with x86 machine support.
        #[arg(long)]
        x86: bool,

        /// Build without the SDL display backend.
        #[arg(long)]
        no_sdl: bool,

        /// Also run the reference emulator on the same image for a bounded time.
        #[arg(long)]
        cross_validate: bool,

        /// How long the reference emulator may run.
        #[arg(long, default_value_t = 5)]
        cross_validate_secs: u64,

        /// Reference emulator program.
        #[arg(long, env = "TEMU_REFERENCE", default_value = "temu")]
        reference: OsString,

        /// Stop after N iterations instead of running until the console exits.
        #[arg(long)]
        max_iterations: Option<u64>,
    }

    impl Args {
        fn descriptor(&self) -> BuildDescriptor {
            let artifact = self
                .artifact
                .clone()
                .unwrap_or_else(BuildDescriptor::default_artifact_path);
            let mut desc = BuildDescriptor::tinyemu(&self.source_dir, artifact);
            desc.features.debug_dumps = self.debug_dumps;
            desc.features.x86 = self.x86;
            if self.no_sdl {
                desc.features.display = DisplayBackend::Headless;
            }
            desc
        }

        fn load_options(&self) -> Result<LoadOptions> {
            let ram_size = self
                .ram
                .checked_mul(1 << 20)
                .context("RAM size overflow")?;
            Ok(LoadOptions {
                machine_name: self.machine.clone(),
                ram_size,
                width: self.width,
                height: self.height,
                display_device: self.display.clone(),
                input_device: self.input.clone(),
                cmdline: self.cmdline.clone(),
            })
        }
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();

        // stdout carries the guest console.
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();

        let (image_path, image_kind) = image::resolve(args.image.as_deref())?;
        let options = args.load_options()?;

        let builder = Builder::with_process_runner(args.descriptor(), Toolchain::from_env());
        let artifact_path = builder.descriptor().artifact.clone();
        if !args.no_build {
            let outcome = builder
                .ensure(args.build)
                .context("failed to build the emulator artifact")?;
            if outcome == BuildOutcome::Skipped {
                tracing::info!(
                    artifact = %artifact_path.display(),
                    "using existing artifact (pass --build to rebuild)"
                );
            }
        }

        let artifact = Rc::new(Artifact::open(&artifact_path)?);
        let mut vm = Vm::new(
            registry(&artifact),
            Box::new(ArtifactReporter::new(Rc::clone(&artifact))),
        );
        tracing::debug!(machines = ?vm.registry().machine_names(), "machine classes");

        let firmware = fs::read(&image_path)
            .with_context(|| format!("failed to read {}", image_path.display()))?;
        tracing::info!(
            image = %image_path.display(),
            kind = ?image_kind,
            len = firmware.len(),
            "firmware loaded"
        );

        let reference = if args.cross_validate {
            let log = std::env::temp_dir().join("temu-reference.log");
            Some(cross_validate::spawn(
                &args.reference,
                &image_path,
                &log,
                Duration::from_secs(args.cross_validate_secs),
            )?)
        } else {
            None
        };

        let session =
            TerminalSession::open(args.allow_ctrlc).context("failed to set up the terminal")?;
        vm.load(&options, &firmware, Box::new(TerminalConsole::stdio()))
            .context("failed to load the machine")?;
        drop(firmware);

        if let Some(size) = session.window_size() {
            vm.console_resize(size.cols, size.rows)?;
        }

        let steps = run(&mut vm, args.max_iterations, |vm| {
            if session.take_resize() {
                if let Some(size) = session.window_size() {
                    vm.console_resize(size.cols, size.rows)?;
                }
            }
            Ok(())
        })?;
        tracing::info!(steps, "iteration limit reached");

        vm.teardown();
        drop(session);

        if let Some(reference) = reference {
            let pid = reference.pid();
            match reference.wait() {
                Ok(status) => tracing::info!(pid, %status, "reference emulator finished"),
                Err(err) => tracing::warn!(pid, "failed to reap reference emulator: {err}"),
            }
        }
        Ok(())
    }
}
