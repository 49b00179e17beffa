use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use temu_build::{
    render_command, BuildDescriptor, BuildError, BuildOutcome, Builder, CommandRunner,
    DisplayBackend, Toolchain,
};

/// Records every step and creates the `-o` output of each successful one.
#[derive(Default)]
struct FakeRunner {
    steps: RefCell<Vec<(String, String)>>,
    fail_on: Option<&'static str>,
    skip_output_for: Option<&'static str>,
}

impl FakeRunner {
    fn failing(desc_prefix: &'static str) -> Self {
        Self {
            fail_on: Some(desc_prefix),
            ..Self::default()
        }
    }

    fn descs(&self) -> Vec<String> {
        self.steps.borrow().iter().map(|(d, _)| d.clone()).collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run_step(&self, desc: &str, cmd: &mut Command) -> temu_build::Result<()> {
        let rendered = render_command(cmd);
        self.steps
            .borrow_mut()
            .push((desc.to_string(), rendered.clone()));

        if self.fail_on.is_some_and(|p| desc.starts_with(p)) {
            return Err(BuildError::CommandFailed {
                desc: desc.to_string(),
                command: rendered,
                code: Some(1),
            });
        }
        if self.skip_output_for.is_some_and(|p| desc.starts_with(p)) {
            return Ok(());
        }

        let args: Vec<_> = cmd.get_args().collect();
        let out = args
            .iter()
            .position(|a| *a == "-o")
            .map(|i| PathBuf::from(args[i + 1]))
            .expect("every step names an output");
        fs::write(out, b"obj").unwrap();
        Ok(())
    }
}

fn descriptor(root: &Path) -> BuildDescriptor {
    let mut desc = BuildDescriptor::tinyemu(root.join("src"), root.join("out/libtemu.so"));
    desc.features.display = DisplayBackend::Headless;
    desc
}

fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn builds_glue_first_and_one_object_per_width() {
    let tmp = tempfile::tempdir().unwrap();
    let desc = descriptor(tmp.path());
    let builder = Builder::new(desc.clone(), Toolchain::new("cc"), FakeRunner::default());

    assert_eq!(builder.ensure(false).unwrap(), BuildOutcome::Built);
    assert!(desc.artifact.is_file());

    let descs = builder.runner().descs();
    assert_eq!(descs[0], "compile temu_glue.c");
    assert_eq!(
        &descs[1..4],
        [
            "compile riscv_cpu.c (xlen 32)",
            "compile riscv_cpu.c (xlen 64)",
            "compile riscv_cpu.c (xlen 128)",
        ]
    );
    assert_eq!(descs.last().map(String::as_str), Some("link libtemu.so"));

    let glue = fs::read_to_string(desc.object_dir.join("temu_glue.c")).unwrap();
    assert!(glue.contains("temu_vm_iterate"));
    for xlen in [32, 64, 128] {
        assert!(desc.object_dir.join(format!("riscv_cpu{xlen}.o")).is_file());
    }

    let steps = builder.runner().steps.borrow();
    let (_, link) = steps.last().unwrap();
    assert!(link.starts_with("cc -shared -o "));
    assert!(link.contains("riscv_cpu32.o"));
    assert!(link.contains("riscv_cpu128.o"));
    assert!(!link.contains("-lSDL2"));

    assert_eq!(leftovers(&tmp.path().join("out")).len(), 2, "artifact + object dir only");
}

#[test]
fn compile_failure_leaves_no_artifact_and_skips_link() {
    let tmp = tempfile::tempdir().unwrap();
    let desc = descriptor(tmp.path());
    let builder = Builder::new(
        desc.clone(),
        Toolchain::default(),
        FakeRunner::failing("compile riscv_cpu.c (xlen 64)"),
    );

    let err = builder.build().unwrap_err();
    match &err {
        BuildError::CommandFailed { desc, command, .. } => {
            assert_eq!(desc, "compile riscv_cpu.c (xlen 64)");
            assert!(command.contains("-DMAX_XLEN=64"), "{command}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("exit code 1"));
    assert!(!desc.artifact.exists());
    assert!(!builder.runner().descs().iter().any(|d| d.starts_with("link")));
}

#[test]
fn link_failure_leaves_no_artifact_or_staging_file() {
    let tmp = tempfile::tempdir().unwrap();
    let desc = descriptor(tmp.path());
    let builder = Builder::new(desc.clone(), Toolchain::default(), FakeRunner::failing("link"));

    assert!(builder.build().is_err());
    assert!(!desc.artifact.exists());
    assert!(!builder.staging_path().exists());
    assert_eq!(leftovers(&tmp.path().join("out")), ["libtemu-obj"]);
}

#[test]
fn silent_link_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let desc = descriptor(tmp.path());
    let runner = FakeRunner {
        skip_output_for: Some("link"),
        ..FakeRunner::default()
    };
    let builder = Builder::new(desc.clone(), Toolchain::default(), runner);

    assert!(matches!(
        builder.build(),
        Err(BuildError::MissingOutput(path)) if path == builder.staging_path()
    ));
    assert!(!desc.artifact.exists());
}

#[test]
fn existing_artifact_is_reused_unless_forced() {
    let tmp = tempfile::tempdir().unwrap();
    let desc = descriptor(tmp.path());
    fs::create_dir_all(desc.artifact.parent().unwrap()).unwrap();
    fs::write(&desc.artifact, b"previous").unwrap();

    let builder = Builder::new(desc.clone(), Toolchain::default(), FakeRunner::default());
    assert_eq!(builder.ensure(false).unwrap(), BuildOutcome::Skipped);
    assert!(builder.runner().descs().is_empty());
    assert_eq!(fs::read(&desc.artifact).unwrap(), b"previous");

    assert_eq!(builder.ensure(true).unwrap(), BuildOutcome::Built);
    assert_eq!(fs::read(&desc.artifact).unwrap(), b"obj");
}

#[test]
fn invalid_descriptor_runs_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let mut desc = descriptor(tmp.path());
    desc.cpu.widths = vec![64, 64];
    let builder = Builder::new(desc, Toolchain::default(), FakeRunner::default());

    assert!(matches!(
        builder.build(),
        Err(BuildError::InvalidDescriptor(_))
    ));
    assert!(builder.runner().descs().is_empty());
}
