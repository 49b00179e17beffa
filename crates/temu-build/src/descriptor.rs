use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

/// File name of the artifact at its well-known location.
pub const ARTIFACT_FILE_NAME: &str = "libtemu.so";

/// Register widths the CPU core can be instantiated for.
pub const SUPPORTED_XLENS: [u32; 3] = [32, 64, 128];

const DUMP_DEFINES: [&str; 6] = [
    "DUMP_INVALID_MEM_ACCESS",
    "DUMP_MMU_EXCEPTIONS",
    "DUMP_INTERRUPTS",
    "DUMP_INVALID_CSR",
    "DUMP_EXCEPTIONS",
    "DUMP_CSR",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayBackend {
    /// SDL window; links the host SDL2 library.
    Sdl,
    /// No host display.
    Headless,
}

/// Compile-time feature switches shared by every module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Features {
    /// Value of `CONFIG_VERSION`.
    pub version: String,
    pub debug_dumps: bool,
    pub display: DisplayBackend,
    /// Widest register width any CPU core variant may use (`CONFIG_RISCV_MAX_XLEN`).
    pub max_xlen: u32,
    /// Secondary x86 machine support (`CONFIG_X86EMU`).
    pub x86: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            debug_dumps: false,
            display: DisplayBackend::Sdl,
            max_xlen: 128,
            x86: false,
        }
    }
}

impl Features {
    /// Preprocessor definitions applied to every compile step, without the `-D` prefix.
    pub fn defines(&self) -> Vec<String> {
        let mut defines = vec![format!("CONFIG_VERSION=\"{}\"", self.version)];
        if self.display == DisplayBackend::Sdl {
            defines.push("CONFIG_SDL".to_string());
        }
        defines.push(format!("CONFIG_RISCV_MAX_XLEN={}", self.max_xlen));
        if self.x86 {
            defines.push("CONFIG_X86EMU".to_string());
        }
        if self.debug_dumps {
            defines.extend(DUMP_DEFINES.iter().map(|d| d.to_string()));
        }
        defines
    }

    /// Host libraries the artifact links against.
    pub fn link_libs(&self) -> Vec<String> {
        match self.display {
            DisplayBackend::Sdl => vec!["SDL2".to_string()],
            DisplayBackend::Headless => Vec::new(),
        }
    }
}

/// CPU core source instantiated once per register width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuCore {
    pub source: String,
    pub widths: Vec<u32>,
}

/// Everything needed to produce one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescriptor {
    /// Directory holding the C sources and headers.
    pub source_dir: PathBuf,
    /// Final artifact path.
    pub artifact: PathBuf,
    /// Directory for generated sources and object files.
    pub object_dir: PathBuf,
    pub core: Vec<String>,
    pub graphics: Vec<String>,
    pub cpu: CpuCore,
    pub machines: Vec<String>,
    pub hardware: Vec<String>,
    pub features: Features,
}

fn names(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}

impl BuildDescriptor {
    /// The full emulator: RISC-V at 32/64/128 bits, x86 machine sources, SDL display and the
    /// PC-style hardware models.
    pub fn tinyemu(source_dir: impl Into<PathBuf>, artifact: impl Into<PathBuf>) -> Self {
        let artifact = artifact.into();
        let object_dir = default_object_dir(&artifact);
        Self {
            source_dir: source_dir.into(),
            artifact,
            object_dir,
            core: names("virtio.c pci.c fs.c cutils.c iomem.c simplefb.c elf.c"),
            graphics: names("sdl.c vga.c softfp.c"),
            cpu: CpuCore {
                source: "riscv_cpu.c".to_string(),
                widths: SUPPORTED_XLENS.to_vec(),
            },
            machines: names("riscv_machine.c x86_cpu.c x86_machine.c"),
            hardware: names("vmmouse.c ps2.c ide.c fs_disk.c pckbd.c"),
            features: Features::default(),
        }
    }

    /// `<system temp dir>/libtemu.so`.
    pub fn default_artifact_path() -> PathBuf {
        std::env::temp_dir().join(ARTIFACT_FILE_NAME)
    }

    /// Checks the invariants a correct link depends on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(BuildError::InvalidDescriptor(msg)) };

        if self.cpu.widths.is_empty() {
            return invalid(format!("no register widths for {}", self.cpu.source));
        }
        let mut seen = HashSet::new();
        for &width in &self.cpu.widths {
            if !SUPPORTED_XLENS.contains(&width) {
                return invalid(format!(
                    "unsupported register width {width} (expected one of {SUPPORTED_XLENS:?})"
                ));
            }
            if width > self.features.max_xlen {
                return invalid(format!(
                    "register width {width} exceeds the configured maximum {}",
                    self.features.max_xlen
                ));
            }
            if !seen.insert(width) {
                return invalid(format!("register width {width} listed twice"));
            }
        }

        let mut sources = HashSet::new();
        for source in self.shared_sources() {
            if source == &self.cpu.source {
                return invalid(format!(
                    "{source} is the CPU core and must only be built per register width"
                ));
            }
            if !sources.insert(source) {
                return invalid(format!("{source} listed twice"));
            }
        }
        Ok(())
    }

    /// Sources compiled exactly once, in link order.
    pub fn shared_sources(&self) -> impl Iterator<Item = &String> {
        self.core
            .iter()
            .chain(&self.graphics)
            .chain(&self.machines)
            .chain(&self.hardware)
    }
}

fn default_object_dir(artifact: &Path) -> PathBuf {
    let parent = artifact.parent().unwrap_or_else(|| Path::new("."));
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "temu".to_string());
    parent.join(format!("{stem}-obj"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tinyemu_descriptor_is_valid() {
        let desc = BuildDescriptor::tinyemu("/src/tinyemu", "/tmp/libtemu.so");
        desc.validate().unwrap();
        assert_eq!(desc.cpu.widths, [32, 64, 128]);
        assert_eq!(desc.object_dir, Path::new("/tmp/libtemu-obj"));
        assert_eq!(desc.shared_sources().count(), 18);
    }

    #[test]
    fn default_features_select_sdl_and_128_bit() {
        let features = Features::default();
        let defines = features.defines();
        assert!(defines[0].starts_with("CONFIG_VERSION=\""));
        assert!(defines.contains(&"CONFIG_SDL".to_string()));
        assert!(defines.contains(&"CONFIG_RISCV_MAX_XLEN=128".to_string()));
        assert!(!defines.contains(&"CONFIG_X86EMU".to_string()));
        assert_eq!(features.link_libs(), ["SDL2"]);
    }

    #[test]
    fn optional_features_add_defines() {
        let features = Features {
            debug_dumps: true,
            display: DisplayBackend::Headless,
            x86: true,
            ..Features::default()
        };
        let defines = features.defines();
        assert!(!defines.contains(&"CONFIG_SDL".to_string()));
        assert!(defines.contains(&"CONFIG_X86EMU".to_string()));
        assert!(defines.contains(&"DUMP_EXCEPTIONS".to_string()));
        assert!(features.link_libs().is_empty());
    }

    #[test]
    fn rejects_bad_widths() {
        let mut desc = BuildDescriptor::tinyemu("src", "out/libtemu.so");
        desc.cpu.widths = vec![32, 64, 32];
        assert!(matches!(desc.validate(), Err(BuildError::InvalidDescriptor(_))));

        desc.cpu.widths = vec![48];
        assert!(desc.validate().is_err());

        desc.cpu.widths = vec![32, 128];
        desc.features.max_xlen = 64;
        assert!(desc.validate().is_err());

        desc.cpu.widths.clear();
        assert!(desc.validate().is_err());
    }

    #[test]
    fn rejects_cpu_core_in_shared_lists() {
        let mut desc = BuildDescriptor::tinyemu("src", "out/libtemu.so");
        desc.machines.push("riscv_cpu.c".to_string());
        assert!(desc.validate().is_err());

        let mut desc = BuildDescriptor::tinyemu("src", "out/libtemu.so");
        desc.hardware.push("virtio.c".to_string());
        assert!(desc.validate().is_err());
    }
}
