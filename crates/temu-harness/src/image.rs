use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

/// Image booted when none is given on the command line.
pub const DEFAULT_IMAGE_NAME: &str = "test.elf";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Elf,
    /// Flat binary.
    Bin,
}

pub fn kind_of(path: &Path) -> Option<ImageKind> {
    match path.extension()?.to_str()? {
        "elf" => Some(ImageKind::Elf),
        "bin" => Some(ImageKind::Bin),
        _ => None,
    }
}

/// The image to boot: `arg` if given, otherwise `<tmp>/test.elf`.
pub fn resolve(arg: Option<&Path>) -> Result<(PathBuf, ImageKind)> {
    let path = match arg {
        Some(path) => path.to_path_buf(),
        None => std::env::temp_dir().join(DEFAULT_IMAGE_NAME),
    };
    match kind_of(&path) {
        Some(kind) => Ok((path, kind)),
        None => bail!(
            "{} is not a firmware image (expected a .elf or .bin file)",
            path.display()
        ),
    }
}
