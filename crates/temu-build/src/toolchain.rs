use std::env;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Command;

use crate::plan::{CompileStep, LinkStep};

/// Host C compiler driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    cc: OsString,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self { cc: "cc".into() }
    }
}

impl Toolchain {
    pub fn new(cc: impl Into<OsString>) -> Self {
        Self { cc: cc.into() }
    }

    /// `$CC`, falling back to `cc`.
    pub fn from_env() -> Self {
        match env::var_os("CC") {
            Some(cc) if !cc.is_empty() => Self { cc },
            _ => Self::default(),
        }
    }

    pub fn cc(&self) -> &OsStr {
        &self.cc
    }

    /// `cc -g -I<src> -c -fPIC -D... -o <object> <source>`
    pub fn compile_command(&self, include_dir: &Path, step: &CompileStep) -> Command {
        let mut cmd = Command::new(&self.cc);
        cmd.arg("-g")
            .arg(format!("-I{}", include_dir.display()))
            .arg("-c")
            .arg("-fPIC");
        for define in &step.defines {
            cmd.arg(format!("-D{define}"));
        }
        cmd.arg("-o").arg(&step.object).arg(&step.source);
        cmd
    }

    /// `cc -shared -o <output> <objects...> -l...`
    pub fn link_command(&self, step: &LinkStep) -> Command {
        let mut cmd = Command::new(&self.cc);
        cmd.arg("-shared").arg("-o").arg(&step.output);
        cmd.args(&step.objects);
        for lib in &step.libs {
            cmd.arg(format!("-l{lib}"));
        }
        cmd
    }
}

/// Shell-like rendering of `cmd` for diagnostics.
pub fn render_command(cmd: &Command) -> String {
    let mut out = quote(cmd.get_program());
    for arg in cmd.get_args() {
        out.push(' ');
        out.push_str(&quote(arg));
    }
    out
}

fn quote(value: &OsStr) -> String {
    let s = value.to_string_lossy();
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=+:,@%".contains(c))
    {
        s.into_owned()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Role;
    use std::path::PathBuf;

    #[test]
    fn compile_command_shape() {
        let step = CompileStep {
            source: PathBuf::from("/src/riscv_cpu.c"),
            object: PathBuf::from("/obj/riscv_cpu64.o"),
            defines: vec!["CONFIG_VERSION=\"1.0\"".to_string(), "MAX_XLEN=64".to_string()],
            role: Role::Cpu { xlen: 64 },
        };
        let cmd = Toolchain::new("gcc").compile_command(Path::new("/src"), &step);
        assert_eq!(
            render_command(&cmd),
            "gcc -g -I/src -c -fPIC '-DCONFIG_VERSION=\"1.0\"' -DMAX_XLEN=64 -o /obj/riscv_cpu64.o /src/riscv_cpu.c"
        );
    }

    #[test]
    fn link_command_shape() {
        let step = LinkStep {
            objects: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            output: PathBuf::from("/tmp/libtemu.so"),
            libs: vec!["SDL2".to_string()],
        };
        let cmd = Toolchain::default().link_command(&step);
        assert_eq!(
            render_command(&cmd),
            "cc -shared -o /tmp/libtemu.so a.o b.o -lSDL2"
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(quote(OsStr::new("plain/path.c")), "plain/path.c");
        assert_eq!(quote(OsStr::new("two words")), "'two words'");
        assert_eq!(quote(OsStr::new("it's")), r"'it'\''s'");
        assert_eq!(quote(OsStr::new("")), "''");
    }
}
