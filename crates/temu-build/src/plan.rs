use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::descriptor::BuildDescriptor;
use crate::error::{BuildError, Result};

/// Which descriptor list a compile step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Glue,
    Cpu { xlen: u32 },
    Core,
    Graphics,
    Machine,
    Hardware,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileStep {
    pub source: PathBuf,
    pub object: PathBuf,
    /// Preprocessor definitions without the `-D` prefix.
    pub defines: Vec<String>,
    pub role: Role,
}

impl CompileStep {
    pub fn describe(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.role {
            Role::Cpu { xlen } => format!("compile {name} (xlen {xlen})"),
            _ => format!("compile {name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStep {
    pub objects: Vec<PathBuf>,
    pub output: PathBuf,
    pub libs: Vec<String>,
}

/// Ordered compile steps followed by one shared-object link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub compile: Vec<CompileStep>,
    pub link: LinkStep,
}

impl BuildPlan {
    /// Expands `desc` into concrete steps. The glue comes first, then one CPU core object per
    /// register width, then the shared lists in link order.
    pub fn new(desc: &BuildDescriptor, glue_source: &Path, link_output: &Path) -> Result<Self> {
        desc.validate()?;

        let common = desc.features.defines();
        let mut compile = Vec::new();

        compile.push(CompileStep {
            source: glue_source.to_path_buf(),
            object: object_for(desc, glue_source),
            defines: common.clone(),
            role: Role::Glue,
        });

        let cpu_source = desc.source_dir.join(&desc.cpu.source);
        let cpu_stem = stem(&cpu_source);
        for &xlen in &desc.cpu.widths {
            let mut defines = common.clone();
            defines.push(format!("MAX_XLEN={xlen}"));
            compile.push(CompileStep {
                source: cpu_source.clone(),
                object: desc.object_dir.join(format!("{cpu_stem}{xlen}.o")),
                defines,
                role: Role::Cpu { xlen },
            });
        }

        let lists = [
            (&desc.core, Role::Core),
            (&desc.graphics, Role::Graphics),
            (&desc.machines, Role::Machine),
            (&desc.hardware, Role::Hardware),
        ];
        for (list, role) in lists {
            for name in list {
                let source = desc.source_dir.join(name);
                compile.push(CompileStep {
                    object: object_for(desc, &source),
                    source,
                    defines: common.clone(),
                    role,
                });
            }
        }

        let mut seen = HashSet::new();
        for step in &compile {
            if !seen.insert(step.object.as_path()) {
                return Err(BuildError::DuplicateObject(step.object.clone()));
            }
        }

        let link = LinkStep {
            objects: compile.iter().map(|s| s.object.clone()).collect(),
            output: link_output.to_path_buf(),
            libs: desc.features.link_libs(),
        };
        Ok(Self { compile, link })
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn object_for(desc: &BuildDescriptor, source: &Path) -> PathBuf {
    desc.object_dir.join(format!("{}.o", stem(source)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DisplayBackend;

    fn plan(desc: &BuildDescriptor) -> Result<BuildPlan> {
        let glue = desc.object_dir.join("temu_glue.c");
        BuildPlan::new(desc, &glue, Path::new("/out/libtemu.so.tmp"))
    }

    #[test]
    fn glue_first_then_cpu_variants() {
        let desc = BuildDescriptor::tinyemu("/src", "/out/libtemu.so");
        let plan = plan(&desc).unwrap();

        assert_eq!(plan.compile[0].role, Role::Glue);
        assert_eq!(
            plan.compile[0].object,
            Path::new("/out/libtemu-obj/temu_glue.o")
        );

        let cpu: Vec<_> = plan.compile[1..4].iter().collect();
        for (step, xlen) in cpu.iter().zip([32, 64, 128]) {
            assert_eq!(step.role, Role::Cpu { xlen });
            assert_eq!(step.source, Path::new("/src/riscv_cpu.c"));
            assert_eq!(
                step.object,
                PathBuf::from(format!("/out/libtemu-obj/riscv_cpu{xlen}.o"))
            );
            assert_eq!(step.defines.last(), Some(&format!("MAX_XLEN={xlen}")));
        }
        assert_eq!(cpu[2].describe(), "compile riscv_cpu.c (xlen 128)");

        // 1 glue + 3 cpu + 18 shared sources.
        assert_eq!(plan.compile.len(), 22);
        assert_eq!(plan.link.objects.len(), 22);
        assert_eq!(plan.link.output, Path::new("/out/libtemu.so.tmp"));
        assert_eq!(plan.link.libs, ["SDL2"]);
    }

    #[test]
    fn shared_sources_only_carry_common_defines() {
        let mut desc = BuildDescriptor::tinyemu("/src", "/out/libtemu.so");
        desc.features.display = DisplayBackend::Headless;
        let plan = plan(&desc).unwrap();
        let virtio = plan
            .compile
            .iter()
            .find(|s| s.source.ends_with("virtio.c"))
            .unwrap();
        assert_eq!(virtio.role, Role::Core);
        assert_eq!(virtio.defines, desc.features.defines());
        assert!(plan.link.libs.is_empty());
    }

    #[test]
    fn colliding_objects_are_rejected() {
        let mut desc = BuildDescriptor::tinyemu("/src", "/out/libtemu.so");
        // Distinct sources, same object stem.
        desc.hardware.push("sub/virtio.c".to_string());
        assert!(matches!(plan(&desc), Err(BuildError::DuplicateObject(_))));

        let mut desc = BuildDescriptor::tinyemu("/src", "/out/libtemu.so");
        desc.core.push("riscv_cpu32.c".to_string());
        assert!(matches!(plan(&desc), Err(BuildError::DuplicateObject(_))));
    }
}
