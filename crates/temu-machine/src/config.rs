/// Slot index of an auxiliary file handed to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Bios,
    VgaBios,
    Kernel,
    Initrd,
}

impl FileKind {
    pub const COUNT: usize = 4;

    pub const ALL: [FileKind; Self::COUNT] = [
        FileKind::Bios,
        FileKind::VgaBios,
        FileKind::Kernel,
        FileKind::Initrd,
    ];

    pub fn index(self) -> usize {
        match self {
            FileKind::Bios => 0,
            FileKind::VgaBios => 1,
            FileKind::Kernel => 2,
            FileKind::Initrd => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Bios => "bios",
            FileKind::VgaBios => "vga bios",
            FileKind::Kernel => "kernel",
            FileKind::Initrd => "initrd",
        }
    }
}

/// A file slot owned by the configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSlot {
    pub name: Option<String>,
    pub buf: Vec<u8>,
}

impl FileSlot {
    /// Copies `data` into the slot. The caller's buffer is not retained.
    pub fn copy_from(&mut self, name: &str, data: &[u8]) {
        self.name = Some(name.to_string());
        self.buf = data.to_vec();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Parameters a machine class is constructed from.
///
/// Built once per load: generic defaults first, then the class defaults, then the caller's
/// settings. Consumed by [`MachineClass::init`](crate::MachineClass::init).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineConfig {
    pub machine_name: String,
    pub ram_size: u64,
    pub files: [FileSlot; FileKind::COUNT],
    pub width: u32,
    pub height: u32,
    /// Display device to attach; `None` means no display.
    pub display_device: Option<String>,
    /// Input device to attach; `None` means no input.
    pub input_device: Option<String>,
    /// Firmware or kernel command line.
    pub cmdline: Option<String>,
}

impl MachineConfig {
    /// Generic defaults: everything empty except the machine name.
    pub fn generic_defaults(machine_name: &str) -> Self {
        Self {
            machine_name: machine_name.to_string(),
            ..Self::default()
        }
    }

    pub fn file(&self, kind: FileKind) -> &FileSlot {
        &self.files[kind.index()]
    }

    pub fn file_mut(&mut self, kind: FileKind) -> &mut FileSlot {
        &mut self.files[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_slots_copy_caller_bytes() {
        let mut cfg = MachineConfig::generic_defaults("riscv64");
        let mut firmware = vec![0x13u8, 0, 0, 0];
        cfg.file_mut(FileKind::Bios).copy_from("/bios", &firmware);
        firmware[0] = 0xff;

        let bios = cfg.file(FileKind::Bios);
        assert_eq!(bios.name.as_deref(), Some("/bios"));
        assert_eq!(bios.buf, [0x13, 0, 0, 0]);
        assert_eq!(bios.len(), 4);
        assert!(cfg.file(FileKind::Kernel).is_empty());
    }

    #[test]
    fn kinds_map_to_distinct_slots() {
        for (i, kind) in FileKind::ALL.into_iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
