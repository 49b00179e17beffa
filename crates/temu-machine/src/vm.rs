use temu_console::ConsoleDevice;

use crate::class::{ClassRegistry, Machine};
use crate::config::{FileKind, MachineConfig};
use crate::error::{Result, VmError};
use crate::report::ErrorReporter;
use crate::vm_error;

/// Guest cycles executed per driver step.
pub const MAX_EXEC_CYCLE: u32 = 500_000;

/// Name the firmware image is registered under in the BIOS slot.
pub const BIOS_FILE_NAME: &str = "/bios";

pub const DEFAULT_MACHINE: &str = "riscv64";
pub const DEFAULT_RAM_SIZE: u64 = 100 << 20;
pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 200;

/// Caller-side settings applied on top of the class defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    pub machine_name: String,
    pub ram_size: u64,
    pub width: u32,
    pub height: u32,
    pub display_device: Option<String>,
    pub input_device: Option<String>,
    pub cmdline: Option<String>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            machine_name: DEFAULT_MACHINE.to_string(),
            ram_size: DEFAULT_RAM_SIZE,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            display_device: None,
            input_device: None,
            cmdline: None,
        }
    }
}

/// Owned bootstrap and execution context for one machine.
///
/// `load` constructs the machine at most once; `iterate` drives it. Nothing here is
/// process-global, so independent `Vm`s can coexist as far as their classes allow.
pub struct Vm {
    registry: ClassRegistry,
    reporter: Box<dyn ErrorReporter>,
    machine: Option<Box<dyn Machine>>,
    iterations: u64,
}

impl Vm {
    pub fn new(registry: ClassRegistry, reporter: Box<dyn ErrorReporter>) -> Self {
        Self {
            registry,
            reporter,
            machine: None,
            iterations: 0,
        }
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn is_loaded(&self) -> bool {
        self.machine.is_some()
    }

    /// Driver steps completed since the current machine was loaded.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Builds the configuration record, resolves the machine class and constructs the
    /// machine with `console` attached.
    ///
    /// `firmware` is copied into the record's BIOS slot. A name the registry does not know
    /// is reported through the error reporter and nothing is constructed. A class that fails
    /// to construct is reported here as well; classes return the error without reporting it.
    pub fn load(
        &mut self,
        options: &LoadOptions,
        firmware: &[u8],
        console: Box<dyn ConsoleDevice>,
    ) -> Result<()> {
        if self.machine.is_some() {
            return Err(VmError::AlreadyLoaded);
        }
        if firmware.is_empty() {
            vm_error!(self.reporter, "No bios found\n");
            return Err(VmError::EmptyFirmware);
        }

        let Some(class) = self.registry.resolve(&options.machine_name) else {
            vm_error!(
                self.reporter,
                "Unknown machine name: {}\n",
                options.machine_name
            );
            return Err(VmError::UnknownMachineClass(options.machine_name.clone()));
        };

        let mut config = MachineConfig::generic_defaults(&options.machine_name);
        class.set_defaults(&mut config);
        config.ram_size = options.ram_size;
        config.width = options.width;
        config.height = options.height;
        if options.display_device.is_some() {
            config.display_device.clone_from(&options.display_device);
        }
        if options.input_device.is_some() {
            config.input_device.clone_from(&options.input_device);
        }
        if options.cmdline.is_some() {
            config.cmdline.clone_from(&options.cmdline);
        }
        config
            .file_mut(FileKind::Bios)
            .copy_from(BIOS_FILE_NAME, firmware);

        tracing::info!(
            machine = %config.machine_name,
            ram_mib = config.ram_size >> 20,
            bios_len = firmware.len(),
            width = config.width,
            height = config.height,
            "constructing machine"
        );

        let machine = class.init(config, console).inspect_err(|err| {
            vm_error!(self.reporter, "{err}\n");
        })?;
        self.machine = Some(machine);
        self.iterations = 0;
        Ok(())
    }

    /// One display refresh followed by one bounded interpretation step.
    pub fn iterate(&mut self) -> Result<()> {
        let machine = self.machine.as_mut().ok_or(VmError::NotLoaded)?;
        machine.iterate(MAX_EXEC_CYCLE);
        self.iterations += 1;
        Ok(())
    }

    pub fn console_resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        let machine = self.machine.as_mut().ok_or(VmError::NotLoaded)?;
        tracing::debug!(cols, rows, "console resized");
        machine.console_resize(cols, rows);
        Ok(())
    }

    /// Drops the current machine. Returns whether one was loaded.
    pub fn teardown(&mut self) -> bool {
        let had_machine = self.machine.take().is_some();
        if had_machine {
            tracing::debug!(iterations = self.iterations, "machine torn down");
        }
        had_machine
    }
}

/// Drives `vm` until `limit` steps have run (forever when `None`) or a step fails.
///
/// `poll` runs before every step; it is where host-side state such as a pending terminal
/// resize is folded into the machine.
pub fn run<F>(vm: &mut Vm, limit: Option<u64>, mut poll: F) -> Result<u64>
where
    F: FnMut(&mut Vm) -> Result<()>,
{
    let mut steps = 0u64;
    loop {
        if limit.is_some_and(|limit| steps >= limit) {
            return Ok(steps);
        }
        poll(vm)?;
        vm.iterate()?;
        steps += 1;
    }
}
