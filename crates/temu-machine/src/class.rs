use temu_console::ConsoleDevice;

use crate::config::MachineConfig;
use crate::error::Result;

/// A live machine.
pub trait Machine {
    /// Runs at most `max_cycles` guest cycles.
    fn interp(&mut self, max_cycles: u32);

    /// Pushes the current framebuffer to the host display, if any.
    fn refresh(&mut self);

    /// One driver step: a display refresh followed by one bounded interpretation call.
    fn iterate(&mut self, max_cycles: u32) {
        self.refresh();
        self.interp(max_cycles);
    }

    /// Tells the guest console about a new host window size.
    fn console_resize(&mut self, _cols: u16, _rows: u16) {}
}

/// Named initialization and execution operations for one machine architecture.
pub trait MachineClass {
    /// Comma-separated machine names this class answers to (e.g. `riscv32,riscv64`).
    fn name_list(&self) -> &str;

    /// Applies class-specific defaults on top of the generic ones.
    fn set_defaults(&self, config: &mut MachineConfig);

    /// Builds a machine that owns `config` and `console`.
    fn init(
        &self,
        config: MachineConfig,
        console: Box<dyn ConsoleDevice>,
    ) -> Result<Box<dyn Machine>>;

    fn supports(&self, machine_name: &str) -> bool {
        self.name_list()
            .split(',')
            .any(|name| name.trim() == machine_name)
    }
}

/// Machine classes available to the bootstrap, looked up by machine name.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<Box<dyn MachineClass>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: Box<dyn MachineClass>) {
        self.classes.push(class);
    }

    /// First registered class that answers to `machine_name`.
    pub fn resolve(&self, machine_name: &str) -> Option<&dyn MachineClass> {
        self.classes
            .iter()
            .find(|class| class.supports(machine_name))
            .map(|class| class.as_ref())
    }

    /// Every machine name known to the registry, in registration order.
    pub fn machine_names(&self) -> Vec<&str> {
        self.classes
            .iter()
            .flat_map(|class| class.name_list().split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("machines", &self.machine_names())
            .finish()
    }
}
