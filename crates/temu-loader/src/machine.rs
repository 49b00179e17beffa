use std::ffi::{c_char, c_int, c_void, CString};
use std::fmt;
use std::ptr;
use std::rc::Rc;

use temu_console::ConsoleDevice;
use temu_machine::{
    ClassRegistry, ErrorReporter, FileKind, Machine, MachineClass, MachineConfig, VmError,
};

use crate::artifact::Artifact;
use crate::ffi::{CharacterDevice, TemuFile, TemuLoadParams, TEMU_FILE_COUNT};

/// One registry entry per class compiled into `artifact`.
pub fn registry(artifact: &Rc<Artifact>) -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    for names in artifact.class_names() {
        tracing::debug!(machines = %names, "artifact machine class");
        registry.register(Box::new(ArtifactClass {
            artifact: Rc::clone(artifact),
            names,
        }));
    }
    registry
}

/// A machine class implemented inside the artifact.
pub struct ArtifactClass {
    artifact: Rc<Artifact>,
    names: String,
}

impl fmt::Debug for ArtifactClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactClass")
            .field("names", &self.names)
            .finish()
    }
}

fn c_string(field: &str, value: &str) -> temu_machine::Result<CString> {
    CString::new(value)
        .map_err(|_| VmError::InvalidConfig(format!("{field} contains a NUL byte")))
}

fn optional_c_string(field: &str, value: Option<&str>) -> temu_machine::Result<Option<CString>> {
    value.map(|v| c_string(field, v)).transpose()
}

fn as_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

impl MachineClass for ArtifactClass {
    fn name_list(&self) -> &str {
        &self.names
    }

    /// Class defaults live in the artifact and are applied inside `temu_vm_load`, before the
    /// record's values are copied over them.
    fn set_defaults(&self, _config: &mut MachineConfig) {}

    fn init(
        &self,
        config: MachineConfig,
        console: Box<dyn ConsoleDevice>,
    ) -> temu_machine::Result<Box<dyn Machine>> {
        let geometry = |what: &str, v: u32| {
            c_int::try_from(v).map_err(|_| VmError::InvalidConfig(format!("{what} {v} is too large")))
        };

        let machine_name = c_string("machine name", &config.machine_name)?;
        let display = optional_c_string("display device", config.display_device.as_deref())?;
        let input = optional_c_string("input device", config.input_device.as_deref())?;
        let cmdline = optional_c_string("cmdline", config.cmdline.as_deref())?;

        let mut file_names: Vec<Option<CString>> = Vec::with_capacity(TEMU_FILE_COUNT);
        let mut files = [TemuFile::EMPTY; TEMU_FILE_COUNT];
        for kind in FileKind::ALL {
            let slot = config.file(kind);
            let name = optional_c_string("file name", slot.name.as_deref())?;
            if !slot.is_empty() {
                let len = c_int::try_from(slot.len()).map_err(|_| VmError::FileTooLarge {
                    kind: kind.as_str(),
                    len: slot.len(),
                })?;
                files[kind.index()] = TemuFile {
                    name: as_ptr(&name),
                    buf: slot.buf.as_ptr(),
                    len,
                };
            }
            file_names.push(name);
        }

        let params = TemuLoadParams {
            machine_name: machine_name.as_ptr(),
            ram_size: config.ram_size,
            width: geometry("width", config.width)?,
            height: geometry("height", config.height)?,
            display_device: as_ptr(&display),
            input_device: as_ptr(&input),
            cmdline: as_ptr(&cmdline),
            files,
        };

        let bridge = ConsoleBridge::new(console);
        let device = bridge.character_device();

        // SAFETY: `params` and every string and buffer it points at outlive the call; the
        // glue copies them. `device.opaque` stays valid until the machine's Drop ends it.
        let handle = unsafe { self.artifact.load(&params, &device) };
        drop(file_names);

        if handle.is_null() {
            // SAFETY: the artifact rejected the load and kept no reference to the bridge.
            unsafe { bridge.free() };
            return Err(VmError::InitFailed {
                machine: config.machine_name,
                reason: "the artifact did not construct a machine".to_string(),
            });
        }

        Ok(Box::new(ArtifactMachine {
            artifact: Rc::clone(&self.artifact),
            handle,
            bridge,
        }))
    }
}

/// A live machine inside the artifact.
pub struct ArtifactMachine {
    artifact: Rc<Artifact>,
    handle: *mut c_void,
    bridge: ConsoleBridge,
}

fn cycles(max_cycles: u32) -> c_int {
    c_int::try_from(max_cycles).unwrap_or(c_int::MAX)
}

impl Machine for ArtifactMachine {
    fn interp(&mut self, max_cycles: u32) {
        // SAFETY: `handle` is live until Drop.
        unsafe { self.artifact.interp(self.handle, cycles(max_cycles)) }
    }

    fn refresh(&mut self) {
        // SAFETY: as above.
        unsafe { self.artifact.refresh(self.handle) }
    }

    fn iterate(&mut self, max_cycles: u32) {
        // SAFETY: as above.
        unsafe { self.artifact.iterate(self.handle, cycles(max_cycles)) }
    }

    fn console_resize(&mut self, cols: u16, rows: u16) {
        // SAFETY: as above.
        unsafe {
            self.artifact
                .console_resize(self.handle, c_int::from(cols), c_int::from(rows))
        }
    }
}

impl Drop for ArtifactMachine {
    fn drop(&mut self) {
        // SAFETY: the handle is ended exactly once, and only then is the console the machine
        // calls back into released.
        unsafe {
            self.artifact.end(self.handle);
            self.bridge.free();
        }
    }
}

/// Owns the console a C machine calls back into through [`CharacterDevice`].
struct ConsoleBridge {
    console: *mut Box<dyn ConsoleDevice>,
}

impl ConsoleBridge {
    fn new(console: Box<dyn ConsoleDevice>) -> Self {
        Self {
            console: Box::into_raw(Box::new(console)),
        }
    }

    fn character_device(&self) -> CharacterDevice {
        CharacterDevice {
            opaque: self.console.cast(),
            write_data: Some(console_write),
            read_data: Some(console_read),
        }
    }

    /// # Safety
    ///
    /// Must be called once, after the C side has stopped using the device.
    unsafe fn free(&self) {
        drop(Box::from_raw(self.console));
    }
}

unsafe extern "C" fn console_write(opaque: *mut c_void, buf: *const u8, len: c_int) {
    let Ok(len) = usize::try_from(len) else {
        return;
    };
    if opaque.is_null() || buf.is_null() || len == 0 {
        return;
    }
    let console = &mut *opaque.cast::<Box<dyn ConsoleDevice>>();
    console.write(std::slice::from_raw_parts(buf, len));
}

unsafe extern "C" fn console_read(opaque: *mut c_void, buf: *mut u8, len: c_int) -> c_int {
    let Ok(len) = usize::try_from(len) else {
        return 0;
    };
    if opaque.is_null() || buf.is_null() || len == 0 {
        return 0;
    }
    let console = &mut *opaque.cast::<Box<dyn ConsoleDevice>>();
    let n = console.read(std::slice::from_raw_parts_mut(buf, len));
    c_int::try_from(n.min(len)).unwrap_or(0)
}

/// Routes diagnostics through the artifact's `vm_error`.
#[derive(Debug, Clone)]
pub struct ArtifactReporter {
    artifact: Rc<Artifact>,
}

impl ArtifactReporter {
    pub fn new(artifact: Rc<Artifact>) -> Self {
        Self { artifact }
    }
}

impl ErrorReporter for ArtifactReporter {
    fn report(&self, args: fmt::Arguments<'_>) {
        self.artifact.report(&args.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temu_console::RecordingConsole;

    #[test]
    fn trampolines_reach_the_console() {
        let console = RecordingConsole::new();
        console.push_input(b"abc".to_vec());
        let bridge = ConsoleBridge::new(Box::new(console.clone()));
        let device = bridge.character_device();

        let write = device.write_data.unwrap();
        let read = device.read_data.unwrap();
        let mut buf = [0u8; 8];
        unsafe {
            write(device.opaque, b"hello".as_ptr(), 5);
            write(device.opaque, b"ignored".as_ptr(), -1);
            assert_eq!(read(device.opaque, buf.as_mut_ptr(), 2), 2);
            assert_eq!(read(device.opaque, ptr::null_mut(), 8), 0);
            bridge.free();
        }
        assert_eq!(console.output(), b"hello");
        assert_eq!(&buf[..2], b"ab");
    }

    #[test]
    fn layout_matches_glue() {
        assert_eq!(TEMU_FILE_COUNT, temu_build::glue::GLUE_FILE_COUNT);
        assert_eq!(TEMU_FILE_COUNT, FileKind::COUNT);
    }
}
