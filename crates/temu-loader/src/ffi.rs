//! C layout of the artifact's exported surface. Must match the generated glue.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

pub const TEMU_FILE_COUNT: usize = 4;

/// The emulator's console callbacks.
#[repr(C)]
pub struct CharacterDevice {
    pub opaque: *mut c_void,
    pub write_data: Option<unsafe extern "C" fn(opaque: *mut c_void, buf: *const u8, len: c_int)>,
    pub read_data:
        Option<unsafe extern "C" fn(opaque: *mut c_void, buf: *mut u8, len: c_int) -> c_int>,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct TemuFile {
    pub name: *const c_char,
    pub buf: *const u8,
    pub len: c_int,
}

impl TemuFile {
    pub const EMPTY: Self = Self {
        name: ptr::null(),
        buf: ptr::null(),
        len: 0,
    };
}

#[repr(C)]
pub struct TemuLoadParams {
    pub machine_name: *const c_char,
    pub ram_size: u64,
    pub width: c_int,
    pub height: c_int,
    pub display_device: *const c_char,
    pub input_device: *const c_char,
    pub cmdline: *const c_char,
    pub files: [TemuFile; TEMU_FILE_COUNT],
}

pub type VmErrorFn = unsafe extern "C" fn(fmt: *const c_char, ...);
pub type ClassNamesFn = unsafe extern "C" fn(index: c_int) -> *const c_char;
pub type LoadFn = unsafe extern "C" fn(
    params: *const TemuLoadParams,
    console: *const CharacterDevice,
) -> *mut c_void;
pub type HandleFn = unsafe extern "C" fn(handle: *mut c_void);
pub type CyclesFn = unsafe extern "C" fn(handle: *mut c_void, max_exec_cycle: c_int);
pub type ResizeFn = unsafe extern "C" fn(handle: *mut c_void, width: c_int, height: c_int);
