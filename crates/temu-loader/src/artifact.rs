use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::error::{LoadError, Result};
use crate::ffi::{
    CharacterDevice, ClassNamesFn, CyclesFn, HandleFn, LoadFn, ResizeFn, TemuLoadParams,
    VmErrorFn,
};

/// Resolved entry points of an opened artifact.
#[derive(Clone, Copy)]
struct EntryPoints {
    vm_error: VmErrorFn,
    class_names: ClassNamesFn,
    load: LoadFn,
    refresh: HandleFn,
    interp: CyclesFn,
    iterate: CyclesFn,
    console_resize: ResizeFn,
    end: HandleFn,
}

/// An opened emulator artifact.
///
/// The library stays mapped for as long as any [`ArtifactClass`](crate::ArtifactClass) or
/// machine built from it is alive.
pub struct Artifact {
    path: PathBuf,
    handle: NonNull<c_void>,
    entry: EntryPoints,
}

macro_rules! resolve {
    ($handle:expr, $name:literal, $ty:ty) => {{
        let sym = libc::dlsym($handle.as_ptr(), concat!($name, "\0").as_ptr().cast());
        if sym.is_null() {
            Err(LoadError::MissingSymbol($name.to_string()))
        } else {
            tracing::trace!(symbol = $name, "resolved");
            Ok(std::mem::transmute::<*mut c_void, $ty>(sym))
        }
    }};
}

impl Artifact {
    /// Opens the artifact at `path` and resolves every entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoadError::MissingArtifact(path.to_path_buf()));
        }
        let c_path =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| LoadError::InvalidPath)?;

        // SAFETY: `c_path` is NUL-terminated and outlives the call.
        let raw = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        let Some(handle) = NonNull::new(raw) else {
            return Err(LoadError::Open {
                path: path.to_path_buf(),
                reason: last_dl_error(),
            });
        };

        // SAFETY: each symbol is declared by the glue with exactly the signature it is
        // transmuted to here.
        let entry = unsafe { resolve_all(handle) };
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // SAFETY: `handle` came from a successful dlopen and nothing references it.
                unsafe { libc::dlclose(handle.as_ptr()) };
                return Err(err);
            }
        };

        tracing::info!(artifact = %path.display(), "artifact opened");
        Ok(Self {
            path: path.to_path_buf(),
            handle,
            entry,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `machine_names` of every class compiled into the artifact.
    pub fn class_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for index in 0.. {
            // SAFETY: the glue returns either NULL or a static NUL-terminated string.
            let ptr = unsafe { (self.entry.class_names)(index) };
            if ptr.is_null() {
                break;
            }
            // SAFETY: non-null pointers from `temu_vm_class_names` are valid C strings.
            let name = unsafe { CStr::from_ptr(ptr) };
            names.push(name.to_string_lossy().into_owned());
            if index == c_int::MAX {
                break;
            }
        }
        names
    }

    /// Writes `message` through the artifact's `vm_error`.
    pub fn report(&self, message: &str) {
        let message = CString::new(message.replace('\0', "\\0")).unwrap_or_default();
        // SAFETY: "%s" consumes exactly the one C string argument passed.
        unsafe { (self.entry.vm_error)(b"%s\0".as_ptr().cast(), message.as_ptr()) };
    }

    /// # Safety
    ///
    /// `params` and `console` must point to valid, initialized values for the duration of
    /// the call, and `console.opaque` must stay valid until the returned handle is ended.
    pub(crate) unsafe fn load(
        &self,
        params: *const TemuLoadParams,
        console: *const CharacterDevice,
    ) -> *mut c_void {
        (self.entry.load)(params, console)
    }

    /// # Safety
    ///
    /// `handle` must be a live handle returned by [`Artifact::load`].
    pub(crate) unsafe fn refresh(&self, handle: *mut c_void) {
        (self.entry.refresh)(handle)
    }

    /// # Safety
    ///
    /// See [`Artifact::refresh`].
    pub(crate) unsafe fn interp(&self, handle: *mut c_void, max_cycles: c_int) {
        (self.entry.interp)(handle, max_cycles)
    }

    /// # Safety
    ///
    /// See [`Artifact::refresh`].
    pub(crate) unsafe fn iterate(&self, handle: *mut c_void, max_cycles: c_int) {
        (self.entry.iterate)(handle, max_cycles)
    }

    /// # Safety
    ///
    /// See [`Artifact::refresh`].
    pub(crate) unsafe fn console_resize(&self, handle: *mut c_void, cols: c_int, rows: c_int) {
        (self.entry.console_resize)(handle, cols, rows)
    }

    /// # Safety
    ///
    /// `handle` must be live; it is dangling afterwards.
    pub(crate) unsafe fn end(&self, handle: *mut c_void) {
        (self.entry.end)(handle)
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        // SAFETY: every object created through this library holds an `Rc<Artifact>`, so
        // nothing can call into it after this point.
        unsafe { libc::dlclose(self.handle.as_ptr()) };
        tracing::debug!(artifact = %self.path.display(), "artifact closed");
    }
}

impl std::fmt::Debug for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact").field("path", &self.path).finish()
    }
}

unsafe fn resolve_all(handle: NonNull<c_void>) -> Result<EntryPoints> {
    Ok(EntryPoints {
        vm_error: resolve!(handle, "vm_error", VmErrorFn)?,
        class_names: resolve!(handle, "temu_vm_class_names", ClassNamesFn)?,
        load: resolve!(handle, "temu_vm_load", LoadFn)?,
        refresh: resolve!(handle, "temu_vm_refresh", HandleFn)?,
        interp: resolve!(handle, "temu_vm_interp", CyclesFn)?,
        iterate: resolve!(handle, "temu_vm_iterate", CyclesFn)?,
        console_resize: resolve!(handle, "temu_vm_console_resize", ResizeFn)?,
        end: resolve!(handle, "temu_vm_end", HandleFn)?,
    })
}

fn last_dl_error() -> String {
    // SAFETY: dlerror returns NULL or a thread-local C string valid until the next dl call.
    let err: *const c_char = unsafe { libc::dlerror() };
    if err.is_null() {
        "unknown dlopen failure".to_string()
    } else {
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_reported_before_dlopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libtemu.so");
        assert!(matches!(
            Artifact::open(&path),
            Err(LoadError::MissingArtifact(p)) if p == path
        ));
    }

    #[test]
    fn non_library_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libtemu.so");
        std::fs::write(&path, b"not an ELF object").unwrap();
        match Artifact::open(&path) {
            Err(LoadError::Open { path: p, reason }) => {
                assert_eq!(p, path);
                assert!(!reason.is_empty());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
