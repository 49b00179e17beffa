//! Raw-mode terminal session backing the guest console.
//!
//! The session owns process-wide state: the controlling terminal's attributes, the input
//! file-status flags and the signal handlers that restore both. At most one session exists at
//! a time.

use std::cell::UnsafeCell;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use crate::device::ConsoleDevice;
use crate::error::{ConsoleError, Result};
use crate::mux::{Multiplexer, Shutdown};

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);
static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);
static HOOKS: Once = Once::new();
static SAVED: SavedSlot = SavedSlot::new();

const FATAL_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGTERM, libc::SIGHUP];

#[derive(Clone, Copy)]
struct SavedState {
    fd: RawFd,
    termios: Option<libc::termios>,
    flags: libc::c_int,
}

/// Single-writer slot readable from signal context.
///
/// Written only while `armed` is false, published with a release store, and consumed at most
/// once by whichever restore path wins the swap.
struct SavedSlot {
    armed: AtomicBool,
    state: UnsafeCell<MaybeUninit<SavedState>>,
}

// SAFETY: access to `state` is serialized through `armed` (see `store` and `take`).
unsafe impl Sync for SavedSlot {}

impl SavedSlot {
    const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            state: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn store(&self, state: SavedState) {
        debug_assert!(!self.armed.load(Ordering::Acquire));
        // SAFETY: not armed, so no restore path reads the slot concurrently.
        unsafe { (*self.state.get()).write(state) };
        self.armed.store(true, Ordering::Release);
    }

    fn take(&self) -> Option<SavedState> {
        if self.armed.swap(false, Ordering::AcqRel) {
            // SAFETY: `armed` was true, so `store` completed and nobody else won the swap.
            Some(unsafe { (*self.state.get()).assume_init() })
        } else {
            None
        }
    }
}

/// Restores the saved terminal attributes and file-status flags.
///
/// Idempotent and async-signal-safe: only an atomic swap, `tcsetattr` and `fcntl`.
pub fn restore_terminal() {
    if let Some(saved) = SAVED.take() {
        // SAFETY: plain syscalls on a descriptor captured at session start.
        unsafe {
            if let Some(termios) = saved.termios {
                libc::tcsetattr(saved.fd, libc::TCSANOW, &termios);
            }
            libc::fcntl(saved.fd, libc::F_SETFL, saved.flags);
        }
    }
}

extern "C" fn restore_at_exit() {
    restore_terminal();
}

extern "C" fn on_fatal_signal(sig: libc::c_int) {
    restore_terminal();
    // SAFETY: `_exit` is async-signal-safe.
    unsafe { libc::_exit(128 + sig) };
}

extern "C" fn on_resize(_sig: libc::c_int) {
    RESIZE_PENDING.store(true, Ordering::Release);
}

fn install_signal_handler(sig: libc::c_int, handler: extern "C" fn(libc::c_int)) -> io::Result<()> {
    // SAFETY: `action` is fully initialized before use and the handlers only touch atomics and
    // async-signal-safe syscalls.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn install_hooks() -> Result<()> {
    let mut result = Ok(());
    HOOKS.call_once(|| {
        // SAFETY: registering a plain `extern "C"` function.
        if unsafe { libc::atexit(restore_at_exit) } != 0 {
            tracing::warn!("failed to register terminal restore at exit");
        }
        let install = || -> io::Result<()> {
            for sig in FATAL_SIGNALS {
                install_signal_handler(sig, on_fatal_signal)?;
            }
            install_signal_handler(libc::SIGWINCH, on_resize)
        };
        result = install().map_err(ConsoleError::SignalHandler);
    });
    result
}

/// Terminal window size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub cols: u16,
    pub rows: u16,
}

/// Exclusive raw-mode session on a terminal descriptor.
///
/// Entering the session saves the current attributes and file-status flags, switches the
/// terminal to raw mode and makes the descriptor non-blocking. The saved state is restored on
/// drop, at process exit, and from `SIGINT`/`SIGTERM`/`SIGHUP` before the process dies.
/// Descriptors that are not terminals only get the non-blocking flag.
pub struct TerminalSession {
    fd: RawFd,
    raw: bool,
    // The session is tied to process-wide state; keep it on the thread that created it.
    _not_send: PhantomData<*const ()>,
}

impl TerminalSession {
    /// Opens the session on standard input.
    pub fn open(allow_ctrlc: bool) -> Result<Self> {
        Self::open_fd(libc::STDIN_FILENO, allow_ctrlc)
    }

    /// Opens the session on `fd`.
    ///
    /// With `allow_ctrlc`, `ISIG` stays enabled so `C-c` still raises `SIGINT`.
    pub fn open_fd(fd: RawFd, allow_ctrlc: bool) -> Result<Self> {
        if SESSION_ACTIVE.swap(true, Ordering::AcqRel) {
            return Err(ConsoleError::SessionActive);
        }
        Self::enter(fd, allow_ctrlc).inspect_err(|_| {
            restore_terminal();
            SESSION_ACTIVE.store(false, Ordering::Release);
        })
    }

    fn enter(fd: RawFd, allow_ctrlc: bool) -> Result<Self> {
        // SAFETY: querying flags of a caller-provided descriptor.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags < 0 {
            return Err(ConsoleError::Terminal {
                op: "fcntl(F_GETFL)",
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: `isatty` only inspects the descriptor.
        let termios = if unsafe { libc::isatty(fd) } == 1 {
            let mut termios = MaybeUninit::<libc::termios>::uninit();
            // SAFETY: `tcgetattr` fully initializes `termios` on success.
            if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
                return Err(ConsoleError::Terminal {
                    op: "tcgetattr",
                    source: io::Error::last_os_error(),
                });
            }
            // SAFETY: initialized by the successful `tcgetattr` above.
            Some(unsafe { termios.assume_init() })
        } else {
            None
        };

        SAVED.store(SavedState {
            fd,
            termios,
            flags,
        });
        install_hooks()?;

        if let Some(saved) = termios {
            let raw = raw_attributes(saved, allow_ctrlc);
            // SAFETY: `raw` is a valid termios derived from the saved one.
            if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
                return Err(ConsoleError::Terminal {
                    op: "tcsetattr",
                    source: io::Error::last_os_error(),
                });
            }
        }

        // SAFETY: only adds O_NONBLOCK to the flags read above.
        if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } != 0 {
            return Err(ConsoleError::Terminal {
                op: "fcntl(F_SETFL)",
                source: io::Error::last_os_error(),
            });
        }

        RESIZE_PENDING.store(false, Ordering::Release);
        tracing::debug!(fd, raw = termios.is_some(), allow_ctrlc, "terminal session opened");
        Ok(Self {
            fd,
            raw: termios.is_some(),
            _not_send: PhantomData,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Whether the descriptor is a terminal that was switched to raw mode.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Returns and clears the resize-pending flag set by `SIGWINCH`.
    pub fn take_resize(&self) -> bool {
        RESIZE_PENDING.swap(false, Ordering::AcqRel)
    }

    pub fn window_size(&self) -> Option<WindowSize> {
        // SAFETY: `TIOCGWINSZ` fills a plain `winsize` struct.
        unsafe {
            let mut ws: libc::winsize = std::mem::zeroed();
            if libc::ioctl(self.fd, libc::TIOCGWINSZ, &mut ws) != 0 || ws.ws_col == 0 {
                return None;
            }
            Some(WindowSize {
                cols: ws.ws_col,
                rows: ws.ws_row,
            })
        }
    }

    /// Restores the terminal now. Later calls, and the drop, are no-ops.
    pub fn restore(&self) {
        restore_terminal();
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        restore_terminal();
        SESSION_ACTIVE.store(false, Ordering::Release);
        tracing::debug!(fd = self.fd, "terminal session closed");
    }
}

fn raw_attributes(mut tty: libc::termios, allow_ctrlc: bool) -> libc::termios {
    tty.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON);
    tty.c_oflag |= libc::OPOST;
    tty.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::IEXTEN);
    if !allow_ctrlc {
        tty.c_lflag &= !libc::ISIG;
    }
    tty.c_cflag &= !(libc::CSIZE | libc::PARENB);
    tty.c_cflag |= libc::CS8;
    tty.c_cc[libc::VMIN] = 1;
    tty.c_cc[libc::VTIME] = 0;
    tty
}

/// Unbuffered reader over a borrowed descriptor.
pub struct FdReader {
    fd: RawFd,
}

impl FdReader {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl Read for FdReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `buf` is valid for `buf.len()` bytes.
        let ret = unsafe { libc::read(self.fd, buf.as_mut_ptr().cast(), buf.len()) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}

/// Unbuffered writer over a borrowed descriptor.
///
/// A terminal's input and output usually share one open file description, so the session's
/// `O_NONBLOCK` applies to output too. A write that would block waits for the descriptor to
/// become writable instead of failing.
pub struct FdWriter {
    fd: RawFd,
}

impl FdWriter {
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let ret = unsafe { libc::write(self.fd, buf.as_ptr().cast(), buf.len()) };
            if ret >= 0 {
                return Ok(ret as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }
            wait_writable(self.fd)?;
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn wait_writable(fd: RawFd) -> io::Result<()> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a single valid pollfd.
        if unsafe { libc::poll(&mut pfd, 1, -1) } >= 0 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
    let closed = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
    if pfd.revents & libc::POLLOUT == 0 && pfd.revents & closed != 0 {
        return Err(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "console output closed",
        ));
    }
    Ok(())
}

/// Guest console on the host terminal.
///
/// A terminate command or end of input restores the terminal and exits the process.
pub struct TerminalConsole<W: Write = FdWriter> {
    mux: Multiplexer<FdReader, W>,
}

impl TerminalConsole {
    /// Console reading standard input and writing standard output.
    pub fn stdio() -> Self {
        Self::new(
            FdReader::new(libc::STDIN_FILENO),
            FdWriter::new(libc::STDOUT_FILENO),
        )
    }
}

impl<W: Write> TerminalConsole<W> {
    pub fn new(input: FdReader, output: W) -> Self {
        Self {
            mux: Multiplexer::new(input, output),
        }
    }
}

impl<W: Write> ConsoleDevice for TerminalConsole<W> {
    fn write(&mut self, data: &[u8]) {
        if let Err(err) = self.mux.write(data) {
            tracing::warn!("console write failed: {err}");
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        match self.mux.read(buf) {
            Ok(n) => n,
            Err(shutdown) => exit_for(shutdown),
        }
    }
}

fn exit_for(shutdown: Shutdown) -> ! {
    restore_terminal();
    match shutdown {
        Shutdown::Terminate => tracing::info!("terminate command received"),
        Shutdown::InputClosed => tracing::info!("console input closed"),
    }
    std::process::exit(shutdown.exit_code())
}
