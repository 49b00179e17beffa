//! Host console for a guest machine.
//!
//! One host byte stream carries both guest console input and host control commands (see
//! [`escape`]). [`Multiplexer`] does the splitting over any `Read`/`Write` pair;
//! [`TerminalSession`] puts the controlling terminal into raw mode for the lifetime of the
//! machine and [`TerminalConsole`] ties the two together as the machine's [`ConsoleDevice`].

#![deny(unused_mut)]

mod device;
mod error;
pub mod escape;
mod mux;
#[cfg(unix)]
mod terminal;

pub use device::{ConsoleDevice, NullConsole, RecordingConsole};
pub use error::{ConsoleError, Result};
pub use escape::{Command, EscapeScanner, ESCAPE_SENTINEL, HELP_KEY, HELP_TEXT, TERMINATE_KEY};
pub use mux::{Multiplexer, Shutdown};
#[cfg(unix)]
pub use terminal::{
    restore_terminal, FdReader, FdWriter, TerminalConsole, TerminalSession, WindowSize,
};
