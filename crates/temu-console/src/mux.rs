use std::io::{self, Read, Write};

use crate::escape::{Command, EscapeScanner, HELP_TEXT};

/// Why the multiplexer asked the host to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// `C-a x` was typed.
    Terminate,
    /// The host input stream reached end-of-file.
    InputClosed,
}

impl Shutdown {
    /// Process exit status for this shutdown.
    pub fn exit_code(self) -> i32 {
        match self {
            Shutdown::Terminate => 0,
            Shutdown::InputClosed => 1,
        }
    }
}

/// Splits a host input stream into guest console bytes and host commands, and passes guest
/// output straight through to the host output stream.
pub struct Multiplexer<R, W> {
    input: R,
    output: W,
    scanner: EscapeScanner,
    raw: Vec<u8>,
}

impl<R: Read, W: Write> Multiplexer<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            scanner: EscapeScanner::new(),
            raw: Vec::new(),
        }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    /// Writes all of the guest output and flushes immediately.
    ///
    /// Partial writes are continued. An output that cannot take more bytes must wait rather
    /// than report `WouldBlock`, or the rest of `data` is lost.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.output.write_all(data)?;
        self.output.flush()
    }

    /// Reads at most `buf.len()` raw bytes and returns how many guest bytes were produced.
    ///
    /// Returns `Ok(0)` when the input has nothing to offer right now (would-block or a
    /// transient error). A terminate command or end-of-file is reported as `Err`; bytes that
    /// followed a terminate command in the same chunk are never delivered.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Shutdown> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.raw.resize(buf.len(), 0);
        let n = match self.input.read(&mut self.raw) {
            Ok(0) => return Err(Shutdown::InputClosed),
            Ok(n) => n,
            Err(err) => {
                if !matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) {
                    tracing::debug!("console input read failed: {err}");
                }
                return Ok(0);
            }
        };

        let mut forwarded = 0;
        let mut pos = 0;
        while pos < n {
            let scan = self.scanner.scan(&self.raw[pos..n], &mut buf[forwarded..]);
            pos += scan.consumed;
            forwarded += scan.forwarded;
            match scan.command {
                Some(Command::Terminate) => return Err(Shutdown::Terminate),
                Some(Command::Help) => {
                    if let Err(err) = self.write(HELP_TEXT.as_bytes()) {
                        tracing::warn!("failed to print console help: {err}");
                    }
                }
                None => break,
            }
        }
        Ok(forwarded)
    }
}
