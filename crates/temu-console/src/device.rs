use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Character device the guest console is attached to.
///
/// `write` carries guest output to the host, `read` carries host input to the guest. `read`
/// never blocks: it returns 0 when no input is available.
pub trait ConsoleDevice {
    fn write(&mut self, data: &[u8]);

    fn read(&mut self, buf: &mut [u8]) -> usize;
}

impl<T: ConsoleDevice + ?Sized> ConsoleDevice for Box<T> {
    fn write(&mut self, data: &[u8]) {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }
}

/// Console that discards output and never has input.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsole;

impl ConsoleDevice for NullConsole {
    fn write(&mut self, _data: &[u8]) {}

    fn read(&mut self, _buf: &mut [u8]) -> usize {
        0
    }
}

#[derive(Debug, Default)]
struct Recording {
    input: VecDeque<Vec<u8>>,
    output: Vec<u8>,
    reads: usize,
}

/// Scripted console: input is queued in chunks, output is captured.
///
/// Clones share the same recording, so a test can keep one handle while the machine owns
/// another.
#[derive(Debug, Default, Clone)]
pub struct RecordingConsole {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one input chunk. Each `read` drains at most one chunk.
    pub fn push_input(&self, chunk: impl Into<Vec<u8>>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.lock().input.push_back(chunk);
        }
    }

    pub fn output(&self) -> Vec<u8> {
        self.lock().output.clone()
    }

    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().output)
    }

    /// Number of `read` calls observed so far.
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        // A panicking test thread must not hide the recording from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConsoleDevice for RecordingConsole {
    fn write(&mut self, data: &[u8]) {
        self.lock().output.extend_from_slice(data);
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut rec = self.lock();
        rec.reads += 1;
        let Some(mut chunk) = rec.input.pop_front() else {
            return 0;
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            chunk.drain(..n);
            rec.input.push_front(chunk);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_console_splits_large_chunks() {
        let console = RecordingConsole::new();
        console.push_input(b"abcdef".to_vec());

        let mut device: Box<dyn ConsoleDevice> = Box::new(console.clone());
        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(device.read(&mut buf), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(device.read(&mut buf), 0);
        assert_eq!(console.reads(), 3);
    }

    #[test]
    fn recording_console_shares_output_between_clones() {
        let console = RecordingConsole::new();
        let mut device = console.clone();
        device.write(b"boot\n");
        device.write(b"ok\n");
        assert_eq!(console.output(), b"boot\nok\n");
        assert_eq!(console.take_output(), b"boot\nok\n");
        assert!(console.output().is_empty());
    }

    #[test]
    fn null_console_is_empty() {
        let mut console = NullConsole;
        console.write(b"ignored");
        assert_eq!(console.read(&mut [0u8; 8]), 0);
    }
}
