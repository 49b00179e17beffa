use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Sink for machine-level diagnostics (the `vm_error` entry point).
///
/// Reporting is never fatal by itself.
pub trait ErrorReporter {
    fn report(&self, args: fmt::Arguments<'_>);
}

/// Formats a diagnostic into an [`ErrorReporter`].
#[macro_export]
macro_rules! vm_error {
    ($reporter:expr, $($arg:tt)*) => {
        $crate::ErrorReporter::report(&*$reporter, format_args!($($arg)*))
    };
}

/// Writes diagnostics to the host error stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrReporter;

impl ErrorReporter for StderrReporter {
    fn report(&self, args: fmt::Arguments<'_>) {
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_fmt(args);
        let _ = stderr.flush();
    }
}

/// Keeps every diagnostic in memory. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, args: fmt::Arguments<'_>) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(args.to_string());
    }
}
