//! In-band escape protocol carried on the console input stream.
//!
//! Guest console bytes and host control commands share one byte stream. A command is the
//! sentinel byte (`C-a`) followed by a command key:
//!
//! | sequence  | effect                                   |
//! |-----------|------------------------------------------|
//! | `C-a x`   | terminate the host process (success)     |
//! | `C-a h`   | print [`HELP_TEXT`] on the host output   |
//! | `C-a C-a` | forward one literal `C-a` to the guest   |
//! | `C-a *`   | anything else is discarded               |

/// Byte that starts a host control command (`C-a`).
pub const ESCAPE_SENTINEL: u8 = 0x01;

/// Command key that terminates the host process.
pub const TERMINATE_KEY: u8 = b'x';

/// Command key that prints [`HELP_TEXT`].
pub const HELP_KEY: u8 = b'h';

pub const HELP_TEXT: &str = "\n\
C-a h   print this help\n\
C-a x   exit emulator\n\
C-a C-a send C-a\n";

/// Host control command decoded from the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Terminate,
    Help,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Normal,
    EscapePending,
}

/// Outcome of feeding a single byte to the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deliver this byte to the guest.
    Forward(u8),
    /// Byte was consumed by the protocol; nothing is delivered.
    Consumed,
    Command(Command),
}

/// Result of scanning one input chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scan {
    /// Number of input bytes consumed.
    pub consumed: usize,
    /// Number of bytes written to the output slice.
    pub forwarded: usize,
    /// Command that stopped the scan, if any. Input after it is left unconsumed.
    pub command: Option<Command>,
}

/// Two-state scanner separating guest console data from host commands.
///
/// The escape state survives across chunks, so a sentinel at the end of one read pairs with
/// the first byte of the next.
#[derive(Debug, Clone, Default)]
pub struct EscapeScanner {
    state: State,
}

impl EscapeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_escape_pending(&self) -> bool {
        self.state == State::EscapePending
    }

    pub fn feed(&mut self, byte: u8) -> Step {
        match self.state {
            State::Normal if byte == ESCAPE_SENTINEL => {
                self.state = State::EscapePending;
                Step::Consumed
            }
            State::Normal => Step::Forward(byte),
            State::EscapePending => {
                self.state = State::Normal;
                match byte {
                    TERMINATE_KEY => Step::Command(Command::Terminate),
                    HELP_KEY => Step::Command(Command::Help),
                    ESCAPE_SENTINEL => Step::Forward(ESCAPE_SENTINEL),
                    _ => Step::Consumed,
                }
            }
        }
    }

    /// Scans `input`, writing forwarded bytes to `out`.
    ///
    /// Stops right after the first command byte so the caller can act on it before any later
    /// byte is delivered. Also stops (without consuming) when `out` is full.
    pub fn scan(&mut self, input: &[u8], out: &mut [u8]) -> Scan {
        let mut scan = Scan::default();
        for &byte in input {
            if scan.forwarded == out.len() && self.would_forward(byte) {
                break;
            }
            scan.consumed += 1;
            match self.feed(byte) {
                Step::Forward(b) => {
                    out[scan.forwarded] = b;
                    scan.forwarded += 1;
                }
                Step::Consumed => {}
                Step::Command(command) => {
                    scan.command = Some(command);
                    break;
                }
            }
        }
        scan
    }

    fn would_forward(&self, byte: u8) -> bool {
        match self.state {
            State::Normal => byte != ESCAPE_SENTINEL,
            State::EscapePending => byte == ESCAPE_SENTINEL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scan_all(input: &[u8]) -> (Vec<u8>, Scan) {
        let mut scanner = EscapeScanner::new();
        let mut out = vec![0u8; input.len()];
        let scan = scanner.scan(input, &mut out);
        out.truncate(scan.forwarded);
        (out, scan)
    }

    #[test]
    fn plain_bytes_pass_through() {
        let (out, scan) = scan_all(b"hello\r\n");
        assert_eq!(out, b"hello\r\n");
        assert_eq!(scan.consumed, 7);
        assert_eq!(scan.command, None);
    }

    #[test]
    fn double_sentinel_forwards_one() {
        let (out, scan) = scan_all(&[b'a', ESCAPE_SENTINEL, ESCAPE_SENTINEL, b'b']);
        assert_eq!(out, [b'a', ESCAPE_SENTINEL, b'b']);
        assert_eq!(scan.consumed, 4);
    }

    #[test]
    fn terminate_stops_before_trailing_bytes() {
        let (out, scan) = scan_all(&[b'a', ESCAPE_SENTINEL, TERMINATE_KEY, b'b', b'c']);
        assert_eq!(out, b"a");
        assert_eq!(scan.command, Some(Command::Terminate));
        assert_eq!(scan.consumed, 3);
    }

    #[test]
    fn help_is_reported_and_not_forwarded() {
        let (out, scan) = scan_all(&[ESCAPE_SENTINEL, HELP_KEY, b'z']);
        assert!(out.is_empty());
        assert_eq!(scan.command, Some(Command::Help));
        assert_eq!(scan.consumed, 2);
    }

    #[test]
    fn lone_trailing_sentinel_stays_pending() {
        let mut scanner = EscapeScanner::new();
        let mut out = [0u8; 4];
        let scan = scanner.scan(&[b'q', ESCAPE_SENTINEL], &mut out);
        assert_eq!(&out[..scan.forwarded], b"q");
        assert!(scanner.is_escape_pending());

        let scan = scanner.scan(&[ESCAPE_SENTINEL], &mut out);
        assert_eq!(&out[..scan.forwarded], [ESCAPE_SENTINEL]);
        assert!(!scanner.is_escape_pending());
    }

    #[test]
    fn full_output_leaves_input_unconsumed() {
        let mut scanner = EscapeScanner::new();
        let mut out = [0u8; 2];
        let scan = scanner.scan(b"abcd", &mut out);
        assert_eq!(scan.consumed, 2);
        assert_eq!(scan.forwarded, 2);
        assert_eq!(&out, b"ab");
    }

    proptest! {
        #[test]
        fn sentinel_free_input_is_forwarded_unchanged(
            input in proptest::collection::vec(any::<u8>().prop_filter("no sentinel", |b| *b != ESCAPE_SENTINEL), 0..256)
        ) {
            let (out, scan) = scan_all(&input);
            prop_assert_eq!(out, input.clone());
            prop_assert_eq!(scan.consumed, input.len());
            prop_assert_eq!(scan.command, None);
        }

        #[test]
        fn unknown_commands_forward_nothing(
            key in any::<u8>().prop_filter("not a command", |b| ![TERMINATE_KEY, HELP_KEY, ESCAPE_SENTINEL].contains(b))
        ) {
            let (out, scan) = scan_all(&[ESCAPE_SENTINEL, key]);
            prop_assert!(out.is_empty());
            prop_assert_eq!(scan.consumed, 2);
            prop_assert_eq!(scan.command, None);
        }

        #[test]
        fn terminate_hides_rest_of_chunk(
            prefix in proptest::collection::vec(any::<u8>().prop_filter("no sentinel", |b| *b != ESCAPE_SENTINEL), 0..64),
            suffix in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut input = prefix.clone();
            input.extend_from_slice(&[ESCAPE_SENTINEL, TERMINATE_KEY]);
            input.extend_from_slice(&suffix);

            let (out, scan) = scan_all(&input);
            prop_assert_eq!(out, prefix.clone());
            prop_assert_eq!(scan.command, Some(Command::Terminate));
            prop_assert_eq!(scan.consumed, prefix.len() + 2);
        }
    }
}
