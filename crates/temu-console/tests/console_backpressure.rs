#![cfg(unix)]

mod common;

use std::thread;
use std::time::Duration;

use common::Pty;
use temu_console::{ConsoleDevice, FdReader, FdWriter, TerminalConsole};

const CHUNK: usize = 4096;
const CHUNKS: usize = 64;

#[test]
fn output_survives_a_slow_terminal() {
    let pty = Pty::open();
    unsafe {
        let mut raw = common::attrs(pty.slave);
        libc::cfmakeraw(&mut raw);
        assert_eq!(libc::tcsetattr(pty.slave, libc::TCSANOW, &raw), 0);
        let flags = common::flags(pty.slave);
        assert_eq!(
            libc::fcntl(pty.slave, libc::F_SETFL, flags | libc::O_NONBLOCK),
            0
        );
    }

    let expected: Vec<u8> = (0..CHUNK * CHUNKS)
        .map(|i| b'a' + (i % 26) as u8)
        .collect();

    // Far more than the pty buffer holds; the reader only starts once the writer is stuck.
    let master = pty.master;
    let total = expected.len();
    let drain = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let mut received = Vec::with_capacity(total);
        let mut buf = [0u8; 1024];
        while received.len() < total {
            let n = unsafe { libc::read(master, buf.as_mut_ptr().cast(), buf.len()) };
            assert!(n > 0, "pty master read failed");
            received.extend_from_slice(&buf[..n as usize]);
        }
        received
    });

    let mut console = TerminalConsole::new(FdReader::new(pty.slave), FdWriter::new(pty.slave));
    for chunk in expected.chunks(CHUNK) {
        console.write(chunk);
    }

    let received = drain.join().unwrap();
    assert_eq!(received.len(), expected.len());
    assert!(received == expected, "guest output was reordered or corrupted");
}
