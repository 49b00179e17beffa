#![allow(dead_code)]

use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;

pub struct Pty {
    pub master: RawFd,
    pub slave: RawFd,
}

impl Pty {
    pub fn open() -> Pty {
        unsafe {
            let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(master >= 0, "posix_openpt failed");
            assert_eq!(libc::grantpt(master), 0, "grantpt failed");
            assert_eq!(libc::unlockpt(master), 0, "unlockpt failed");
            let name = libc::ptsname(master);
            assert!(!name.is_null(), "ptsname failed");
            let name = CStr::from_ptr(name).to_owned();
            let slave = libc::open(name.as_ptr(), libc::O_RDWR | libc::O_NOCTTY);
            assert!(slave >= 0, "failed to open pty slave {name:?}");
            Pty { master, slave }
        }
    }
}

impl Drop for Pty {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.slave);
            libc::close(self.master);
        }
    }
}

pub fn attrs(fd: RawFd) -> libc::termios {
    let mut t = MaybeUninit::<libc::termios>::uninit();
    unsafe {
        assert_eq!(libc::tcgetattr(fd, t.as_mut_ptr()), 0, "tcgetattr failed");
        t.assume_init()
    }
}

pub fn flags(fd: RawFd) -> libc::c_int {
    unsafe { libc::fcntl(fd, libc::F_GETFL) }
}

pub fn assert_same_attrs(a: &libc::termios, b: &libc::termios) {
    assert_eq!(a.c_iflag, b.c_iflag, "c_iflag differs");
    assert_eq!(a.c_oflag, b.c_oflag, "c_oflag differs");
    assert_eq!(a.c_cflag, b.c_cflag, "c_cflag differs");
    assert_eq!(a.c_lflag, b.c_lflag, "c_lflag differs");
    assert_eq!(a.c_cc, b.c_cc, "c_cc differs");
}
