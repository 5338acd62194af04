//! The C `errno` channel.
//!
//! Hooked operations report failure the way libc does: a sentinel return
//! value plus a thread-local error code. Internally the result of a hooked
//! call is modelled as an [`Outcome`], and only converted to the ambient
//! convention at the FFI boundary with [`Outcome::into_ambient`].

use libc::c_int;
use std::ptr;

/// A platform `errno` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// `ENOENT`: no such file or directory.
    NoEnt,
    /// `ENOSYS`: the genuine operation could not be located.
    NoSys,
    /// Any other code, carried verbatim.
    Other(c_int),
}

impl Errno {
    pub fn from_raw(code: c_int) -> Self {
        match code {
            libc::ENOENT => Self::NoEnt,
            libc::ENOSYS => Self::NoSys,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> c_int {
        match self {
            Self::NoEnt => libc::ENOENT,
            Self::NoSys => libc::ENOSYS,
            Self::Other(code) => code,
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn location() -> *mut c_int {
            unsafe { libc::__errno_location() }
        }
    } else if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
        fn location() -> *mut c_int {
            unsafe { libc::__error() }
        }
    } else if #[cfg(target_os = "android")] {
        fn location() -> *mut c_int {
            unsafe { libc::__errno() }
        }
    }
}

/// Reads the calling thread's `errno`.
pub fn get() -> Errno {
    Errno::from_raw(unsafe { *location() })
}

/// Overwrites the calling thread's `errno`.
pub fn set(errno: Errno) {
    unsafe { *location() = errno.raw() }
}

/// The canonical failure return value of a hooked operation.
pub trait Sentinel: Sized {
    fn sentinel() -> Self;
}

impl Sentinel for c_int {
    fn sentinel() -> Self {
        -1
    }
}

impl<T> Sentinel for *mut T {
    fn sentinel() -> Self {
        ptr::null_mut()
    }
}

/// What a hooked call produced, before it is flattened into the
/// `errno` + sentinel convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The genuine operation ran. `errno` is what it left behind and is not
    /// written again on the way out.
    Completed { value: T, errno: Errno },
    /// The call was refused without running the genuine operation.
    Fabricated(Errno),
}

impl<T: Sentinel> Outcome<T> {
    pub fn into_ambient(self) -> T {
        match self {
            Outcome::Completed { value, .. } => value,
            Outcome::Fabricated(errno) => {
                set(errno);
                T::sentinel()
            }
        }
    }
}
