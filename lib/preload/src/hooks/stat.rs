//! Existence and metadata probes. On a missing path the caller's `stat`
//! buffer is left exactly as it was passed in.

use libc::{c_char, c_int};

use super::{at_hook, path_hook};

path_hook! {
    fn access(path: *const c_char, mode: c_int) -> c_int;
}

path_hook! {
    fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int;
}

path_hook! {
    fn lstat(path: *const c_char, buf: *mut libc::stat) -> c_int;
}

path_hook! {
    fn stat64(path: *const c_char, buf: *mut libc::stat64) -> c_int;
}

path_hook! {
    fn lstat64(path: *const c_char, buf: *mut libc::stat64) -> c_int;
}

at_hook! {
    fn faccessat(dirfd: c_int, path: *const c_char, mode: c_int, flags: c_int) -> c_int;
}

at_hook! {
    fn fstatat(dirfd: c_int, path: *const c_char, buf: *mut libc::stat, flags: c_int) -> c_int;
}

at_hook! {
    fn fstatat64(dirfd: c_int, path: *const c_char, buf: *mut libc::stat64, flags: c_int) -> c_int;
}
