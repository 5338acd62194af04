//! `fopen` and `open` families.
//!
//! `open` and `openat` are variadic in C. The `mode` argument is taken as a
//! fixed trailing parameter, which reads the same register the caller
//! filled on the System V x86-64 and Linux AArch64 calling conventions, and
//! is forwarded through a variadic call to the genuine function.

use libc::{FILE, c_char, c_int, mode_t};

use super::path_hook;

type OpenFn = unsafe extern "C" fn(*const c_char, c_int, ...) -> c_int;
type OpenAtFn = unsafe extern "C" fn(c_int, *const c_char, c_int, ...) -> c_int;

path_hook! {
    fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE;
}

path_hook! {
    fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE;
}

path_hook! {
    fn creat(path: *const c_char, mode: mode_t) -> c_int;
}

path_hook! {
    fn creat64(path: *const c_char, mode: mode_t) -> c_int;
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    fault_fs::real_fn!(static REAL: OpenFn = open);
    unsafe {
        fault_fs::intercept("open", fault_fs::Target::Path(path), REAL.get(), |real| {
            real(path, flags, mode)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int {
    fault_fs::real_fn!(static REAL: OpenFn = open64);
    unsafe {
        fault_fs::intercept("open64", fault_fs::Target::Path(path), REAL.get(), |real| {
            real(path, flags, mode)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn openat(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    fault_fs::real_fn!(static REAL: OpenAtFn = openat);
    unsafe {
        fault_fs::intercept("openat", fault_fs::Target::At(dirfd, path), REAL.get(), |real| {
            real(dirfd, path, flags, mode)
        })
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn openat64(
    dirfd: c_int,
    path: *const c_char,
    flags: c_int,
    mode: mode_t,
) -> c_int {
    fault_fs::real_fn!(static REAL: OpenAtFn = openat64);
    unsafe {
        fault_fs::intercept("openat64", fault_fs::Target::At(dirfd, path), REAL.get(), |real| {
            real(dirfd, path, flags, mode)
        })
    }
}
