//! Directory streams.
//!
//! `opendir` refuses missing directories outright. `readdir` delegates to
//! the genuine function and then skips entries in the missing set, so the
//! stream looks like the entries were never there.

use libc::{DIR, c_char, dirent, dirent64};

use super::path_hook;

path_hook! {
    fn opendir(path: *const c_char) -> *mut DIR;
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn readdir(dirp: *mut DIR) -> *mut dirent {
    fault_fs::real_fn!(static REAL: unsafe extern "C" fn(*mut DIR) -> *mut dirent = readdir);
    let Some(real) = REAL.get() else {
        fault_fs::errno::set(fault_fs::Errno::NoSys);
        return std::ptr::null_mut();
    };
    unsafe {
        let dirfd = if dirp.is_null() { -1 } else { libc::dirfd(dirp) };
        fault_fs::next_visible("readdir", dirfd, || real(dirp))
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn readdir64(dirp: *mut DIR) -> *mut dirent64 {
    fault_fs::real_fn!(static REAL: unsafe extern "C" fn(*mut DIR) -> *mut dirent64 = readdir64);
    let Some(real) = REAL.get() else {
        fault_fs::errno::set(fault_fs::Errno::NoSys);
        return std::ptr::null_mut();
    };
    unsafe {
        let dirfd = if dirp.is_null() { -1 } else { libc::dirfd(dirp) };
        fault_fs::next_visible("readdir64", dirfd, || real(dirp))
    }
}
