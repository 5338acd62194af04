//! Removal of entries that are in the missing set fails like removal of an
//! entry that is not there.

use libc::{c_char, c_int};

use super::{at_hook, path_hook};

path_hook! {
    fn unlink(path: *const c_char) -> c_int;
}

path_hook! {
    fn rmdir(path: *const c_char) -> c_int;
}

at_hook! {
    fn unlinkat(dirfd: c_int, path: *const c_char, flags: c_int) -> c_int;
}
