//! Exported libc replacements, grouped by the kind of operation.

mod dir;
mod open;
mod remove;
mod stat;

/// Defines an exported hook whose first argument is the path it acts on.
///
/// All arguments, the path included, are passed to the genuine function
/// unchanged.
macro_rules! path_hook {
    ($(#[$meta:meta])* fn $name:ident($path:ident: *const c_char $(, $arg:ident: $ty:ty)* $(,)?) -> $ret:ty;) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name($path: *const c_char $(, $arg: $ty)*) -> $ret {
            fault_fs::real_fn!(static REAL: unsafe extern "C" fn(*const c_char $(, $ty)*) -> $ret = $name);
            unsafe {
                fault_fs::intercept(
                    stringify!($name),
                    fault_fs::Target::Path($path),
                    REAL.get(),
                    |real| real($path $(, $arg)*),
                )
            }
        }
    };
}

/// Like [`path_hook!`] for the `*at` family, where the path is relative to
/// a directory descriptor.
macro_rules! at_hook {
    ($(#[$meta:meta])* fn $name:ident($dirfd:ident: c_int, $path:ident: *const c_char $(, $arg:ident: $ty:ty)* $(,)?) -> $ret:ty;) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name($dirfd: c_int, $path: *const c_char $(, $arg: $ty)*) -> $ret {
            fault_fs::real_fn!(static REAL: unsafe extern "C" fn(c_int, *const c_char $(, $ty)*) -> $ret = $name);
            unsafe {
                fault_fs::intercept(
                    stringify!($name),
                    fault_fs::Target::At($dirfd, $path),
                    REAL.get(),
                    |real| real($dirfd, $path $(, $arg)*),
                )
            }
        }
    };
}

pub(crate) use {at_hook, path_hook};
