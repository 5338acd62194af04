//! Byte-level path handling for hook arguments.
//!
//! Paths arrive as C strings and are never assumed to be UTF-8. Nothing
//! here touches the filesystem except to ask where the cwd or a directory
//! descriptor points; symlinks are never followed.

use libc::{c_char, c_int};
use std::borrow::Cow;
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::PathBuf;

/// Borrows a C path argument, or `None` for a null pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a nul-terminated string that outlives `'a`.
pub unsafe fn cstr<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) })
    }
}

/// Lexically folds `.`, `..` and repeated separators.
///
/// A relative path is joined onto `base` first when one is given; without a
/// base the result stays relative and leading `..` components are kept.
pub fn normalize(path: &[u8], base: Option<&[u8]>) -> Vec<u8> {
    let absolute = path.first() == Some(&b'/');
    let (rooted, joined): (bool, Cow<'_, [u8]>) = match (absolute, base) {
        (true, _) => (true, Cow::Borrowed(path)),
        (false, Some(base)) => {
            let mut joined = base.to_vec();
            joined.push(b'/');
            joined.extend_from_slice(path);
            (base.first() == Some(&b'/'), Cow::Owned(joined))
        }
        (false, None) => (false, Cow::Borrowed(path)),
    };

    let mut parts: Vec<&[u8]> = Vec::new();
    for part in joined.split(|b| *b == b'/') {
        match part {
            b"" | b"." => {}
            b".." => match parts.last() {
                Some(last) if *last != b".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(part),
            },
            _ => parts.push(part),
        }
    }

    let mut out = Vec::with_capacity(joined.len());
    if rooted {
        out.push(b'/');
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(b'/');
        }
        out.extend_from_slice(part);
    }
    if out.is_empty() {
        out.push(b'.');
    }
    out
}

/// The components of a path, skipping empty ones.
pub fn components(path: &[u8]) -> impl Iterator<Item = &[u8]> {
    path.split(|b| *b == b'/').filter(|part| !part.is_empty())
}

/// The current working directory, as bytes.
pub fn current_dir() -> Option<Vec<u8>> {
    std::env::current_dir()
        .ok()
        .map(|dir| dir.into_os_string().into_vec())
}

/// The path a directory descriptor refers to.
pub fn fd_path(fd: c_int) -> Option<Vec<u8>> {
    if fd == libc::AT_FDCWD {
        return current_dir();
    }
    std::fs::read_link(PathBuf::from(format!("/proc/self/fd/{fd}")))
        .ok()
        .map(|dir| dir.into_os_string().into_vec())
}

/// What a hooked call names on the filesystem.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    /// A path argument relative to the cwd.
    Path(*const c_char),
    /// A path argument relative to a directory descriptor, as in `openat`.
    At(c_int, *const c_char),
}

impl Target {
    /// The path to check against the missing set. Relative `*at` paths are
    /// joined onto the directory the descriptor refers to.
    ///
    /// # Safety
    ///
    /// The path pointer must be null or valid for the duration of the call.
    pub unsafe fn resolve<'a>(self) -> Option<Cow<'a, CStr>> {
        match self {
            Target::Path(path) => unsafe { cstr(path) }.map(Cow::Borrowed),
            Target::At(fd, path) => {
                let path = unsafe { cstr(path) }?;
                let bytes = path.to_bytes();
                if bytes.first() == Some(&b'/') || fd == libc::AT_FDCWD {
                    return Some(Cow::Borrowed(path));
                }
                let Some(base) = fd_path(fd) else {
                    return Some(Cow::Borrowed(path));
                };
                let joined = normalize(bytes, Some(&base));
                CString::new(joined).ok().map(Cow::Owned)
            }
        }
    }
}

pub fn display(path: &[u8]) -> Cow<'_, str> {
    OsStr::from_bytes(path).to_string_lossy()
}
