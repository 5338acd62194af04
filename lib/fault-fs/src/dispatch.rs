//! The per-call decision made by every hook.
//!
//! A hooked call takes exactly one of three branches, checked in order:
//!
//! 1. the caller is exempt: run the genuine operation unchanged;
//! 2. the path is in the missing set: fail with `ENOENT` without running
//!    the genuine operation at all;
//! 3. otherwise: run the genuine operation unchanged.
//!
//! No decision is cached. Identity and the missing set are consulted again
//! on every call, so the dispatcher holds no mutable state of its own.

use std::cell::Cell;
use std::ffi::CStr;
use std::ptr;

use crate::errno::{self, Errno, Outcome, Sentinel};
use crate::identity::IdentityOracle;
use crate::path;
use crate::predicate::{MissingPredicate, Presence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Exempt,
    Missing,
    Transparent,
}

pub struct Dispatcher<'a, O: ?Sized, P: ?Sized> {
    oracle: &'a O,
    predicate: &'a P,
}

impl<'a, O, P> Dispatcher<'a, O, P>
where
    O: IdentityOracle + ?Sized,
    P: MissingPredicate + ?Sized,
{
    pub fn new(oracle: &'a O, predicate: &'a P) -> Self {
        Self { oracle, predicate }
    }

    /// Picks the branch for a call naming `path`. A null path is never
    /// ours to judge and goes straight to the genuine operation.
    pub fn decide(&self, path: Option<&CStr>) -> Branch {
        if self.oracle.is_exempt() {
            return Branch::Exempt;
        }
        let Some(path) = path else {
            return Branch::Transparent;
        };
        match self.predicate.classify(path) {
            Presence::Visible => Branch::Transparent,
            Presence::Missing | Presence::Undecidable => Branch::Missing,
        }
    }

    /// Runs one hooked call and reports what happened.
    ///
    /// `real` is the genuine operation, or `None` when it could not be
    /// resolved; `call` invokes it with the caller's original arguments.
    pub fn outcome<F, T>(
        &self,
        op: &'static str,
        path: Option<&CStr>,
        real: Option<F>,
        call: impl FnOnce(F) -> T,
    ) -> Outcome<T> {
        let Some(real) = real else {
            tracing::warn!(op, "genuine implementation unavailable");
            return Outcome::Fabricated(Errno::NoSys);
        };

        match self.decide(path) {
            Branch::Missing => {
                tracing::debug!(
                    op,
                    path = %path.map(|p| path::display(p.to_bytes())).unwrap_or_default(),
                    "reporting path as missing"
                );
                Outcome::Fabricated(Errno::NoEnt)
            }
            branch @ (Branch::Exempt | Branch::Transparent) => {
                tracing::trace!(op, ?branch, "forwarding");
                let value = call(real);
                Outcome::Completed {
                    value,
                    errno: errno::get(),
                }
            }
        }
    }

    /// [`Dispatcher::outcome`], flattened into the `errno` + sentinel
    /// convention.
    pub fn dispatch<F, T: Sentinel>(
        &self,
        op: &'static str,
        path: Option<&CStr>,
        real: Option<F>,
        call: impl FnOnce(F) -> T,
    ) -> T {
        self.outcome(op, path, real, call).into_ambient()
    }

    /// Reads directory entries, skipping the ones in the missing set.
    ///
    /// `dir` is the directory being read, `read` returns the next entry or
    /// null at the end of the stream. An exempt caller sees every entry.
    ///
    /// # Safety
    ///
    /// Every non-null pointer returned by `read` must point to a valid
    /// entry until the next call to `read`.
    pub unsafe fn next_visible<E: DirEntry>(
        &self,
        op: &'static str,
        dir: Option<&[u8]>,
        mut read: impl FnMut() -> *mut E,
    ) -> *mut E {
        let filtering = !self.oracle.is_exempt();
        loop {
            let entry = read();
            if entry.is_null() {
                return ptr::null_mut();
            }
            let (true, Some(dir)) = (filtering, dir) else {
                return entry;
            };

            let name = unsafe { (*entry).name() }.to_bytes();
            if name == b"." || name == b".." {
                return entry;
            }
            let mut full = dir.to_vec();
            if full.last() != Some(&b'/') {
                full.push(b'/');
            }
            full.extend_from_slice(name);
            let full = path::normalize(&full, None);
            let presence = match std::ffi::CString::new(full) {
                Ok(full) => self.predicate.classify(&full),
                Err(_) => Presence::Undecidable,
            };
            if presence == Presence::Visible {
                return entry;
            }
            tracing::debug!(op, entry = %path::display(name), "skipping missing entry");
        }
    }
}

/// A directory entry as returned by `readdir`.
pub trait DirEntry {
    fn name(&self) -> &CStr;
}

impl DirEntry for libc::dirent {
    fn name(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.d_name.as_ptr()) }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl DirEntry for libc::dirent64 {
    fn name(&self) -> &CStr {
        unsafe { CStr::from_ptr(self.d_name.as_ptr()) }
    }
}

thread_local! {
    static IN_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as being inside a hook.
///
/// Anything a hook does while holding the guard, such as logging or
/// loading the rules file, may itself reach a hooked function. Those
/// nested calls see [`HookGuard::enter`] fail and go straight to the
/// genuine operation.
#[derive(Debug)]
pub struct HookGuard {
    _private: (),
}

impl HookGuard {
    /// Returns `None` when the thread is already inside a hook, or when
    /// thread-local storage is no longer available during thread exit.
    pub fn enter() -> Option<Self> {
        IN_HOOK
            .try_with(|inside| {
                if inside.replace(true) {
                    None
                } else {
                    Some(HookGuard { _private: () })
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = IN_HOOK.try_with(|inside| inside.set(false));
    }
}
