//! Deciding whether the caller is exempt from fault injection.
//!
//! The harness driving a test usually needs to see the real filesystem,
//! for example to create the very files the process under test must not
//! see. It does so by running under a dedicated uid or gid.

use libc::{gid_t, uid_t};
use parking_lot::RwLock;

/// Answers whether the current caller sees the filesystem unmodified.
///
/// Implementations must be total: when unsure, answer `false`.
pub trait IdentityOracle: Send + Sync {
    fn is_exempt(&self) -> bool;
}

/// The credentials that are exempt from fault injection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExemptIdentity {
    pub uid: Option<uid_t>,
    pub gid: Option<gid_t>,
}

impl ExemptIdentity {
    pub const NOBODY: Self = Self {
        uid: None,
        gid: None,
    };

    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }

    /// Fills the fields `self` leaves unset from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            uid: self.uid.or(fallback.uid),
            gid: self.gid.or(fallback.gid),
        }
    }
}

/// Checks the process credentials on every call.
#[derive(Debug, Default)]
pub struct CredentialOracle {
    exempt: RwLock<ExemptIdentity>,
}

impl CredentialOracle {
    pub fn new(exempt: ExemptIdentity) -> Self {
        Self {
            exempt: RwLock::new(exempt),
        }
    }

    pub fn exempt(&self) -> ExemptIdentity {
        *self.exempt.read()
    }

    pub fn set_exempt(&self, exempt: ExemptIdentity) {
        *self.exempt.write() = exempt;
    }
}

impl IdentityOracle for CredentialOracle {
    fn is_exempt(&self) -> bool {
        let exempt = self.exempt();
        if exempt.is_empty() {
            return false;
        }

        let uid_matches = exempt
            .uid
            .is_some_and(|uid| unsafe { libc::getuid() == uid || libc::geteuid() == uid });
        let gid_matches = exempt
            .gid
            .is_some_and(|gid| unsafe { libc::getgid() == gid || libc::getegid() == gid });
        uid_matches || gid_matches
    }
}
