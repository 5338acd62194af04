//! Missing-file fault injection for processes under test.
//!
//! `fault-fs` is loaded into a process with `LD_PRELOAD` (see the
//! `fault-fs-preload` crate). For a configured set of paths, the shadowed
//! libc functions then fail with `ENOENT` exactly as they would if the
//! paths did not exist, which lets a test harness exercise a program's
//! handling of missing files without touching the real filesystem. The
//! harness keeps seeing everything by running under an exempt uid or gid.
//!
//! Every hooked call goes through the same decision:
//!
//! * exempt caller: the genuine libc function runs untouched,
//! * path in the missing set: `errno = ENOENT` and the function's failure
//!   value, without calling the genuine function,
//! * anything else: the genuine libc function runs untouched.
//!
//! Configuration comes from the environment:
//!
//! | Variable              | Meaning                                          |
//! |-----------------------|--------------------------------------------------|
//! | `FAULT_FS_MISSING`    | `:`-separated absolute paths or bare file names  |
//! | `FAULT_FS_EXEMPT_UID` | uid that sees the real filesystem                |
//! | `FAULT_FS_EXEMPT_GID` | gid that sees the real filesystem                |
//! | `FAULT_FS_RULES`      | TOML rules file, reloaded when it changes        |
//! | `FAULT_FS_LOG`        | `tracing` filter directive, e.g. `fault_fs=debug`|

#![deny(unused_imports, unused_unsafe, unreachable_patterns)]

pub mod config;
pub mod dispatch;
pub mod errno;
pub mod identity;
pub mod logging;
pub mod path;
pub mod predicate;
pub mod resolver;
pub mod shim;

pub use crate::config::{Config, ConfigError, RulesFile};
pub use crate::dispatch::{Branch, DirEntry, Dispatcher, HookGuard};
pub use crate::errno::{Errno, Outcome, Sentinel};
pub use crate::identity::{CredentialOracle, ExemptIdentity, IdentityOracle};
pub use crate::path::Target;
pub use crate::predicate::{MissingPredicate, MissingSet, Presence, Rule};
pub use crate::resolver::{NextObject, RealSymbol, SymbolLookup, TypedSymbol};
pub use crate::shim::{Shim, intercept, next_visible};
