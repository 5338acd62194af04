//! Process-wide state behind the preload hooks.

use std::path::PathBuf;
use std::time::SystemTime;

use libc::c_int;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::{Config, RulesFile};
use crate::dispatch::{DirEntry, Dispatcher, HookGuard};
use crate::errno::{self, Errno, Sentinel};
use crate::identity::{CredentialOracle, ExemptIdentity};
use crate::path::{self, Target};
use crate::predicate::{MissingSet, Rule};

/// Identifies one version of the rules file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Reloads the rules file whenever it changes on disk.
#[derive(Debug)]
struct RulesWatcher {
    path: PathBuf,
    last: Mutex<Option<Stamp>>,
}

/// Oracle, missing set and rules file for one process.
#[derive(Debug)]
pub struct Shim {
    oracle: CredentialOracle,
    missing: MissingSet,
    base_rules: Vec<Rule>,
    base_exempt: ExemptIdentity,
    watcher: Option<RulesWatcher>,
}

impl Shim {
    pub fn new(config: Config) -> Self {
        let missing = match config.rules_file {
            // Until the file has been read, nothing is known to be visible.
            Some(_) => MissingSet::unavailable(),
            None => MissingSet::new(config.missing.iter().cloned()),
        };
        let shim = Self {
            oracle: CredentialOracle::new(config.exempt),
            missing,
            base_rules: config.missing,
            base_exempt: config.exempt,
            watcher: config.rules_file.map(|path| RulesWatcher {
                path,
                last: Mutex::new(None),
            }),
        };
        shim.refresh();
        if !shim.missing.is_available() {
            tracing::warn!("no rules file loaded yet, treating every path as missing");
        }
        shim
    }

    pub fn oracle(&self) -> &CredentialOracle {
        &self.oracle
    }

    pub fn missing(&self) -> &MissingSet {
        &self.missing
    }

    /// Picks up changes to the rules file, if one is configured.
    pub fn refresh(&self) {
        let Some(watcher) = &self.watcher else {
            return;
        };

        let stamp = std::fs::metadata(&watcher.path).ok().map(|meta| Stamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        });
        let mut last = watcher.last.lock();
        if *last == stamp {
            return;
        }
        *last = stamp;

        let loaded = RulesFile::load(&watcher.path)
            .and_then(|file| Ok((file.rules()?, file.exempt())));
        match loaded {
            Ok((rules, exempt)) => {
                let mut all = self.base_rules.clone();
                all.extend(rules);
                tracing::debug!(
                    path = %watcher.path.display(),
                    rules = all.len(),
                    "loaded rules file"
                );
                self.missing.replace(all);
                self.oracle.set_exempt(self.base_exempt.or(exempt));
            }
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "rules file unavailable, treating every path as missing"
                );
                self.missing.mark_unavailable();
                self.oracle.set_exempt(self.base_exempt);
            }
        }
    }

    pub fn dispatcher(&self) -> Dispatcher<'_, CredentialOracle, MissingSet> {
        Dispatcher::new(&self.oracle, &self.missing)
    }

    /// Runs one hooked call naming `target`.
    ///
    /// Nested calls made while another hook is running on this thread skip
    /// the policy and go straight to the genuine operation. The caller's
    /// `errno` is put back before the genuine operation runs, so whatever
    /// the shim itself did along the way is never observable.
    ///
    /// # Safety
    ///
    /// `target` must carry pointers that are valid for the whole call, and
    /// `call` must be safe to invoke with `real`.
    pub unsafe fn intercept<F, T: Sentinel>(
        &self,
        op: &'static str,
        target: Target,
        real: Option<F>,
        call: impl FnOnce(F) -> T,
    ) -> T {
        let saved = errno::get();
        let Some(_guard) = HookGuard::enter() else {
            return forward(real, call);
        };
        unsafe { self.intercept_entered(saved, op, target, real, call) }
    }

    unsafe fn intercept_entered<F, T: Sentinel>(
        &self,
        saved: Errno,
        op: &'static str,
        target: Target,
        real: Option<F>,
        call: impl FnOnce(F) -> T,
    ) -> T {
        self.refresh();
        let path = unsafe { target.resolve() };
        self.dispatcher().dispatch(op, path.as_deref(), real, |real| {
            errno::set(saved);
            call(real)
        })
    }

    /// Reads the next directory entry that is not in the missing set.
    ///
    /// # Safety
    ///
    /// `read` must return null or an entry that stays valid until it is
    /// called again. `dirfd` must be the descriptor of the stream being read.
    pub unsafe fn next_visible<E: DirEntry>(
        &self,
        op: &'static str,
        dirfd: c_int,
        mut read: impl FnMut() -> *mut E,
    ) -> *mut E {
        let saved = errno::get();
        let Some(_guard) = HookGuard::enter() else {
            return read();
        };
        unsafe { self.next_visible_entered(saved, op, dirfd, read) }
    }

    unsafe fn next_visible_entered<E: DirEntry>(
        &self,
        saved: Errno,
        op: &'static str,
        dirfd: c_int,
        mut read: impl FnMut() -> *mut E,
    ) -> *mut E {
        self.refresh();
        let dir = (dirfd >= 0).then(|| path::fd_path(dirfd)).flatten();
        unsafe {
            self.dispatcher().next_visible(op, dir.as_deref(), || {
                errno::set(saved);
                read()
            })
        }
    }
}

fn forward<F, T: Sentinel>(real: Option<F>, call: impl FnOnce(F) -> T) -> T {
    match real {
        Some(real) => call(real),
        None => {
            errno::set(Errno::NoSys);
            T::sentinel()
        }
    }
}

static SHIM: OnceCell<Shim> = OnceCell::new();

/// The shim for this process, configured from the environment on first use.
pub fn global() -> &'static Shim {
    SHIM.get_or_init(|| {
        let (config, errors) = Config::from_env();
        crate::logging::init(config.log_filter.as_deref());
        for error in errors {
            tracing::warn!(error = &error as &dyn std::error::Error, "ignoring setting");
        }
        tracing::info!(
            rules = config.missing.len(),
            rules_file = ?config.rules_file,
            exempt = ?config.exempt,
            "fault injection active"
        );
        Shim::new(config)
    })
}

/// [`Shim::intercept`] on the process-wide shim.
///
/// # Safety
///
/// See [`Shim::intercept`].
pub unsafe fn intercept<F, T: Sentinel>(
    op: &'static str,
    target: Target,
    real: Option<F>,
    call: impl FnOnce(F) -> T,
) -> T {
    let saved = errno::get();
    // Held across `global()` so that a hook reached while the shim is being
    // set up does not wait on its own initialization.
    let Some(_guard) = HookGuard::enter() else {
        return forward(real, call);
    };
    unsafe { global().intercept_entered(saved, op, target, real, call) }
}

/// [`Shim::next_visible`] on the process-wide shim.
///
/// # Safety
///
/// See [`Shim::next_visible`].
pub unsafe fn next_visible<E: DirEntry>(
    op: &'static str,
    dirfd: c_int,
    mut read: impl FnMut() -> *mut E,
) -> *mut E {
    let saved = errno::get();
    let Some(_guard) = HookGuard::enter() else {
        return read();
    };
    unsafe { global().next_visible_entered(saved, op, dirfd, read) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityOracle;
    use crate::predicate::{MissingPredicate, Presence};
    use std::ffi::CString;
    use std::fs::File;
    use std::os::unix::ffi::OsStrExt;
    use std::time::{Duration, SystemTime};

    fn cpath(path: &std::path::Path) -> CString {
        CString::new(path.as_os_str().as_bytes()).unwrap()
    }

    fn write_rules(path: &std::path::Path, text: &str, age: u64) {
        std::fs::write(path, text).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age);
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[test]
    fn environment_rules_apply_without_a_file() {
        let shim = Shim::new(Config {
            missing: vec![Rule::parse("/etc/shadow.bak").unwrap()],
            ..Config::default()
        });
        assert_eq!(shim.missing().classify(c"/etc/shadow.bak"), Presence::Missing);
        assert_eq!(shim.missing().classify(c"/etc/passwd"), Presence::Visible);
    }

    #[test]
    fn rules_file_is_reloaded_when_it_changes() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.toml");
        write_rules(&rules, "missing = [\"/srv/a\"]\n", 60);

        let shim = Shim::new(Config {
            missing: vec![Rule::parse("/srv/env").unwrap()],
            rules_file: Some(rules.clone()),
            ..Config::default()
        });
        assert_eq!(shim.missing().classify(c"/srv/a"), Presence::Missing);
        assert_eq!(shim.missing().classify(c"/srv/env"), Presence::Missing);
        assert_eq!(shim.missing().classify(c"/srv/b"), Presence::Visible);

        write_rules(&rules, "missing = [\"/srv/b\", \"/srv/c\"]\n", 30);
        shim.refresh();
        assert_eq!(shim.missing().classify(c"/srv/a"), Presence::Visible);
        assert_eq!(shim.missing().classify(c"/srv/b"), Presence::Missing);
        assert_eq!(shim.missing().classify(c"/srv/env"), Presence::Missing);
    }

    #[test]
    fn unreadable_rules_file_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.toml");
        write_rules(&rules, "missing = [", 60);

        let shim = Shim::new(Config {
            rules_file: Some(rules.clone()),
            ..Config::default()
        });
        assert_eq!(shim.missing().classify(c"/etc/passwd"), Presence::Undecidable);

        write_rules(&rules, "missing = []\n", 30);
        shim.refresh();
        assert_eq!(shim.missing().classify(c"/etc/passwd"), Presence::Visible);

        std::fs::remove_file(&rules).unwrap();
        shim.refresh();
        assert_eq!(shim.missing().classify(c"/etc/passwd"), Presence::Undecidable);
    }

    #[test]
    fn environment_exemption_wins_over_the_rules_file() {
        let dir = tempfile::tempdir().unwrap();
        let rules = dir.path().join("rules.toml");
        let uid = unsafe { libc::geteuid() };
        write_rules(&rules, &format!("exempt_uid = {}\n", uid.wrapping_add(1)), 60);

        let shim = Shim::new(Config {
            exempt: ExemptIdentity {
                uid: Some(uid),
                gid: None,
            },
            rules_file: Some(rules),
            ..Config::default()
        });
        assert_eq!(shim.oracle().exempt().uid, Some(uid));
        assert!(shim.oracle().is_exempt());
    }

    #[test]
    fn intercept_restores_errno_before_the_genuine_call() {
        let shim = Shim::new(Config::default());
        errno::set(Errno::Other(libc::EAGAIN));
        let seen: c_int = unsafe {
            shim.intercept("access", Target::Path(c"/etc/passwd".as_ptr()), Some(()), |()| {
                errno::get().raw()
            })
        };
        assert_eq!(seen, libc::EAGAIN);
    }

    #[test]
    fn nested_calls_bypass_the_policy() {
        let dir = tempfile::tempdir().unwrap();
        let hidden = dir.path().join("hidden");
        std::fs::write(&hidden, "h").unwrap();
        let hidden = cpath(&hidden);

        let shim = Shim::new(Config {
            missing: vec![Rule::parse(hidden.to_str().unwrap()).unwrap()],
            ..Config::default()
        });

        let outer = unsafe {
            shim.intercept("open", Target::Path(c"/".as_ptr()), Some(()), |()| {
                // Reached from inside another hook, so not subject to the rules.
                shim.intercept("access", Target::Path(hidden.as_ptr()), Some(()), |()| {
                    libc::access(hidden.as_ptr(), libc::F_OK)
                })
            })
        };
        assert_eq!(outer, 0);

        let direct = unsafe {
            shim.intercept("access", Target::Path(hidden.as_ptr()), Some(()), |()| {
                libc::access(hidden.as_ptr(), libc::F_OK)
            })
        };
        assert_eq!(direct, -1);
        assert_eq!(errno::get(), Errno::NoEnt);
    }

    #[test]
    fn directory_stream_filtering_uses_the_descriptor_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep"), "k").unwrap();
        std::fs::write(dir.path().join("drop"), "d").unwrap();
        let root = dir.path().canonicalize().unwrap();

        let shim = Shim::new(Config {
            missing: vec![Rule::parse(root.join("drop").to_str().unwrap()).unwrap()],
            ..Config::default()
        });

        let path = cpath(dir.path());
        let stream = unsafe { libc::opendir(path.as_ptr()) };
        assert!(!stream.is_null());
        let fd = unsafe { libc::dirfd(stream) };
        let mut names = Vec::new();
        loop {
            let entry = unsafe { shim.next_visible("readdir", fd, || libc::readdir(stream)) };
            if entry.is_null() {
                break;
            }
            names.push(unsafe { (*entry).name() }.to_str().unwrap().to_string());
        }
        unsafe { libc::closedir(stream) };

        assert!(names.contains(&"keep".to_string()));
        assert!(!names.contains(&"drop".to_string()));
    }
}
