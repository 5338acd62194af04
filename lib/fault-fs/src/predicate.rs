//! The missing set: which paths a non-exempt caller must not see.

use parking_lot::RwLock;
use std::ffi::CStr;
use std::fmt;

use crate::path;

/// How a path appears to a non-exempt caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Visible,
    Missing,
    /// The rules could not be consulted. Treated as [`Presence::Missing`].
    Undecidable,
}

/// Classifies paths against the missing set.
///
/// Implementations must be total and re-evaluate current state on every
/// call.
pub trait MissingPredicate: Send + Sync {
    fn classify(&self, path: &CStr) -> Presence;
}

/// A single missing-set entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// An absolute path. Matches the path itself and everything below it.
    Subtree(Vec<u8>),
    /// A bare name. Matches any path with a component of that name.
    Name(Vec<u8>),
}

impl Rule {
    /// Parses a rule. Relative paths with a separator are rejected since
    /// they would silently depend on the cwd at load time.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.starts_with('/') {
            return Some(Rule::Subtree(path::normalize(text.as_bytes(), None)));
        }
        if text.contains('/') || text == "." || text == ".." {
            return None;
        }
        Some(Rule::Name(text.as_bytes().to_vec()))
    }

    /// Whether `path`, already normalized, is covered by this rule.
    pub fn matches(&self, path: &[u8]) -> bool {
        match self {
            Rule::Subtree(root) => match path.strip_prefix(root.as_slice()) {
                Some(rest) => rest.is_empty() || rest[0] == b'/' || root.as_slice() == b"/",
                None => false,
            },
            Rule::Name(name) => path::components(path).any(|part| part == name.as_slice()),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Subtree(root) => write!(f, "Subtree({})", path::display(root)),
            Rule::Name(name) => write!(f, "Name({})", path::display(name)),
        }
    }
}

#[derive(Debug)]
enum RuleState {
    Loaded(Vec<Rule>),
    /// A rules source was configured but has not been loaded.
    Unavailable,
}

/// The set of missing paths, shared by every hook and swappable at runtime.
#[derive(Debug)]
pub struct MissingSet {
    state: RwLock<RuleState>,
}

impl Default for MissingSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MissingSet {
    pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            state: RwLock::new(RuleState::Loaded(rules.into_iter().collect())),
        }
    }

    /// A set whose rules could not be loaded; every path is undecidable.
    pub fn unavailable() -> Self {
        Self {
            state: RwLock::new(RuleState::Unavailable),
        }
    }

    pub fn replace(&self, rules: Vec<Rule>) {
        *self.state.write() = RuleState::Loaded(rules);
    }

    pub fn mark_unavailable(&self) {
        *self.state.write() = RuleState::Unavailable;
    }

    pub fn is_available(&self) -> bool {
        matches!(*self.state.read(), RuleState::Loaded(_))
    }

    pub fn insert(&self, rule: Rule) {
        let mut state = self.state.write();
        match &mut *state {
            RuleState::Loaded(rules) => {
                if !rules.contains(&rule) {
                    rules.push(rule);
                }
            }
            RuleState::Unavailable => *state = RuleState::Loaded(vec![rule]),
        }
    }

    pub fn remove(&self, rule: &Rule) {
        if let RuleState::Loaded(rules) = &mut *self.state.write() {
            rules.retain(|existing| existing != rule);
        }
    }

    pub fn rules(&self) -> Vec<Rule> {
        match &*self.state.read() {
            RuleState::Loaded(rules) => rules.clone(),
            RuleState::Unavailable => Vec::new(),
        }
    }

    /// Classifies an already normalized path.
    pub fn classify_normalized(&self, path: &[u8]) -> Presence {
        match &*self.state.read() {
            RuleState::Unavailable => Presence::Undecidable,
            RuleState::Loaded(rules) if rules.iter().any(|rule| rule.matches(path)) => {
                Presence::Missing
            }
            RuleState::Loaded(_) => Presence::Visible,
        }
    }
}

impl MissingPredicate for MissingSet {
    fn classify(&self, path: &CStr) -> Presence {
        let bytes = path.to_bytes();
        let normalized = if bytes.first() == Some(&b'/') {
            path::normalize(bytes, None)
        } else {
            let cwd = path::current_dir();
            path::normalize(bytes, cwd.as_deref())
        };
        self.classify_normalized(&normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::ffi::CString;

    fn set(rules: &[&str]) -> MissingSet {
        MissingSet::new(rules.iter().map(|r| Rule::parse(r).unwrap()))
    }

    fn classify(set: &MissingSet, path: &str) -> Presence {
        set.classify(&CString::new(path).unwrap())
    }

    #[test]
    fn parse_accepts_absolute_paths_and_bare_names() {
        assert_eq!(
            Rule::parse("/etc//shadow.bak/"),
            Some(Rule::Subtree(b"/etc/shadow.bak".to_vec()))
        );
        assert_eq!(Rule::parse(" .env "), Some(Rule::Name(b".env".to_vec())));
        assert_eq!(Rule::parse(""), None);
        assert_eq!(Rule::parse("conf/app.toml"), None);
        assert_eq!(Rule::parse(".."), None);
    }

    #[test]
    fn subtree_rule_covers_descendants_only() {
        let set = set(&["/etc/shadow.bak", "/var/cache/app"]);
        assert_eq!(classify(&set, "/etc/shadow.bak"), Presence::Missing);
        assert_eq!(classify(&set, "/var/cache/app/index.db"), Presence::Missing);
        assert_eq!(classify(&set, "/var/cache/application"), Presence::Visible);
        assert_eq!(classify(&set, "/etc/passwd"), Presence::Visible);
    }

    #[test]
    fn root_rule_covers_every_absolute_path() {
        let set = set(&["/"]);
        assert_eq!(classify(&set, "/etc/passwd"), Presence::Missing);
    }

    #[test]
    fn name_rule_matches_any_component() {
        let set = set(&[".git"]);
        assert_eq!(classify(&set, "/srv/repo/.git"), Presence::Missing);
        assert_eq!(classify(&set, "/srv/repo/.git/HEAD"), Presence::Missing);
        assert_eq!(classify(&set, "/srv/repo/.gitignore"), Presence::Visible);
    }

    #[test]
    fn dot_segments_cannot_sidestep_a_rule() {
        let set = set(&["/etc/shadow.bak"]);
        assert_eq!(classify(&set, "/etc/ssl/../shadow.bak"), Presence::Missing);
        assert_eq!(classify(&set, "//etc/./shadow.bak"), Presence::Missing);
    }

    #[test]
    #[serial_test::serial]
    fn relative_paths_are_resolved_against_the_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(&root).unwrap();

        let rule = format!("{}/secret.txt", root.display());
        let set = set(&[rule.as_str()]);
        let relative = classify(&set, "secret.txt");
        let other = classify(&set, "public.txt");

        std::env::set_current_dir(previous).unwrap();
        assert_eq!(relative, Presence::Missing);
        assert_eq!(other, Presence::Visible);
    }

    #[test]
    fn unavailable_rules_are_undecidable() {
        let set = MissingSet::unavailable();
        assert!(!set.is_available());
        assert_eq!(classify(&set, "/etc/passwd"), Presence::Undecidable);

        set.replace(vec![]);
        assert_eq!(classify(&set, "/etc/passwd"), Presence::Visible);
    }

    #[test]
    fn changes_apply_to_the_next_call() {
        let set = MissingSet::default();
        let rule = Rule::parse("/etc/shadow.bak").unwrap();
        assert_eq!(classify(&set, "/etc/shadow.bak"), Presence::Visible);

        set.insert(rule.clone());
        set.insert(rule.clone());
        assert_eq!(set.rules().len(), 1);
        assert_eq!(classify(&set, "/etc/shadow.bak"), Presence::Missing);

        set.remove(&rule);
        assert_eq!(classify(&set, "/etc/shadow.bak"), Presence::Visible);
    }
}
