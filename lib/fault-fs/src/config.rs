//! Configuration, read from `FAULT_FS_*` environment variables and an
//! optional TOML rules file.
//!
//! ```toml
//! # FAULT_FS_RULES=/tmp/harness/rules.toml
//! missing = ["/etc/app/config.toml", ".cache"]
//! exempt_gid = 4242
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::identity::ExemptIdentity;
use crate::predicate::Rule;

pub const MISSING_VAR: &str = "FAULT_FS_MISSING";
pub const EXEMPT_UID_VAR: &str = "FAULT_FS_EXEMPT_UID";
pub const EXEMPT_GID_VAR: &str = "FAULT_FS_EXEMPT_GID";
pub const RULES_VAR: &str = "FAULT_FS_RULES";
pub const LOG_VAR: &str = "FAULT_FS_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a numeric id, got {value:?}")]
    InvalidId { var: &'static str, value: String },
    #[error("invalid missing-set rule {0:?}: use an absolute path or a bare file name")]
    InvalidRule(String),
    #[error("{0} is not valid UTF-8")]
    NotUnicode(&'static str),
    #[error("unable to read the rules file at \"{}\"", path.display())]
    ReadRules {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("unable to parse the rules file at \"{}\"", path.display())]
    ParseRules {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },
}

/// The contents of a rules file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub exempt_uid: Option<u32>,
    #[serde(default)]
    pub exempt_gid: Option<u32>,
}

impl RulesFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::ReadRules {
            path: path.to_path_buf(),
            error,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|error| ConfigError::ParseRules {
            path: path.to_path_buf(),
            error,
        })
    }

    /// The parsed rules. Entries that do not parse are reported, not
    /// silently dropped.
    pub fn rules(&self) -> Result<Vec<Rule>, ConfigError> {
        self.missing
            .iter()
            .map(|text| Rule::parse(text).ok_or_else(|| ConfigError::InvalidRule(text.clone())))
            .collect()
    }

    pub fn exempt(&self) -> ExemptIdentity {
        ExemptIdentity {
            uid: self.exempt_uid,
            gid: self.exempt_gid,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Rules given directly in the environment.
    pub missing: Vec<Rule>,
    /// Credentials given directly in the environment. These take precedence
    /// over the rules file.
    pub exempt: ExemptIdentity,
    pub rules_file: Option<PathBuf>,
    /// An `EnvFilter` directive. Logging stays off when unset.
    pub log_filter: Option<String>,
}

impl Config {
    /// Reads the process environment. Invalid settings are skipped and
    /// returned alongside the configuration so they can be reported once
    /// logging is up.
    pub fn from_env() -> (Self, Vec<ConfigError>) {
        Self::from_lookup(|var| std::env::var_os(var))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> (Self, Vec<ConfigError>) {
        let mut config = Config::default();
        let mut errors = Vec::new();

        if let Some(value) = lookup(MISSING_VAR) {
            match value.into_string() {
                Ok(value) => {
                    for text in value.split(':').filter(|t| !t.trim().is_empty()) {
                        match Rule::parse(text) {
                            Some(rule) => config.missing.push(rule),
                            None => errors.push(ConfigError::InvalidRule(text.to_string())),
                        }
                    }
                }
                Err(_) => errors.push(ConfigError::NotUnicode(MISSING_VAR)),
            }
        }

        config.exempt.uid = parse_id(&lookup, EXEMPT_UID_VAR, &mut errors);
        config.exempt.gid = parse_id(&lookup, EXEMPT_GID_VAR, &mut errors);

        config.rules_file = lookup(RULES_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        config.log_filter = match lookup(LOG_VAR).map(OsString::into_string) {
            Some(Ok(filter)) if !filter.trim().is_empty() => Some(filter),
            Some(Err(_)) => {
                errors.push(ConfigError::NotUnicode(LOG_VAR));
                None
            }
            _ => None,
        };

        (config, errors)
    }
}

fn parse_id(
    lookup: &impl Fn(&str) -> Option<OsString>,
    var: &'static str,
    errors: &mut Vec<ConfigError>,
) -> Option<u32> {
    let value = lookup(var)?;
    let value = value.to_string_lossy();
    match value.trim().parse() {
        Ok(id) => Some(id),
        Err(_) => {
            errors.push(ConfigError::InvalidId {
                var,
                value: value.into_owned(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let vars: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn empty_environment_disables_everything() {
        let (config, errors) = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert!(errors.is_empty());
        assert!(config.exempt.is_empty());
    }

    #[test]
    fn reads_every_variable() {
        let (config, errors) = Config::from_lookup(lookup(&[
            (MISSING_VAR, "/etc/shadow.bak::.env"),
            (EXEMPT_UID_VAR, "1001"),
            (EXEMPT_GID_VAR, " 4242 "),
            (RULES_VAR, "/tmp/rules.toml"),
            (LOG_VAR, "fault_fs=debug"),
        ]));

        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(
            config.missing,
            vec![
                Rule::Subtree(b"/etc/shadow.bak".to_vec()),
                Rule::Name(b".env".to_vec())
            ]
        );
        assert_eq!(config.exempt.uid, Some(1001));
        assert_eq!(config.exempt.gid, Some(4242));
        assert_eq!(config.rules_file, Some(PathBuf::from("/tmp/rules.toml")));
        assert_eq!(config.log_filter.as_deref(), Some("fault_fs=debug"));
    }

    #[test]
    fn malformed_id_leaves_nobody_exempt() {
        let (config, errors) = Config::from_lookup(lookup(&[(EXEMPT_GID_VAR, "wheel")]));
        assert_eq!(config.exempt.gid, None);
        assert!(matches!(
            errors.as_slice(),
            [ConfigError::InvalidId { var: EXEMPT_GID_VAR, value }] if value == "wheel"
        ));
    }

    #[test]
    fn relative_rules_are_rejected() {
        let (config, errors) = Config::from_lookup(lookup(&[(MISSING_VAR, "conf/app.toml:/srv")]));
        assert_eq!(config.missing, vec![Rule::Subtree(b"/srv".to_vec())]);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "invalid missing-set rule \"conf/app.toml\": use an absolute path or a bare file name"
        );
    }

    #[test]
    fn rules_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        std::fs::write(&path, "missing = [\"/etc/shadow.bak\", \".git\"]\nexempt_gid = 7\n").unwrap();

        let file = RulesFile::load(&path).unwrap();
        assert_eq!(
            file.rules().unwrap(),
            vec![
                Rule::Subtree(b"/etc/shadow.bak".to_vec()),
                Rule::Name(b".git".to_vec())
            ]
        );
        assert_eq!(
            file.exempt(),
            ExemptIdentity {
                uid: None,
                gid: Some(7)
            }
        );
    }

    #[test]
    fn rules_file_rejects_unknown_keys() {
        let err = RulesFile::parse("hidden = []", Path::new("rules.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseRules { .. }));
    }

    #[test]
    fn missing_rules_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RulesFile::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadRules { .. }));
    }

    #[test]
    fn invalid_rule_in_file_is_reported() {
        let file = RulesFile::parse("missing = [\"a/b\"]", Path::new("rules.toml")).unwrap();
        assert!(matches!(file.rules(), Err(ConfigError::InvalidRule(rule)) if rule == "a/b"));
    }
}
