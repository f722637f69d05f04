//! Three-tier path classification.
//!
//! Every path lands in exactly one tier: denied outright, allowed without
//! asking, or unknown. Unknown paths are answered from the run's decision
//! cache when possible and otherwise returned as [`Disposition::Ask`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::resolver::{CachedDecision, DecisionCache};
use crate::config::{normalize_extension, FilterRules};

/// Why a path was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    /// A directory segment below the root is on the deny list.
    DeniedDirectory,
    /// The file has no extension.
    NoExtension,
    /// The extension is on the deny list.
    DeniedExtension,
    /// The whole file name is on the deny list.
    DeniedName,
    /// The file name starts with an editor lock prefix.
    LockFile,
    /// The operator chose "ignore always" for this extension.
    OperatorIgnored,
}

impl DenyReason {
    /// Short label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeniedDirectory => "denied directory",
            Self::NoExtension => "no extension",
            Self::DeniedExtension => "denied extension",
            Self::DeniedName => "denied file name",
            Self::LockFile => "lock file",
            Self::OperatorIgnored => "ignored by operator",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Deny(DenyReason),
    Allow,
    Ask,
}

/// Path classifier shared by the bulk scanner and the live watcher.
///
/// Pure: the result depends only on the rules, the configured roots and the
/// decision cache passed in.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: FilterRules,
    roots: Vec<PathBuf>,
}

impl Classifier {
    /// Create a classifier for paths under `roots`.
    ///
    /// The roots themselves are trusted: only directory segments below the
    /// root containing a path are checked against the denied directories.
    #[must_use]
    pub fn new(rules: FilterRules, roots: Vec<PathBuf>) -> Self {
        Self {
            rules: rules.normalized(),
            roots,
        }
    }

    /// The active rule set.
    #[must_use]
    pub fn rules(&self) -> &FilterRules {
        &self.rules
    }

    /// Classify a file path.
    #[must_use]
    pub fn classify(&self, path: &Path, cache: Option<&DecisionCache>) -> Disposition {
        if let Some(reason) = self.deny_reason(path) {
            return Disposition::Deny(reason);
        }

        let extension = extension_of(path);
        if self.is_allowed_extension(&extension) {
            return Disposition::Allow;
        }

        match cache.and_then(|c| c.get(&extension)) {
            Some(CachedDecision::AlwaysProcess) => Disposition::Allow,
            Some(CachedDecision::AlwaysIgnore) => Disposition::Deny(DenyReason::OperatorIgnored),
            None => Disposition::Ask,
        }
    }

    /// The static deny checks, without the allow list or the decision cache.
    ///
    /// This is the "is this path safe to look at" predicate the watcher
    /// applies before touching a path.
    #[must_use]
    pub fn deny_reason(&self, path: &Path) -> Option<DenyReason> {
        if self
            .directory_segments(path)
            .any(|segment| self.is_denied_dir_name(segment))
        {
            return Some(DenyReason::DeniedDirectory);
        }

        let extension = extension_of(path);
        if extension.is_empty() {
            return Some(DenyReason::NoExtension);
        }
        if self.rules.denied_extensions.contains(&extension) {
            return Some(DenyReason::DeniedExtension);
        }

        let name = file_name_of(path);
        if self.rules.denied_file_names.contains(&name.to_lowercase()) {
            return Some(DenyReason::DeniedName);
        }
        if self.rules.lock_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return Some(DenyReason::LockFile);
        }

        None
    }

    /// Whether a directory with this name is pruned from walks.
    #[must_use]
    pub fn is_denied_dir_name(&self, name: &str) -> bool {
        self.rules.denied_dirs.contains(name)
    }

    /// Whether a normalized extension is on the allow list.
    #[must_use]
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.rules.allowed_extensions.contains(extension)
    }

    /// Rough token count for an asset: a quarter of its size for allow-listed
    /// extensions, zero otherwise.
    #[must_use]
    pub fn token_estimate(&self, extension: &str, size: u64) -> i64 {
        if self.is_allowed_extension(extension) {
            i64::try_from(size / 4).unwrap_or(i64::MAX)
        } else {
            0
        }
    }

    /// Directory names between the containing root and the file name.
    fn directory_segments<'a>(&self, path: &'a Path) -> impl Iterator<Item = &'a str> {
        let relative = self
            .roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|rel| rel.components().count())
            .unwrap_or(path);

        let parent = relative.parent().unwrap_or_else(|| Path::new(""));
        parent.components().filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
    }
}

/// Normalized extension of a path, empty if it has none.
#[must_use]
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .unwrap_or_default()
}

fn file_name_of(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> FilterRules {
        let set = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        FilterRules {
            denied_dirs: set(&["build", "node_modules", "var"]),
            denied_extensions: set(&["env", "exe", "bin"]),
            denied_file_names: set(&["id_rsa.pub", "thumbs.db"]),
            lock_prefixes: vec!["~$".to_string()],
            allowed_extensions: set(&["pdf", "md"]),
        }
    }

    fn classifier() -> Classifier {
        Classifier::new(rules(), vec![PathBuf::from("/home/u/docs")])
    }

    #[test]
    fn test_allow_and_ask_tiers() {
        let c = classifier();
        assert_eq!(
            c.classify(Path::new("/home/u/docs/report.pdf"), None),
            Disposition::Allow
        );
        assert_eq!(
            c.classify(Path::new("/home/u/docs/README.MD"), None),
            Disposition::Allow
        );
        assert_eq!(
            c.classify(Path::new("/home/u/docs/notes.xyz"), None),
            Disposition::Ask
        );
    }

    #[test]
    fn test_static_deny_reasons() {
        let c = classifier();
        let cases = [
            ("/home/u/docs/secret.env", DenyReason::DeniedExtension),
            ("/home/u/docs/Makefile", DenyReason::NoExtension),
            ("/home/u/docs/.bashrc", DenyReason::NoExtension),
            ("/home/u/docs/Thumbs.db", DenyReason::DeniedName),
            ("/home/u/docs/~$report.pdf", DenyReason::LockFile),
            ("/home/u/docs/build/report.pdf", DenyReason::DeniedDirectory),
        ];

        for (path, reason) in cases {
            assert_eq!(
                c.classify(Path::new(path), None),
                Disposition::Deny(reason),
                "{path}"
            );
        }
    }

    #[test]
    fn test_directory_rule_beats_allowed_extension() {
        let c = classifier();
        assert_eq!(
            c.deny_reason(Path::new("/home/u/docs/a/node_modules/b/readme.md")),
            Some(DenyReason::DeniedDirectory)
        );
    }

    #[test]
    fn test_root_segments_are_trusted() {
        let c = Classifier::new(rules(), vec![PathBuf::from("/var/projects")]);
        assert_eq!(
            c.classify(Path::new("/var/projects/plan.pdf"), None),
            Disposition::Allow
        );
        assert_eq!(
            c.classify(Path::new("/var/projects/var/plan.pdf"), None),
            Disposition::Deny(DenyReason::DeniedDirectory)
        );
    }

    #[test]
    fn test_paths_outside_roots_check_every_segment() {
        let c = classifier();
        assert_eq!(
            c.deny_reason(Path::new("/var/other/plan.pdf")),
            Some(DenyReason::DeniedDirectory)
        );
    }

    #[test]
    fn test_directory_match_is_case_sensitive() {
        let c = classifier();
        assert_eq!(c.deny_reason(Path::new("/home/u/docs/Build/a.pdf")), None);
        assert!(c.is_denied_dir_name("build"));
        assert!(!c.is_denied_dir_name("Build"));
    }

    #[test]
    fn test_decision_cache_answers_unknown_tier() {
        let c = classifier();
        let mut cache = DecisionCache::new();
        cache.record("xyz", CachedDecision::AlwaysProcess);
        cache.record("abc", CachedDecision::AlwaysIgnore);

        assert_eq!(
            c.classify(Path::new("/home/u/docs/n.XYZ"), Some(&cache)),
            Disposition::Allow
        );
        assert_eq!(
            c.classify(Path::new("/home/u/docs/n.abc"), Some(&cache)),
            Disposition::Deny(DenyReason::OperatorIgnored)
        );
        assert_eq!(
            c.classify(Path::new("/home/u/docs/n.qqq"), Some(&cache)),
            Disposition::Ask
        );
    }

    #[test]
    fn test_cache_cannot_override_static_deny() {
        let c = classifier();
        let mut cache = DecisionCache::new();
        cache.record("env", CachedDecision::AlwaysProcess);

        assert_eq!(
            c.classify(Path::new("/home/u/docs/secret.env"), Some(&cache)),
            Disposition::Deny(DenyReason::DeniedExtension)
        );
    }

    #[test]
    fn test_token_estimate() {
        let c = classifier();
        assert_eq!(c.token_estimate("pdf", 4000), 1000);
        assert_eq!(c.token_estimate("xyz", 4000), 0);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("/a/b.TXT")), "txt");
        assert_eq!(extension_of(Path::new("/a/archive.tar.gz")), "gz");
        assert_eq!(extension_of(Path::new("/a/noext")), "");
    }
}
