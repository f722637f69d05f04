//! Operator gate for unknown extensions.
//!
//! The bulk scanner asks the operator what to do with files whose extension
//! is on neither list. "Always" answers are remembered in a [`DecisionCache`]
//! for the rest of the run so each extension is asked about at most once.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::Serialize;

use crate::config::{normalize_extension, UnattendedPolicy};
use crate::{Error, Result};

/// A remembered operator answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachedDecision {
    AlwaysProcess,
    AlwaysIgnore,
}

/// Run-scoped memo of "always" answers, keyed by normalized extension.
///
/// Never persisted; a new scan starts with an empty cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DecisionCache {
    entries: BTreeMap<String, CachedDecision>,
}

impl DecisionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an extension (with or without the leading dot, any case).
    #[must_use]
    pub fn get(&self, extension: &str) -> Option<CachedDecision> {
        self.entries.get(&normalize_extension(extension)).copied()
    }

    /// Remember a decision for an extension.
    pub fn record(&mut self, extension: &str, decision: CachedDecision) {
        self.entries.insert(normalize_extension(extension), decision);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in extension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, CachedDecision)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// The four answers the operator can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ProcessOnce,
    IgnoreOnce,
    ProcessAlways,
    IgnoreAlways,
}

impl Decision {
    /// Whether the file in front of the operator gets recorded.
    #[must_use]
    pub const fn is_process(self) -> bool {
        matches!(self, Self::ProcessOnce | Self::ProcessAlways)
    }

    /// The cache entry this answer produces, if any.
    #[must_use]
    pub const fn cached(self) -> Option<CachedDecision> {
        match self {
            Self::ProcessAlways => Some(CachedDecision::AlwaysProcess),
            Self::IgnoreAlways => Some(CachedDecision::AlwaysIgnore),
            Self::ProcessOnce | Self::IgnoreOnce => None,
        }
    }

    fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(Self::ProcessOnce),
            "2" => Some(Self::IgnoreOnce),
            "3" => Some(Self::ProcessAlways),
            "4" => Some(Self::IgnoreAlways),
            _ => None,
        }
    }
}

/// Something that can put a four-way choice in front of an operator.
pub trait OperatorPrompt {
    /// Ask about one file. Blocks until an answer is available.
    ///
    /// # Errors
    ///
    /// Returns an error if no answer can be obtained (e.g. input closed).
    fn ask(&mut self, path: &Path, extension: &str) -> Result<Decision>;

    /// Whether a person is answering. Unattended answers are journaled.
    fn is_attended(&self) -> bool {
        true
    }
}

/// Line-oriented prompt over any reader/writer pair.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    /// Prompt on the process's stdin/stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn render(&mut self, path: &Path, extension: &str) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(self.output, "{}", "=".repeat(50))?;
        writeln!(self.output, "Unknown extension")?;
        writeln!(self.output, "  File:      {}", path.display())?;
        writeln!(self.output, "  Extension: .{extension}")?;
        writeln!(self.output)?;
        writeln!(self.output, "[1] Process (this file only)")?;
        writeln!(self.output, "[2] Ignore (this file only)")?;
        writeln!(self.output, "[3] Process ALWAYS (every '*.{extension}' in this scan)")?;
        writeln!(self.output, "[4] Ignore ALWAYS (every '*.{extension}' in this scan)")?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> OperatorPrompt for TerminalPrompt<R, W> {
    fn ask(&mut self, path: &Path, extension: &str) -> Result<Decision> {
        self.render(path, extension)?;

        loop {
            write!(self.output, "Your choice for '.{extension}' (1-4): ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(Error::internal("operator input closed"));
            }

            if let Some(decision) = Decision::from_choice(&line) {
                return Ok(decision);
            }
            writeln!(self.output, "Invalid choice. Enter a number from 1 to 4.")?;
        }
    }
}

/// Answers every question with a fixed policy; nobody is asked.
#[derive(Debug, Clone, Copy)]
pub struct UnattendedPrompt {
    policy: UnattendedPolicy,
}

impl UnattendedPrompt {
    #[must_use]
    pub const fn new(policy: UnattendedPolicy) -> Self {
        Self { policy }
    }
}

impl OperatorPrompt for UnattendedPrompt {
    fn ask(&mut self, _path: &Path, _extension: &str) -> Result<Decision> {
        Ok(match self.policy {
            UnattendedPolicy::Ignore => Decision::IgnoreOnce,
            UnattendedPolicy::Process => Decision::ProcessOnce,
        })
    }

    fn is_attended(&self) -> bool {
        false
    }
}

/// Ask about one file and remember "always" answers.
///
/// # Errors
///
/// Returns the prompt's error unchanged; the cache is not touched then.
pub fn resolve(
    prompt: &mut dyn OperatorPrompt,
    cache: &mut DecisionCache,
    path: &Path,
    extension: &str,
) -> Result<Decision> {
    let extension = normalize_extension(extension);
    let decision = prompt.ask(path, &extension)?;

    if let Some(cached) = decision.cached() {
        cache.record(&extension, cached);
        tracing::info!(extension = %extension, ?cached, "Remembering decision for this scan");
    }

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn terminal(input: &str) -> TerminalPrompt<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalPrompt::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_terminal_prompt_reads_choice() {
        let mut prompt = terminal("3\n");
        let decision = prompt.ask(Path::new("/d/notes.xyz"), "xyz").unwrap();
        assert_eq!(decision, Decision::ProcessAlways);

        let shown = String::from_utf8(prompt.output).unwrap();
        assert!(shown.contains("/d/notes.xyz"));
        assert!(shown.contains("*.xyz"));
    }

    #[test]
    fn test_terminal_prompt_reasks_on_invalid_input() {
        let mut prompt = terminal("yes\n9\n\n 2 \n");
        let decision = prompt.ask(Path::new("/d/a.q"), "q").unwrap();
        assert_eq!(decision, Decision::IgnoreOnce);

        let shown = String::from_utf8(prompt.output).unwrap();
        assert_eq!(shown.matches("Invalid choice").count(), 3);
    }

    #[test]
    fn test_terminal_prompt_eof_is_error() {
        let mut prompt = terminal("");
        assert!(prompt.ask(Path::new("/d/a.q"), "q").is_err());
    }

    #[test]
    fn test_resolve_records_always_answers() {
        let mut cache = DecisionCache::new();

        let mut prompt = terminal("4\n");
        let decision = resolve(&mut prompt, &mut cache, Path::new("/d/a.QQ"), ".QQ").unwrap();
        assert_eq!(decision, Decision::IgnoreAlways);
        assert_eq!(cache.get("qq"), Some(CachedDecision::AlwaysIgnore));
        assert_eq!(cache.get(".QQ"), Some(CachedDecision::AlwaysIgnore));
    }

    #[test]
    fn test_resolve_once_answers_leave_cache_empty() {
        let mut cache = DecisionCache::new();

        let mut prompt = terminal("1\n");
        let decision = resolve(&mut prompt, &mut cache, Path::new("/d/a.q"), "q").unwrap();
        assert!(decision.is_process());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_failure_leaves_cache_untouched() {
        let mut cache = DecisionCache::new();
        let mut prompt = terminal("");
        assert!(resolve(&mut prompt, &mut cache, Path::new("/d/a.q"), "q").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unattended_prompt_follows_policy() {
        let mut ignore = UnattendedPrompt::new(UnattendedPolicy::Ignore);
        let mut process = UnattendedPrompt::new(UnattendedPolicy::Process);

        assert_eq!(
            ignore.ask(Path::new("/d/a.q"), "q").unwrap(),
            Decision::IgnoreOnce
        );
        assert_eq!(
            process.ask(Path::new("/d/a.q"), "q").unwrap(),
            Decision::ProcessOnce
        );
        assert!(!ignore.is_attended());
    }

    #[test]
    fn test_cache_iteration_is_sorted() {
        let mut cache = DecisionCache::new();
        cache.record("zz", CachedDecision::AlwaysProcess);
        cache.record("aa", CachedDecision::AlwaysIgnore);

        let keys: Vec<&str> = cache.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["aa", "zz"]);
        assert_eq!(cache.len(), 2);
    }
}
