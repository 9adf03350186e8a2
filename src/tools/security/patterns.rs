//! Glob pattern sets for call and import names.
//!
//! Dotless patterns (`eval`, `os`) match bare names and bare imports.
//! Dotted patterns (`os.system`, `subprocess.*`) match only qualified calls.

use glob::Pattern;
use tracing::warn;

/// A compiled glob pattern with its source text.
#[derive(Debug, Clone)]
struct NamePattern {
    text: String,
    pattern: Pattern,
    dotted: bool,
}

impl NamePattern {
    fn compile(text: &str) -> Option<Self> {
        match Pattern::new(text) {
            Ok(pattern) => Some(Self {
                text: text.to_string(),
                pattern,
                dotted: text.contains('.'),
            }),
            Err(e) => {
                warn!(pattern = %text, error = %e, "Ignoring invalid security pattern");
                None
            }
        }
    }
}

/// An ordered set of name patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<NamePattern>,
}

impl PatternSet {
    /// Builds a set from defaults plus extras, minus anything listed in `allow`.
    ///
    /// A default is dropped when its text appears verbatim in `allow`.
    /// Duplicates are collapsed and invalid patterns are logged and skipped.
    #[must_use]
    pub fn build(defaults: &[&str], extra: &[String], allow: &[String]) -> Self {
        let mut seen: Vec<&str> = Vec::new();
        let candidates = defaults
            .iter()
            .copied()
            .filter(|d| !allow.iter().any(|a| a == d))
            .chain(extra.iter().map(String::as_str));

        let mut patterns = Vec::new();
        for text in candidates {
            if seen.contains(&text) {
                continue;
            }
            seen.push(text);
            if let Some(compiled) = NamePattern::compile(text) {
                patterns.push(compiled);
            }
        }
        Self { patterns }
    }

    /// Returns the first pattern matching a call name.
    #[must_use]
    pub fn matches_call(&self, name: &str) -> Option<&str> {
        let dotted = name.contains('.');
        self.patterns
            .iter()
            .find(|p| p.dotted == dotted && p.pattern.matches(name))
            .map(|p| p.text.as_str())
    }

    /// Returns the first dotless pattern matching an imported module.
    ///
    /// Both the full module path and its top-level package are tried, so
    /// `os` matches `import os.path`.
    #[must_use]
    pub fn matches_import(&self, module: &str) -> Option<&str> {
        let top = module.split('.').next().unwrap_or(module);
        self.patterns
            .iter()
            .filter(|p| !p.dotted)
            .find(|p| p.pattern.matches(module) || p.pattern.matches(top))
            .map(|p| p.text.as_str())
    }

    /// Returns the pattern texts in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.text.as_str())
    }

    /// Returns the number of patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if the set has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Names exempted from every check.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    patterns: Vec<Pattern>,
}

impl AllowList {
    /// Compiles the allow list; invalid entries are logged and skipped.
    #[must_use]
    pub fn new(entries: &[String]) -> Self {
        let patterns = entries
            .iter()
            .filter_map(|text| NamePattern::compile(text))
            .map(|p| p.pattern)
            .collect();
        Self { patterns }
    }

    /// Returns true if `name` is exempt.
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(defaults: &[&str]) -> PatternSet {
        PatternSet::build(defaults, &[], &[])
    }

    #[test]
    fn dotless_pattern_matches_only_bare_names() {
        let patterns = set(&["eval"]);
        assert_eq!(patterns.matches_call("eval"), Some("eval"));
        assert_eq!(patterns.matches_call("builtins.eval"), None);
    }

    #[test]
    fn dotted_wildcard_matches_qualified_calls() {
        let patterns = set(&["subprocess.*", "os.exec*"]);
        assert_eq!(patterns.matches_call("subprocess.run"), Some("subprocess.*"));
        assert_eq!(patterns.matches_call("os.execvp"), Some("os.exec*"));
        assert_eq!(patterns.matches_call("subprocess"), None);
        assert_eq!(patterns.matches_call("os.getcwd"), None);
    }

    #[test]
    fn imports_match_top_level_package() {
        let patterns = set(&["os", "subprocess.*"]);
        assert_eq!(patterns.matches_import("os"), Some("os"));
        assert_eq!(patterns.matches_import("os.path"), Some("os"));
        assert_eq!(patterns.matches_import("subprocess"), None);
    }

    #[test]
    fn allow_removes_exact_defaults() {
        let allow = vec!["open".to_string()];
        let patterns = PatternSet::build(&["open", "eval"], &[], &allow);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns.matches_call("open"), None);
    }

    #[test]
    fn extras_are_appended_and_deduplicated() {
        let extra = vec!["requests.*".to_string(), "eval".to_string()];
        let patterns = PatternSet::build(&["eval"], &extra, &[]);
        let texts: Vec<&str> = patterns.iter().collect();
        assert_eq!(texts, vec!["eval", "requests.*"]);
    }

    #[test]
    fn invalid_patterns_are_skipped() {
        let extra = vec!["[unclosed".to_string()];
        let patterns = PatternSet::build(&["eval"], &extra, &[]);
        assert_eq!(patterns.len(), 1);
    }

    #[test]
    fn allow_list_matches_globs() {
        let allow = AllowList::new(&["os.path.*".to_string()]);
        assert!(allow.permits("os.path.join"));
        assert!(!allow.permits("os.system"));
    }
}
