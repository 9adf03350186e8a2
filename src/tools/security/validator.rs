//! Static validation of generated code.
//!
//! `CodeValidator` rejects code that does not parse and flags calls and
//! imports that match configurable glob pattern sets. Validation never
//! executes anything and never fails: every outcome is a `ValidationResult`.

use crate::tools::security::lexer::{self, Token, TokenKind};
use crate::tools::security::patterns::{AllowList, PatternSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Call names rejected by default.
pub const DEFAULT_BLOCKED: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "__import__",
    "os.system",
    "os.popen",
    "os.exec*",
    "os.spawn*",
    "os.fork",
    "subprocess.*",
    "pty.spawn",
];

/// Call names that produce a warning by default.
pub const DEFAULT_WARNED: &[&str] = &[
    "open",
    "pickle.load",
    "pickle.loads",
    "marshal.loads",
    "shelve.open",
    "yaml.load",
    "shutil.rmtree",
    "os.remove",
    "os.unlink",
];

/// Modules whose import produces a warning by default.
pub const DEFAULT_WARNED_IMPORTS: &[&str] =
    &["os", "subprocess", "sys", "shutil", "ctypes", "pickle", "socket"];

/// Default maximum line length before the style lint warns.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 120;

/// Security settings for the code validator.
///
/// Every list extends or trims the built-in defaults; an empty
/// configuration validates with the defaults alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Whether call and import checks run at all
    pub enabled: bool,
    /// Additional blocked call patterns
    pub blocked: Vec<String>,
    /// Additional warned call patterns
    pub warned: Vec<String>,
    /// Additional warned import modules
    pub warned_imports: Vec<String>,
    /// Patterns removed from the defaults and exempted from every check
    pub allow: Vec<String>,
    /// Whether the style lint runs
    pub lint: bool,
    /// Maximum line length for the style lint
    pub max_line_length: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blocked: Vec::new(),
            warned: Vec::new(),
            warned_imports: Vec::new(),
            allow: Vec::new(),
            lint: true,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Outcome of validating one piece of code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// False if any error was recorded
    pub valid: bool,
    /// Findings that reject the code
    pub errors: Vec<String>,
    /// Findings that do not affect validity
    pub warnings: Vec<String>,
    /// Token stream of the parsed code, absent on syntax errors
    #[serde(skip)]
    pub tokens: Option<Vec<Token>>,
}

impl ValidationResult {
    fn syntax_error(message: String) -> Self {
        Self {
            valid: false,
            errors: vec![message],
            warnings: Vec::new(),
            tokens: None,
        }
    }

    /// Returns true if the code passed validation.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns true if any warnings were recorded.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A call site resolved to a dotted name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CallSite {
    name: String,
    line: usize,
}

/// An imported module.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ImportSite {
    module: String,
    line: usize,
}

/// Validates code for syntax and risky operations.
///
/// # Example
///
/// ```rust
/// use toolhost::tools::CodeValidator;
///
/// let validator = CodeValidator::new();
/// let result = validator.validate("eval('1 + 1')");
/// assert!(!result.valid);
/// assert_eq!(result.errors, vec!["Line 1: Dangerous builtin 'eval' is not allowed"]);
/// ```
#[derive(Debug, Clone)]
pub struct CodeValidator {
    config: SecurityConfig,
    blocked: PatternSet,
    warned: PatternSet,
    warned_imports: PatternSet,
    allow: AllowList,
}

impl Default for CodeValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeValidator {
    /// Creates a validator with the default pattern sets.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&SecurityConfig::default())
    }

    /// Creates a validator from security settings.
    #[must_use]
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            blocked: PatternSet::build(DEFAULT_BLOCKED, &config.blocked, &config.allow),
            warned: PatternSet::build(DEFAULT_WARNED, &config.warned, &config.allow),
            warned_imports: PatternSet::build(
                DEFAULT_WARNED_IMPORTS,
                &config.warned_imports,
                &config.allow,
            ),
            allow: AllowList::new(&config.allow),
            config: config.clone(),
        }
    }

    /// Adds a blocked pattern.
    #[must_use]
    pub fn with_blocked(self, pattern: impl Into<String>) -> Self {
        let mut config = self.config;
        config.blocked.push(pattern.into());
        Self::from_config(&config)
    }

    /// Adds a warned pattern.
    #[must_use]
    pub fn with_warned(self, pattern: impl Into<String>) -> Self {
        let mut config = self.config;
        config.warned.push(pattern.into());
        Self::from_config(&config)
    }

    /// Adds an allow-list entry.
    #[must_use]
    pub fn with_allowed(self, pattern: impl Into<String>) -> Self {
        let mut config = self.config;
        config.allow.push(pattern.into());
        Self::from_config(&config)
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Returns the active blocked patterns.
    #[must_use]
    pub fn blocked_patterns(&self) -> &PatternSet {
        &self.blocked
    }

    /// Validates code with security checks enabled.
    #[must_use]
    pub fn validate(&self, code: &str) -> ValidationResult {
        self.validate_with(code, true)
    }

    /// Validates code, optionally skipping the call and import checks.
    #[must_use]
    pub fn validate_with(&self, code: &str, check_security: bool) -> ValidationResult {
        let tokens = match lexer::parse(code) {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "Code failed to parse");
                return ValidationResult::syntax_error(e.to_string());
            }
        };

        let mut result = ValidationResult {
            valid: true,
            ..Default::default()
        };

        if check_security && self.config.enabled {
            for call in extract_calls(&tokens) {
                self.check_call(&call, &mut result);
            }
            for import in extract_imports(&tokens) {
                self.check_import(&import, &mut result);
            }
        }

        if self.config.lint {
            lint(code, &tokens, self.config.max_line_length, &mut result.warnings);
        }

        result.valid = result.errors.is_empty();
        result.tokens = Some(tokens);
        debug!(
            valid = result.valid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Validated code"
        );
        result
    }

    fn check_call(&self, call: &CallSite, result: &mut ValidationResult) {
        if self.allow.permits(&call.name) {
            return;
        }
        let kind = if call.name.contains('.') {
            "function"
        } else {
            "builtin"
        };
        if self.blocked.matches_call(&call.name).is_some() {
            result.errors.push(format!(
                "Line {}: Dangerous {} '{}' is not allowed",
                call.line, kind, call.name
            ));
        } else if self.warned.matches_call(&call.name).is_some() {
            result.warnings.push(format!(
                "Line {}: Potentially unsafe {} '{}'",
                call.line, kind, call.name
            ));
        }
    }

    fn check_import(&self, import: &ImportSite, result: &mut ValidationResult) {
        let top = import.module.split('.').next().unwrap_or(import.module.as_str());
        if self.allow.permits(&import.module) || self.allow.permits(top) {
            return;
        }
        if self.blocked.matches_import(&import.module).is_some() {
            result.errors.push(format!(
                "Line {}: Dangerous import '{}' is not allowed",
                import.line, import.module
            ));
        } else if self.warned_imports.matches_import(&import.module).is_some()
            || self.warned.matches_import(&import.module).is_some()
        {
            result.warnings.push(format!(
                "Line {}: Import of '{}' may enable dangerous operations",
                import.line, import.module
            ));
        }
    }
}

/// Resolves a `Name(.Name)*` chain ending at `end`.
///
/// Returns the dotted name and the index of its first token. Chains rooted
/// in anything other than an identifier (`x().y`, `"s".join`) yield `None`.
fn dotted_name_ending_at(tokens: &[Token], end: usize) -> Option<(String, usize)> {
    let last = tokens.get(end)?;
    if !last.is_identifier() {
        return None;
    }
    let mut parts = vec![last.text.as_str()];
    let mut start = end;
    while start >= 1 && tokens[start - 1].is_op(".") {
        let prev = tokens.get(start.checked_sub(2)?)?;
        if !prev.is_identifier() {
            return None;
        }
        parts.push(prev.text.as_str());
        start -= 2;
    }
    parts.reverse();
    Some((parts.join("."), start))
}

fn extract_calls(tokens: &[Token]) -> Vec<CallSite> {
    let mut calls = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if i == 0 || !token.is_op("(") {
            continue;
        }
        let Some((name, start)) = dotted_name_ending_at(tokens, i - 1) else {
            continue;
        };
        let is_definition = start > 0
            && (tokens[start - 1].is_name("def") || tokens[start - 1].is_name("class"));
        if is_definition {
            continue;
        }
        calls.push(CallSite {
            name,
            line: tokens[start].line,
        });
    }
    calls
}

fn read_dotted(tokens: &[&Token], mut pos: usize) -> (String, usize) {
    let mut name = String::new();
    while let Some(token) = tokens.get(pos) {
        if token.kind == TokenKind::Name && !token.is_name("import") && !token.is_name("as") {
            name.push_str(&token.text);
            pos += 1;
            if tokens.get(pos).is_some_and(|t| t.is_op(".")) {
                name.push('.');
                pos += 1;
                continue;
            }
        }
        break;
    }
    (name, pos)
}

fn extract_imports(tokens: &[Token]) -> Vec<ImportSite> {
    let mut imports = Vec::new();
    for statement in lexer::statements(tokens) {
        let Some(first) = statement.first() else {
            continue;
        };
        if first.is_name("import") {
            let mut pos = 1;
            while pos < statement.len() {
                let (module, next) = read_dotted(&statement, pos);
                if !module.is_empty() {
                    imports.push(ImportSite {
                        module,
                        line: first.line,
                    });
                }
                pos = next;
                if statement.get(pos).is_some_and(|t| t.is_name("as")) {
                    pos += 2;
                }
                if statement.get(pos).is_some_and(|t| t.is_op(",")) {
                    pos += 1;
                } else {
                    break;
                }
            }
        } else if first.is_name("from") {
            let mut pos = 1;
            while statement.get(pos).is_some_and(|t| t.is_op(".") || t.is_op("...")) {
                pos += 1;
            }
            let relative = pos > 1;
            let (module, _) = read_dotted(&statement, pos);
            if !module.is_empty() && !relative {
                imports.push(ImportSite {
                    module,
                    line: first.line,
                });
            }
        }
    }
    imports
}

fn lint(code: &str, tokens: &[Token], max_line_length: usize, warnings: &mut Vec<String>) {
    for (index, line) in code.lines().enumerate() {
        let length = line.chars().count();
        if length > max_line_length {
            warnings.push(format!(
                "Line {}: Line too long ({} > {} characters)",
                index + 1,
                length,
                max_line_length
            ));
        }
    }

    for statement in lexer::statements(tokens) {
        let Some(first) = statement.first() else {
            continue;
        };
        if first.is_name("except") && statement.get(1).is_some_and(|t| t.is_op(":")) {
            warnings.push(format!(
                "Line {}: Bare 'except:' catches every exception",
                first.line
            ));
        }
        if first.is_name("from") && statement.last().is_some_and(|t| t.is_op("*")) {
            let (module, _) = read_dotted(&statement, 1);
            warnings.push(format!(
                "Line {}: Wildcard import from '{}'",
                first.line, module
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(code: &str) -> ValidationResult {
        CodeValidator::new().validate(code)
    }

    #[test]
    fn accepts_simple_call() {
        let result = validate("print('hello')");
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.tokens.is_some());
    }

    #[test]
    fn rejects_eval_with_line_number() {
        let result = validate("x = 1\ny = eval('2 + 2')\n");
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec!["Line 2: Dangerous builtin 'eval' is not allowed"]
        );
    }

    #[test]
    fn rejects_qualified_blocked_call_and_warns_on_import() {
        let result = validate("import subprocess\nsubprocess.run(['ls'])\n");
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec!["Line 2: Dangerous function 'subprocess.run' is not allowed"]
        );
        assert!(result
            .warnings
            .contains(&"Line 1: Import of 'subprocess' may enable dangerous operations".to_string()));
    }

    #[test]
    fn syntax_error_reports_line_and_no_warnings() {
        let result = validate("def f(:\n    pass\n");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Syntax error at line 1:"));
        assert!(result.warnings.is_empty());
        assert!(result.tokens.is_none());
    }

    #[test]
    fn warned_call_keeps_code_valid() {
        let result = validate("data = open('notes.txt').read()\n");
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec!["Line 1: Potentially unsafe builtin 'open'"]
        );
    }

    #[test]
    fn os_exec_family_is_blocked() {
        let result = validate("import os\nos.execvp('sh', ['sh'])\n");
        assert_eq!(
            result.errors,
            vec!["Line 2: Dangerous function 'os.execvp' is not allowed"]
        );
    }

    #[test]
    fn security_checks_can_be_skipped() {
        let result = CodeValidator::new().validate_with("eval('1')", false);
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn disabled_config_skips_security_but_not_syntax() {
        let config = SecurityConfig {
            enabled: false,
            ..Default::default()
        };
        let validator = CodeValidator::from_config(&config);
        assert!(validator.validate("eval('1')").valid);
        assert!(!validator.validate("eval('1'").valid);
    }

    #[test]
    fn allow_list_exempts_defaults() {
        let validator = CodeValidator::new().with_allowed("open");
        let result = validator.validate("open('a.txt')\n");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn allow_list_exempts_matching_names() {
        let validator = CodeValidator::new().with_allowed("subprocess.run");
        let result = validator.validate("subprocess.run(['ls'])\n");
        assert!(result.valid);
    }

    #[test]
    fn custom_blocked_pattern() {
        let validator = CodeValidator::new().with_blocked("requests.*");
        let result = validator.validate("requests.get('https://example.com')\n");
        assert_eq!(
            result.errors,
            vec!["Line 1: Dangerous function 'requests.get' is not allowed"]
        );
    }

    #[test]
    fn custom_dotless_blocked_pattern_applies_to_imports() {
        let validator = CodeValidator::new().with_blocked("ctypes");
        let result = validator.validate("import ctypes\n");
        assert_eq!(
            result.errors,
            vec!["Line 1: Dangerous import 'ctypes' is not allowed"]
        );
    }

    #[test]
    fn custom_warned_pattern() {
        let validator = CodeValidator::new().with_warned("requests.post");
        let result = validator.validate("requests.post('u')\n");
        assert!(result.valid);
        assert_eq!(
            result.warnings,
            vec!["Line 1: Potentially unsafe function 'requests.post'"]
        );
    }

    #[test]
    fn from_import_is_checked() {
        let result = validate("from os.path import join\n");
        assert_eq!(
            result.warnings,
            vec!["Line 1: Import of 'os.path' may enable dangerous operations"]
        );
    }

    #[test]
    fn relative_imports_are_ignored() {
        let result = validate("from . import helpers\n");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn definitions_are_not_calls() {
        let result = validate("def eval(x):\n    return x\n");
        assert!(result.valid);
    }

    #[test]
    fn method_calls_on_expressions_are_not_resolved() {
        let result = validate("''.join(['a'])\nget().eval()\n");
        assert!(result.valid);
    }

    #[test]
    fn lint_flags_long_lines_bare_except_and_wildcards() {
        let long = format!("x = '{}'\n", "a".repeat(130));
        let code = format!("{long}try:\n    pass\nexcept:\n    pass\nfrom math import *\n");
        let result = validate(&code);
        assert!(result.valid);
        assert!(result.warnings.iter().any(|w| w.contains("Line too long")));
        assert!(result.warnings.iter().any(|w| w.contains("Bare 'except:'")));
        assert!(result
            .warnings
            .iter()
            .any(|w| w == "Line 6: Wildcard import from 'math'"));
    }

    #[test]
    fn lint_can_be_disabled() {
        let config = SecurityConfig {
            lint: false,
            ..Default::default()
        };
        let code = format!("x = '{}'\n", "a".repeat(200));
        let result = CodeValidator::from_config(&config).validate(&code);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn security_config_deserializes_with_defaults() {
        let config: SecurityConfig = toml::from_str("blocked = [\"requests.*\"]").unwrap();
        assert!(config.enabled);
        assert_eq!(config.blocked, vec!["requests.*"]);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }
}
