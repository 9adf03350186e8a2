//! Inline script metadata and tool file scanning.
//!
//! A tool file may open with an inline dependency header:
//!
//! ```text
//! # /// script
//! # requires-python = ">=3.11"
//! # dependencies = [
//! #   "httpx>=0.27",
//! # ]
//! # ///
//! ```
//!
//! The comment prefix is stripped from each body line and the result is
//! parsed as TOML. Files that declare at least one dependency run in an
//! isolated worker; everything else runs in-process.

use crate::tools::error::ToolError;
use crate::tools::security::lexer::{self, TokenKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Line that opens a script metadata block.
pub const OPEN_MARKER: &str = "# /// script";

/// Line that closes a metadata block.
pub const CLOSE_MARKER: &str = "# ///";

/// Parsed inline script metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    /// Python version constraint, e.g. `>=3.11`
    pub requires_python: Option<String>,
    /// Declared dependencies, in order
    pub dependencies: Vec<String>,
    /// The header block exactly as it appears in the file
    pub raw_header: String,
}

impl ScriptMetadata {
    /// Returns true if any dependency is declared.
    #[must_use]
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct HeaderBody {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, rename = "requires-python")]
    requires_python: Option<String>,
}

/// Parses the metadata block of a tool file.
///
/// Returns `Ok(None)` when the file has no block.
///
/// # Errors
///
/// Returns a description of the problem for an unclosed block, a second
/// `script` block, a non-comment line inside the block, or invalid TOML.
pub fn parse_header(content: &str) -> Result<Option<ScriptMetadata>, String> {
    let mut lines = content.lines().enumerate();
    let mut found: Option<ScriptMetadata> = None;

    while let Some((number, line)) = lines.next() {
        if line.trim_end() != OPEN_MARKER {
            continue;
        }
        if found.is_some() {
            return Err(format!(
                "line {}: multiple `script` metadata blocks",
                number + 1
            ));
        }

        let mut raw = vec![line];
        let mut body = Vec::new();
        let mut closed = false;
        for (inner_number, inner) in lines.by_ref() {
            raw.push(inner);
            let trimmed = inner.trim_end();
            if trimmed == CLOSE_MARKER {
                closed = true;
                break;
            }
            if trimmed == "#" {
                body.push("");
            } else if let Some(text) = trimmed.strip_prefix("# ") {
                body.push(text);
            } else {
                return Err(format!(
                    "line {}: metadata block lines must start with '#'",
                    inner_number + 1
                ));
            }
        }
        if !closed {
            return Err(format!(
                "line {}: metadata block is never closed with '{}'",
                number + 1,
                CLOSE_MARKER
            ));
        }

        let parsed: HeaderBody = toml::from_str(&body.join("\n"))
            .map_err(|e| format!("invalid TOML in metadata block: {e}"))?;
        found = Some(ScriptMetadata {
            requires_python: parsed.requires_python,
            dependencies: parsed.dependencies,
            raw_header: raw.join("\n"),
        });
    }

    Ok(found)
}

/// Detects the metadata block, failing open.
///
/// A malformed block is logged and treated as absent.
#[must_use]
pub fn detect(content: &str) -> Option<ScriptMetadata> {
    match parse_header(content) {
        Ok(metadata) => metadata,
        Err(reason) => {
            warn!(reason = %reason, "Ignoring malformed script metadata");
            None
        }
    }
}

/// Reads and parses the metadata block of a tool file.
///
/// # Errors
///
/// Returns `InvalidMetadata` if the file cannot be read or the block is
/// malformed.
pub fn parse(path: &Path) -> Result<Option<ScriptMetadata>, ToolError> {
    let content = read(path)?;
    parse_header(&content).map_err(|reason| ToolError::invalid_metadata(path, reason))
}

/// Cheap check for the opening marker in the leading comment block.
///
/// Stops at the first line that is neither blank nor a comment and never
/// parses TOML. Unreadable files report `false`.
#[must_use]
pub fn has_header(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            return false;
        };
        let trimmed = line.trim_end();
        if trimmed == OPEN_MARKER {
            return true;
        }
        if !(trimmed.is_empty() || trimmed.starts_with('#')) {
            return false;
        }
    }
    false
}

fn read(path: &Path) -> Result<String, ToolError> {
    std::fs::read_to_string(path)
        .map_err(|e| ToolError::invalid_metadata(path, format!("cannot read file: {e}")))
}

static DEF_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static EXPORTS_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static QUOTED_NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static PACK_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(pattern, error = %e, "Failed to compile scanner pattern");
            None
        }
    })
    .as_ref()
}

fn def_pattern() -> Option<&'static Regex> {
    cached(
        &DEF_PATTERN,
        r"(?m)^(?:async[ \t]+)?def[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(",
    )
}

fn exports_pattern() -> Option<&'static Regex> {
    cached(
        &EXPORTS_PATTERN,
        r"(?ms)^__all__[ \t]*(?::[^=\n]*)?=[ \t]*[\[(](.*?)[\])]",
    )
}

fn quoted_name_pattern() -> Option<&'static Regex> {
    cached(&QUOTED_NAME_PATTERN, r#"["']([A-Za-z_][A-Za-z0-9_]*)["']"#)
}

fn pack_pattern() -> Option<&'static Regex> {
    cached(
        &PACK_PATTERN,
        r#"(?m)^pack[ \t]*(?::[ \t]*str[ \t]*)?=[ \t]*["']([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)["'][ \t]*(?:#.*)?$"#,
    )
}

/// A top-level function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Parameter names in order, without `*args`/`**kwargs`
    pub params: Vec<String>,
}

/// Lists top-level function definitions in source order.
#[must_use]
pub fn function_defs(content: &str) -> Vec<FunctionDef> {
    let Some(pattern) = def_pattern() else {
        return Vec::new();
    };
    pattern
        .captures_iter(content)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let name = captures.get(1)?.as_str().to_string();
            let params = parameter_names(&content[whole.end()..]);
            Some(FunctionDef { name, params })
        })
        .collect()
}

/// Extracts parameter names from the text following a `def name(`.
fn parameter_names(after_paren: &str) -> Vec<String> {
    let tokens = match lexer::bracketed_group(&format!("({after_paren}")) {
        Ok(tokens) => tokens,
        Err(e) => {
            debug!(error = %e, "Could not read parameter list");
            return Vec::new();
        }
    };

    // Strip the outer brackets; the group always opens and closes with one.
    let inner = tokens.get(1..tokens.len().saturating_sub(1)).unwrap_or_default();
    let mut params = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = true;
    for token in inner {
        if token.kind == TokenKind::Op {
            match token.text.as_str() {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth = depth.saturating_sub(1),
                "," if depth == 0 => {
                    segment_start = true;
                    continue;
                }
                _ => {}
            }
        }
        if segment_start && depth == 0 {
            // `*args`, `**kwargs`, bare `*` and `/` start with an operator.
            if token.kind == TokenKind::Name {
                params.push(token.text.clone());
            }
            segment_start = false;
        }
    }
    params
}

/// Returns the names listed in a top-level `__all__`, if declared.
#[must_use]
pub fn declared_exports(content: &str) -> Option<Vec<String>> {
    let captures = exports_pattern()?.captures(content)?;
    let body = captures.get(1)?.as_str();
    Some(
        quoted_name_pattern()?
            .captures_iter(body)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
    )
}

/// Returns the public functions of a module's source.
///
/// Public means not starting with `_`; when `__all__` is declared, only
/// listed names are kept. Source order is preserved.
#[must_use]
pub fn public_functions(content: &str) -> Vec<FunctionDef> {
    let exports = declared_exports(content);
    let mut seen: Vec<String> = Vec::new();
    function_defs(content)
        .into_iter()
        .filter(|def| !def.name.starts_with('_'))
        .filter(|def| exports.as_ref().map_or(true, |names| names.contains(&def.name)))
        .filter(|def| {
            if seen.contains(&def.name) {
                false
            } else {
                seen.push(def.name.clone());
                true
            }
        })
        .collect()
}

/// Returns the `pack = "dot.notation"` declaration in a module's source.
#[must_use]
pub fn pack_declaration(content: &str) -> Option<String> {
    pack_pattern()?
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Lists the public function names defined in a tool file.
///
/// # Errors
///
/// Returns `InvalidMetadata` if the file cannot be read.
pub fn extract_public_function_names(path: &Path) -> Result<Vec<String>, ToolError> {
    let content = read(path)?;
    Ok(public_functions(&content)
        .into_iter()
        .map(|def| def.name)
        .collect())
}

/// Reads the pack declaration of a tool file.
///
/// # Errors
///
/// Returns `InvalidMetadata` if the file cannot be read.
pub fn extract_pack_declaration(path: &Path) -> Result<Option<String>, ToolError> {
    let content = read(path)?;
    Ok(pack_declaration(&content))
}

/// Tool files split by where they run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categorized {
    /// Files with declared dependencies, run in workers
    pub worker_files: Vec<PathBuf>,
    /// Files run in-process
    pub in_process_files: Vec<PathBuf>,
    /// Files whose metadata could not be read, with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Splits tool files into worker and in-process sets.
///
/// Unreadable or malformed files fail open to in-process and are recorded
/// in `failures`.
#[must_use]
pub fn categorize(files: &[PathBuf]) -> Categorized {
    let mut categorized = Categorized::default();
    for file in files {
        match parse(file) {
            Ok(Some(metadata)) if metadata.has_dependencies() => {
                debug!(
                    file = %file.display(),
                    dependencies = metadata.dependencies.len(),
                    "Tool file runs in a worker"
                );
                categorized.worker_files.push(file.clone());
            }
            Ok(_) => categorized.in_process_files.push(file.clone()),
            Err(error) => {
                warn!(file = %file.display(), error = %error, "Treating tool file as in-process");
                categorized.failures.push((file.clone(), error.to_string()));
                categorized.in_process_files.push(file.clone());
            }
        }
    }
    categorized
}

fn is_skipped_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// Lists `*.py` tool files under `dir`, sorted.
///
/// Files and directories whose names start with `_` or `.` are skipped.
///
/// # Errors
///
/// Returns `NotFound` if `dir` is not a readable directory.
pub fn discover_tool_files(dir: &Path) -> Result<Vec<PathBuf>, ToolError> {
    if !dir.is_dir() {
        return Err(ToolError::not_found(format!(
            "tools directory '{}'",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_skipped_name(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry in tools directory");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().is_some_and(|ext| ext == "py"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER_FILE: &str = "\
# /// script
# requires-python = \">=3.11\"
# dependencies = [
#   \"httpx>=0.27\",
#   \"rich\",
# ]
# ///
import httpx

def fetch(url, timeout=10):
    return httpx.get(url, timeout=timeout).text
";

    #[test]
    fn detects_dependencies_in_order() {
        let metadata = detect(HEADER_FILE).unwrap();
        assert_eq!(metadata.dependencies, vec!["httpx>=0.27", "rich"]);
        assert_eq!(metadata.requires_python.as_deref(), Some(">=3.11"));
        assert!(metadata.has_dependencies());
        assert!(metadata.raw_header.starts_with("# /// script"));
        assert!(metadata.raw_header.ends_with("# ///"));
    }

    #[test]
    fn file_without_header_has_no_metadata() {
        assert_eq!(detect("def greet(name):\n    return name\n"), None);
    }

    #[test]
    fn empty_dependency_list_is_not_isolated() {
        let content = "# /// script\n# dependencies = []\n# ///\n";
        let metadata = detect(content).unwrap();
        assert!(!metadata.has_dependencies());
    }

    #[test]
    fn blank_comment_lines_are_allowed() {
        let content = "# /// script\n#\n# dependencies = [\"a\"]\n#\n# ///\n";
        assert_eq!(detect(content).unwrap().dependencies, vec!["a"]);
    }

    #[test]
    fn unclosed_block_is_rejected() {
        let err = parse_header("# /// script\n# dependencies = [\"a\"]\n").unwrap_err();
        assert!(err.contains("never closed"));
        assert_eq!(detect("# /// script\n# dependencies = [\"a\"]\n"), None);
    }

    #[test]
    fn duplicate_block_is_rejected() {
        let block = "# /// script\n# dependencies = [\"a\"]\n# ///\n";
        let err = parse_header(&format!("{block}{block}")).unwrap_err();
        assert!(err.contains("multiple"));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        let err = parse_header("# /// script\n# dependencies = [\n# ///\n").unwrap_err();
        assert!(err.contains("invalid TOML"));
    }

    #[test]
    fn function_defs_capture_parameters() {
        let defs = function_defs(HEADER_FILE);
        assert_eq!(
            defs,
            vec![FunctionDef {
                name: "fetch".to_string(),
                params: vec!["url".to_string(), "timeout".to_string()],
            }]
        );
    }

    #[test]
    fn parameters_skip_star_args_and_annotations() {
        let defs = function_defs(
            "async def search(query: str, *, limit: int = 5, tags: list[str] = [], **extra) -> dict:\n    pass\n",
        );
        assert_eq!(defs[0].name, "search");
        assert_eq!(defs[0].params, vec!["query", "limit", "tags"]);
    }

    #[test]
    fn parameters_ignore_delimiters_inside_string_defaults() {
        let defs = function_defs("def join(items, sep=\",\", limit=1):\n    pass\n");
        assert_eq!(defs[0].params, vec!["items", "sep", "limit"]);

        let defs = function_defs(
            "def wrap(text,\n         open='(', close=\")\",  # comment, here\n         width=80):\n    pass\n",
        );
        assert_eq!(defs[0].params, vec!["text", "open", "close", "width"]);
    }

    #[test]
    fn public_functions_skip_private_and_nested() {
        let content = "def visible():\n    def inner():\n        pass\n\ndef _hidden():\n    pass\n";
        let names: Vec<String> = public_functions(content).into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["visible"]);
    }

    #[test]
    fn public_functions_respect_all() {
        let content = "__all__ = [\n    \"b\",\n]\n\ndef a():\n    pass\n\ndef b():\n    pass\n";
        let names: Vec<String> = public_functions(content).into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b"]);
    }

    #[test]
    fn pack_declaration_is_read() {
        assert_eq!(
            pack_declaration("pack = \"brave.search\"  # namespace\n"),
            Some("brave.search".to_string())
        );
        assert_eq!(pack_declaration("    pack = \"nested\"\n"), None);
        assert_eq!(pack_declaration("package = \"x\"\n"), None);
    }

    #[test]
    fn has_header_scans_leading_comments_only() {
        let dir = TempDir::new().unwrap();
        let with = dir.path().join("with.py");
        let late = dir.path().join("late.py");
        fs::write(&with, format!("#!/usr/bin/env python\n\n{HEADER_FILE}")).unwrap();
        fs::write(&late, format!("import os\n{HEADER_FILE}")).unwrap();
        assert!(has_header(&with));
        assert!(!has_header(&late));
        assert!(!has_header(&dir.path().join("missing.py")));
    }

    #[test]
    fn categorize_fails_open() {
        let dir = TempDir::new().unwrap();
        let isolated = dir.path().join("fetch.py");
        let plain = dir.path().join("greet.py");
        let broken = dir.path().join("broken.py");
        fs::write(&isolated, HEADER_FILE).unwrap();
        fs::write(&plain, "def greet(name):\n    return name\n").unwrap();
        fs::write(&broken, "# /// script\n# dependencies = [\"a\"]\n").unwrap();

        let files = vec![isolated.clone(), plain.clone(), broken.clone()];
        let categorized = categorize(&files);
        assert_eq!(categorized.worker_files, vec![isolated]);
        assert_eq!(categorized.in_process_files, vec![plain, broken.clone()]);
        assert_eq!(categorized.failures.len(), 1);
        assert_eq!(categorized.failures[0].0, broken);
    }

    #[test]
    fn discover_skips_private_and_hidden_names() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("net")).unwrap();
        fs::create_dir_all(dir.path().join("_internal")).unwrap();
        fs::write(dir.path().join("b.py"), "").unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("_helpers.py"), "").unwrap();
        fs::write(dir.path().join(".hidden.py"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("net").join("fetch.py"), "").unwrap();
        fs::write(dir.path().join("_internal").join("x.py"), "").unwrap();

        let files = discover_tool_files(dir.path()).unwrap();
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.py"),
                PathBuf::from("b.py"),
                PathBuf::from("net").join("fetch.py"),
            ]
        );
    }

    #[test]
    fn discover_missing_directory_is_not_found() {
        let err = discover_tool_files(Path::new("/nonexistent/toolhost/tools")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn extract_helpers_read_files() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("search.py");
        fs::write(&file, "pack = \"brave\"\n\ndef web(query):\n    pass\n").unwrap();
        assert_eq!(extract_public_function_names(&file).unwrap(), vec!["web"]);
        assert_eq!(extract_pack_declaration(&file).unwrap(), Some("brave".to_string()));
        assert!(extract_pack_declaration(&dir.path().join("nope.py")).is_err());
    }
}
