//! Discovery-time registry of tool functions.
//!
//! The catalog walks a tools directory once, classifies every tool file by
//! its script metadata and records the public functions it exposes. Tools
//! are named `pack.function` when the file declares a pack and
//! `module_id.function` otherwise. Classification is stable until
//! [`ToolCatalog::rescan`].

use crate::tools::definition::ToolInfo;
use crate::tools::error::ToolError;
use crate::tools::metadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// In the host process
    Host,
    /// In an isolated worker subprocess
    Worker,
}

impl std::fmt::Display for Isolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// A catalogued tool and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Tool identity
    pub info: ToolInfo,
    /// Where the tool runs
    pub isolation: Isolation,
}

/// Returns the dotted module identifier of `file` relative to `tools_dir`.
///
/// `tools/net/fetch.py` under `tools` becomes `net.fetch`. Files outside
/// the directory fall back to their stem.
#[must_use]
pub fn module_id(tools_dir: &Path, file: &Path) -> String {
    let stem = || {
        file.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    };

    let Ok(relative) = file.strip_prefix(tools_dir) else {
        return stem();
    };
    let relative = relative.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        stem()
    } else {
        parts.join(".")
    }
}

/// Registry of discovered tools keyed by caller-facing name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools_dir: Option<PathBuf>,
    entries: BTreeMap<String, CatalogEntry>,
    files: BTreeMap<PathBuf, Isolation>,
    failures: Vec<(PathBuf, String)>,
}

impl ToolCatalog {
    /// Creates an empty catalog with no tools directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Discovers every tool under `dir`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `dir` is not a directory.
    pub fn discover(dir: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let mut catalog = Self {
            tools_dir: Some(dir.into()),
            ..Self::default()
        };
        catalog.rescan()?;
        Ok(catalog)
    }

    /// Rebuilds the discovered entries from the tools directory.
    ///
    /// Host tools registered with [`register_host_tool`](Self::register_host_tool)
    /// that have no source file are kept.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tools directory no longer exists.
    pub fn rescan(&mut self) -> Result<(), ToolError> {
        let Some(dir) = self.tools_dir.clone() else {
            return Ok(());
        };

        let files = metadata::discover_tool_files(&dir)?;
        let categorized = metadata::categorize(&files);

        self.entries.retain(|_, entry| entry.info.file.is_none());
        self.files.clear();
        self.failures = categorized.failures;

        let classified = categorized
            .worker_files
            .iter()
            .map(|f| (f, Isolation::Worker))
            .chain(
                categorized
                    .in_process_files
                    .iter()
                    .map(|f| (f, Isolation::Host)),
            );
        for (file, isolation) in classified {
            self.files.insert(file.clone(), isolation);
            if let Err(error) = self.add_file(&dir, file, isolation) {
                warn!(file = %file.display(), error = %error, "Skipping unreadable tool file");
                self.failures.push((file.clone(), error.to_string()));
            }
        }
        self.failures.sort();

        info!(
            dir = %dir.display(),
            tools = self.entries.len(),
            files = self.files.len(),
            failures = self.failures.len(),
            "Tool catalog scanned"
        );
        Ok(())
    }

    fn add_file(&mut self, dir: &Path, file: &Path, isolation: Isolation) -> Result<(), ToolError> {
        let content = std::fs::read_to_string(file)
            .map_err(|e| ToolError::invalid_metadata(file, format!("cannot read file: {e}")))?;
        let module = module_id(dir, file);
        let pack = metadata::pack_declaration(&content);

        for def in metadata::public_functions(&content) {
            let namespace = pack.as_deref().unwrap_or(&module);
            let name = format!("{namespace}.{}", def.name);
            if let Some(existing) = self.entries.get(&name) {
                warn!(
                    tool = %name,
                    file = %file.display(),
                    existing = %existing.info.module,
                    "Duplicate tool name, keeping the first definition"
                );
                continue;
            }
            let info = ToolInfo::new(module.clone(), def.name)
                .with_name(name.clone())
                .with_file(file)
                .with_signature(def.params);
            debug!(tool = %name, module = %module, isolation = %isolation, "Catalogued tool");
            self.entries.insert(name, CatalogEntry { info, isolation });
        }
        Ok(())
    }

    /// Registers a native host tool that has no source file.
    ///
    /// Replaces any entry with the same name.
    pub fn register_host_tool(&mut self, info: ToolInfo) {
        let name = info.name.clone();
        self.entries.insert(
            name,
            CatalogEntry {
                info,
                isolation: Isolation::Host,
            },
        );
    }

    /// Returns the tools directory, if any.
    #[must_use]
    pub fn tools_dir(&self) -> Option<&Path> {
        self.tools_dir.as_deref()
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// Returns where a tool runs.
    #[must_use]
    pub fn isolation_of(&self, name: &str) -> Option<Isolation> {
        self.entries.get(name).map(|entry| entry.isolation)
    }

    /// Returns the classification recorded for a tool file.
    #[must_use]
    pub fn file_isolation(&self, file: &Path) -> Option<Isolation> {
        self.files.get(file).copied()
    }

    /// Returns every tool name, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Iterates over entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Returns every scanned tool file with its classification.
    #[must_use]
    pub fn files(&self) -> Vec<(PathBuf, Isolation)> {
        self.files
            .iter()
            .map(|(path, isolation)| (path.clone(), *isolation))
            .collect()
    }

    /// Returns files whose metadata could not be read, with the reason.
    #[must_use]
    pub fn failures(&self) -> &[(PathBuf, String)] {
        &self.failures
    }

    /// Returns the number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no tools are catalogued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tools_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("net")).unwrap();
        fs::write(
            dir.path().join("greet.py"),
            "def hello(name, punctuation=\"!\"):\n    return name\n\ndef _helper():\n    pass\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("net").join("search.py"),
            "# /// script\n# dependencies = [\"httpx\"]\n# ///\npack = \"brave\"\n\nasync def web(query, count=5):\n    pass\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn module_id_uses_relative_dotted_path() {
        let dir = Path::new("/srv/tools");
        assert_eq!(module_id(dir, Path::new("/srv/tools/net/fetch.py")), "net.fetch");
        assert_eq!(module_id(dir, Path::new("/srv/tools/greet.py")), "greet");
        assert_eq!(module_id(dir, Path::new("/elsewhere/other.py")), "other");
    }

    #[test]
    fn discover_classifies_and_names_tools() {
        let dir = tools_dir();
        let catalog = ToolCatalog::discover(dir.path()).unwrap();

        assert_eq!(catalog.names(), vec!["brave.web", "greet.hello"]);

        let web = catalog.get("brave.web").unwrap();
        assert_eq!(web.isolation, Isolation::Worker);
        assert_eq!(web.info.module, "net.search");
        assert_eq!(web.info.function, "web");
        assert_eq!(web.info.signature, vec!["query", "count"]);

        let hello = catalog.get("greet.hello").unwrap();
        assert_eq!(hello.isolation, Isolation::Host);
        assert_eq!(hello.info.module, "greet");
        assert_eq!(hello.info.file.as_deref(), Some(dir.path().join("greet.py").as_path()));

        assert_eq!(catalog.files().len(), 2);
        assert!(catalog.failures().is_empty());
    }

    #[test]
    fn malformed_header_fails_open_and_is_reported() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.py");
        fs::write(&file, "# /// script\n# dependencies = [\"a\"]\ndef run():\n    pass\n").unwrap();

        let catalog = ToolCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.isolation_of("broken.run"), Some(Isolation::Host));
        assert_eq!(catalog.file_isolation(&file), Some(Isolation::Host));
        assert_eq!(catalog.failures().len(), 1);
    }

    #[test]
    fn rescan_picks_up_new_files_and_keeps_native_tools() {
        let dir = tools_dir();
        let mut catalog = ToolCatalog::discover(dir.path()).unwrap();
        catalog.register_host_tool(ToolInfo::new("builtin", "now").with_name("clock.now"));

        fs::write(dir.path().join("extra.py"), "def ping():\n    pass\n").unwrap();
        fs::remove_file(dir.path().join("greet.py")).unwrap();
        catalog.rescan().unwrap();

        assert_eq!(catalog.names(), vec!["brave.web", "clock.now", "extra.ping"]);
    }

    #[test]
    fn duplicate_names_keep_first_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.py"), "pack = \"jobs\"\n\ndef run():\n    pass\n").unwrap();
        fs::write(dir.path().join("b.py"), "pack = \"jobs\"\n\ndef run():\n    pass\n").unwrap();

        let catalog = ToolCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("jobs.run").unwrap().info.module, "a");
    }

    #[test]
    fn same_function_in_unpacked_files_does_not_collide() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("net")).unwrap();
        fs::write(dir.path().join("a.py"), "def run():\n    pass\n").unwrap();
        fs::write(dir.path().join("net").join("b.py"), "def run():\n    pass\n").unwrap();

        let catalog = ToolCatalog::discover(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["a.run", "net.b.run"]);
        assert_eq!(catalog.get("net.b.run").unwrap().info.module, "net.b");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = ToolCatalog::discover("/nonexistent/toolhost/catalog").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn empty_catalog() {
        let catalog = ToolCatalog::new();
        assert!(catalog.is_empty());
        assert_eq!(catalog.isolation_of("anything"), None);
        assert!(catalog.tools_dir().is_none());
    }
}
