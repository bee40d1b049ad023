//! Configuration lookup across the alternative and default directories

use super::document::ConfigDocument;
use crate::error::{BenchsuiteError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSON documents are tried before INI documents at the same path stem.
pub const JSON_EXTENSION: &str = "json";
pub const INI_EXTENSION: &str = "conf";

/// Kind of configurable entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigKind {
    Provider,
    Benchmark,
    Storage,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Provider => "provider",
            ConfigKind::Benchmark => "benchmark",
            ConfigKind::Storage => "storage",
        }
    }

    /// Subdirectory of a configuration directory holding documents of this kind.
    /// Storage documents live in the directory root.
    pub fn subdirectory(&self) -> Option<&'static str> {
        match self {
            ConfigKind::Provider => Some("providers"),
            ConfigKind::Benchmark => Some("benchmarks"),
            ConfigKind::Storage => None,
        }
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a resolved document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    File(PathBuf),
    Inline,
}

/// A named, decoded configuration document
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub kind: ConfigKind,
    pub name: String,
    pub origin: SourceOrigin,
    pub document: ConfigDocument,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            SourceOrigin::File(p) => Some(p),
            SourceOrigin::Inline => None,
        }
    }
}

/// Resolves logical names to configuration documents.
///
/// Lookup order for `<dir>/<kind>/<name>`: alternative directory (JSON, then
/// INI), then default directory (JSON, then INI). A `name` that is already a
/// path to an existing file is loaded directly.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    default_dir: PathBuf,
    alternative_dir: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(default_dir: impl Into<PathBuf>, alternative_dir: Option<PathBuf>) -> Self {
        let default_dir = default_dir.into();
        debug!("Using default configuration directory: {}", default_dir.display());
        if let Some(alt) = &alternative_dir {
            debug!("Using alternative configuration directory: {}", alt.display());
        }
        Self {
            default_dir,
            alternative_dir,
        }
    }

    pub fn default_dir(&self) -> &Path {
        &self.default_dir
    }

    pub fn alternative_dir(&self) -> Option<&Path> {
        self.alternative_dir.as_deref()
    }

    fn kind_dir(base: &Path, kind: ConfigKind) -> PathBuf {
        match kind.subdirectory() {
            Some(sub) => base.join(sub),
            None => base.to_path_buf(),
        }
    }

    fn search_dirs(&self) -> impl Iterator<Item = &Path> {
        self.alternative_dir
            .as_deref()
            .into_iter()
            .chain(std::iter::once(self.default_dir.as_path()))
    }

    /// Candidate files in lookup order.
    pub fn candidates(&self, kind: ConfigKind, name: &str) -> Vec<PathBuf> {
        let mut out = Vec::with_capacity(4);
        for dir in self.search_dirs() {
            let base = Self::kind_dir(dir, kind);
            out.push(base.join(format!("{}.{}", name, JSON_EXTENSION)));
            out.push(base.join(format!("{}.{}", name, INI_EXTENSION)));
        }
        out
    }

    /// Locate the document for `name` without decoding it.
    pub fn locate(&self, kind: ConfigKind, name: &str) -> Result<PathBuf> {
        let direct = Path::new(name);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        self.candidates(kind, name)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| {
                BenchsuiteError::configuration(
                    kind,
                    name,
                    format!("impossible to find {} configuration", kind),
                )
            })
    }

    pub fn resolve(&self, kind: ConfigKind, name: &str) -> Result<ConfigSource> {
        let path = self.locate(kind, name)?;
        debug!(kind = %kind, name, path = %path.display(), "Configuration resolved");
        Self::load_file(kind, name, &path)
    }

    /// Decode an in-process document (e.g. supplied through an environment variable).
    pub fn resolve_str(&self, kind: ConfigKind, text: &str) -> Result<ConfigSource> {
        let document = ConfigDocument::parse(text)
            .map_err(|e| BenchsuiteError::configuration(kind, "<inline>", e.to_string()))?;
        Ok(ConfigSource {
            kind,
            name: "<inline>".to_string(),
            origin: SourceOrigin::Inline,
            document,
        })
    }

    /// A value that names an existing file (or a resolvable logical name) is
    /// loaded from disk; anything else is decoded as an inline document.
    pub fn resolve_path_or_str(&self, kind: ConfigKind, value: &str) -> Result<ConfigSource> {
        match self.locate(kind, value) {
            Ok(path) => Self::load_file(kind, value, &path),
            Err(_) => self.resolve_str(kind, value),
        }
    }

    fn load_file(kind: ConfigKind, name: &str, path: &Path) -> Result<ConfigSource> {
        let text = std::fs::read_to_string(path)?;
        let document = ConfigDocument::parse(&text).map_err(|e| {
            BenchsuiteError::configuration(
                kind,
                name,
                format!("cannot decode {}: {}", path.display(), e),
            )
        })?;
        Ok(ConfigSource {
            kind,
            name: name.to_string(),
            origin: SourceOrigin::File(path.to_path_buf()),
            document,
        })
    }

    /// Every document of `kind`: alternative directory entries first, then the
    /// default directory. Same-named documents in both directories are both returned.
    pub fn list_all(&self, kind: ConfigKind) -> Result<Vec<ConfigSource>> {
        let mut out = Vec::new();

        for dir in self.search_dirs() {
            let base = Self::kind_dir(dir, kind);
            if !base.is_dir() {
                continue;
            }

            let mut files: Vec<PathBuf> = std::fs::read_dir(&base)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e == JSON_EXTENSION || e == INI_EXTENSION)
                        .unwrap_or(false)
                })
                .collect();
            files.sort();

            for path in files {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match Self::load_file(kind, name, &path) {
                    Ok(source) => out.push(source),
                    Err(e) => warn!("Skipping {} configuration {}: {}", kind, path.display(), e),
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolves_from_alternative_dir_only() {
        let default = TempDir::new().unwrap();
        let alt = TempDir::new().unwrap();
        write(alt.path(), "providers/filab.conf", "[provider]\nclass = p.X\n[vm]\n");

        let resolver = ConfigResolver::new(default.path(), Some(alt.path().to_path_buf()));
        let source = resolver.resolve(ConfigKind::Provider, "filab").unwrap();

        assert_eq!(source.name, "filab");
        assert_eq!(source.path(), Some(alt.path().join("providers/filab.conf").as_path()));
    }

    #[test]
    fn test_json_wins_over_ini_at_same_stem() {
        let default = TempDir::new().unwrap();
        write(default.path(), "benchmarks/filebench.conf", "[DEFAULT]\nclass = ini.Filebench\n");
        write(
            default.path(),
            "benchmarks/filebench.json",
            r#"{"DEFAULT": {"class": "json.Filebench"}}"#,
        );

        let resolver = ConfigResolver::new(default.path(), None);
        let source = resolver.resolve(ConfigKind::Benchmark, "filebench").unwrap();

        assert_eq!(source.document.get("DEFAULT", "class"), Some("json.Filebench"));
    }

    #[test]
    fn test_alternative_dir_wins_over_default_dir() {
        let default = TempDir::new().unwrap();
        let alt = TempDir::new().unwrap();
        write(default.path(), "benchmarks/ycsb.json", r#"{"DEFAULT": {"class": "default.Y"}}"#);
        write(alt.path(), "benchmarks/ycsb.conf", "[DEFAULT]\nclass = alt.Y\n");

        let resolver = ConfigResolver::new(default.path(), Some(alt.path().to_path_buf()));
        let source = resolver.resolve(ConfigKind::Benchmark, "ycsb").unwrap();

        assert_eq!(source.document.get("DEFAULT", "class"), Some("alt.Y"));
    }

    #[test]
    fn test_explicit_path_bypasses_search() {
        let default = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let file = write(elsewhere.path(), "my-provider.conf", "[provider]\nclass = p.X\n");

        let resolver = ConfigResolver::new(default.path(), None);
        let source = resolver
            .resolve(ConfigKind::Provider, file.to_str().unwrap())
            .unwrap();

        assert_eq!(source.path(), Some(file.as_path()));
    }

    #[test]
    fn test_missing_config_names_kind_and_name() {
        let default = TempDir::new().unwrap();
        let resolver = ConfigResolver::new(default.path(), None);

        let err = resolver.resolve(ConfigKind::Provider, "nowhere").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("provider"));
        assert!(msg.contains("nowhere"));
    }

    #[test]
    fn test_storage_lives_in_directory_root() {
        let default = TempDir::new().unwrap();
        write(default.path(), "storage.json", r#"{"storage": {"class": "s.File"}}"#);

        let resolver = ConfigResolver::new(default.path(), None);
        let source = resolver.resolve(ConfigKind::Storage, "storage").unwrap();
        assert_eq!(source.document.get("storage", "class"), Some("s.File"));
    }

    #[test]
    fn test_resolve_path_or_str_accepts_inline_text() {
        let default = TempDir::new().unwrap();
        let resolver = ConfigResolver::new(default.path(), None);

        let source = resolver
            .resolve_path_or_str(ConfigKind::Storage, "[storage]\nclass = s.Mongo\n")
            .unwrap();
        assert_eq!(source.origin, SourceOrigin::Inline);
        assert_eq!(source.document.get("storage", "class"), Some("s.Mongo"));
    }

    #[test]
    fn test_list_all_alternative_first_without_dedup() {
        let default = TempDir::new().unwrap();
        let alt = TempDir::new().unwrap();
        write(default.path(), "providers/amazon.conf", "[provider]\nclass = p.A\n");
        write(default.path(), "providers/filab.json", r#"{"provider": {"class": "p.F"}}"#);
        write(default.path(), "providers/README.md", "not a config");
        write(alt.path(), "providers/filab.conf", "[provider]\nclass = p.F2\n");

        let resolver = ConfigResolver::new(default.path(), Some(alt.path().to_path_buf()));
        let all = resolver.list_all(ConfigKind::Provider).unwrap();
        let names: Vec<_> = all.iter().map(|s| s.name.as_str()).collect();

        assert_eq!(names, vec!["filab", "amazon", "filab"]);
    }

    #[test]
    fn test_list_all_skips_undecodable_documents() {
        let default = TempDir::new().unwrap();
        write(default.path(), "benchmarks/broken.conf", "no header here\n");
        write(default.path(), "benchmarks/ok.conf", "[DEFAULT]\nclass = b.Ok\n");

        let resolver = ConfigResolver::new(default.path(), None);
        let all = resolver.list_all(ConfigKind::Benchmark).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "ok");
    }
}
