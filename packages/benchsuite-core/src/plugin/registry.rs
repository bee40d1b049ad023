//! Plugin registry and binder
//!
//! The registry maps type references to factories and is populated once at
//! startup by whatever plugins the embedding application links in. The
//! binder reads the type reference out of a configuration document, picks
//! the variant section and calls the registered factory.

use super::{
    Benchmark, BenchmarkPlugin, Provider, ProviderPlugin, StorageBackend, StoragePlugin,
};
use crate::config::{ConfigDocument, ConfigKind, ConfigSource, DEFAULT_SECTION};
use crate::error::{BenchsuiteError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Key holding the type reference in the type-reference section
pub const CLASS_KEY: &str = "class";
pub const PROVIDER_SECTION: &str = "provider";
pub const STORAGE_SECTION: &str = "storage";

type ProviderLoadFn = fn(&ConfigDocument, &str) -> Result<Box<dyn Provider>>;
type ProviderRestoreFn = fn(serde_json::Value) -> Result<Box<dyn Provider>>;
type BenchmarkLoadFn = fn(&ConfigDocument, &str, &str) -> Result<Box<dyn Benchmark>>;
type BenchmarkRestoreFn = fn(serde_json::Value) -> Result<Box<dyn Benchmark>>;
type StorageLoadFn = fn(&ConfigDocument, Option<&str>) -> Result<Box<dyn StorageBackend>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCapability {
    Provider,
    Benchmark,
    Storage,
}

impl PluginCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCapability::Provider => "provider",
            PluginCapability::Benchmark => "benchmark",
            PluginCapability::Storage => "storage",
        }
    }
}

impl std::fmt::Display for PluginCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy)]
enum PluginEntry {
    Provider {
        load: ProviderLoadFn,
        restore: ProviderRestoreFn,
    },
    Benchmark {
        load: BenchmarkLoadFn,
        restore: BenchmarkRestoreFn,
    },
    Storage {
        load: StorageLoadFn,
    },
}

impl PluginEntry {
    fn capability(&self) -> PluginCapability {
        match self {
            PluginEntry::Provider { .. } => PluginCapability::Provider,
            PluginEntry::Benchmark { .. } => PluginCapability::Benchmark,
            PluginEntry::Storage { .. } => PluginCapability::Storage,
        }
    }
}

fn load_provider<P: ProviderPlugin>(config: &ConfigDocument, variant: &str) -> Result<Box<dyn Provider>> {
    Ok(Box::new(P::load_from_config(config, variant)?))
}

fn restore_provider<P: ProviderPlugin>(state: serde_json::Value) -> Result<Box<dyn Provider>> {
    Ok(Box::new(P::restore(state)?))
}

fn load_benchmark<B: BenchmarkPlugin>(
    config: &ConfigDocument,
    tool: &str,
    workload: &str,
) -> Result<Box<dyn Benchmark>> {
    Ok(Box::new(B::load_from_config(config, tool, workload)?))
}

fn restore_benchmark<B: BenchmarkPlugin>(state: serde_json::Value) -> Result<Box<dyn Benchmark>> {
    Ok(Box::new(B::restore(state)?))
}

fn load_storage<S: StoragePlugin>(
    config: &ConfigDocument,
    variant: Option<&str>,
) -> Result<Box<dyn StorageBackend>> {
    Ok(Box::new(S::load_from_config(config, variant)?))
}

/// Registry of linked-in plugins, keyed by type reference
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register_provider<P: ProviderPlugin>(&mut self, type_ref: impl Into<String>) {
        self.entries.insert(
            type_ref.into(),
            PluginEntry::Provider {
                load: load_provider::<P>,
                restore: restore_provider::<P>,
            },
        );
    }

    pub fn register_benchmark<B: BenchmarkPlugin>(&mut self, type_ref: impl Into<String>) {
        self.entries.insert(
            type_ref.into(),
            PluginEntry::Benchmark {
                load: load_benchmark::<B>,
                restore: restore_benchmark::<B>,
            },
        );
    }

    pub fn register_storage<S: StoragePlugin>(&mut self, type_ref: impl Into<String>) {
        self.entries.insert(
            type_ref.into(),
            PluginEntry::Storage {
                load: load_storage::<S>,
            },
        );
    }

    pub fn capability(&self, type_ref: &str) -> Option<PluginCapability> {
        self.entries.get(type_ref).map(PluginEntry::capability)
    }

    /// Registered type references of one capability, sorted
    pub fn type_refs(&self, capability: PluginCapability) -> Vec<&str> {
        let mut refs: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, e)| e.capability() == capability)
            .map(|(k, _)| k.as_str())
            .collect();
        refs.sort_unstable();
        refs
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, type_ref: &str, expected: PluginCapability) -> Result<PluginEntry> {
        let Some((module, type_name)) = type_ref.rsplit_once('.') else {
            return Err(BenchsuiteError::PluginNotFound {
                type_ref: type_ref.to_string(),
                reason: "expected <module-path>.<TypeName>".to_string(),
            });
        };
        if module.is_empty() || type_name.is_empty() {
            return Err(BenchsuiteError::PluginNotFound {
                type_ref: type_ref.to_string(),
                reason: "expected <module-path>.<TypeName>".to_string(),
            });
        }

        let Some(entry) = self.entries.get(type_ref) else {
            let module_known = self
                .entries
                .keys()
                .any(|k| k.rsplit_once('.').map(|(m, _)| m) == Some(module));
            let reason = if module_known {
                format!("type '{}' not found in module '{}'", type_name, module)
            } else {
                format!("module '{}' is not registered", module)
            };
            return Err(BenchsuiteError::PluginNotFound {
                type_ref: type_ref.to_string(),
                reason,
            });
        };

        if entry.capability() != expected {
            return Err(BenchsuiteError::PluginContractViolation {
                type_ref: type_ref.to_string(),
                expected: expected.to_string(),
                found: entry.capability().to_string(),
            });
        }
        Ok(*entry)
    }

    pub fn load_provider(
        &self,
        type_ref: &str,
        config: &ConfigDocument,
        variant: &str,
    ) -> Result<Box<dyn Provider>> {
        match self.lookup(type_ref, PluginCapability::Provider)? {
            PluginEntry::Provider { load, .. } => load(config, variant),
            other => Err(contract_violation(type_ref, PluginCapability::Provider, &other)),
        }
    }

    pub fn load_benchmark(
        &self,
        type_ref: &str,
        config: &ConfigDocument,
        tool: &str,
        workload: &str,
    ) -> Result<Box<dyn Benchmark>> {
        match self.lookup(type_ref, PluginCapability::Benchmark)? {
            PluginEntry::Benchmark { load, .. } => load(config, tool, workload),
            other => Err(contract_violation(type_ref, PluginCapability::Benchmark, &other)),
        }
    }

    pub fn load_storage(
        &self,
        type_ref: &str,
        config: &ConfigDocument,
        variant: Option<&str>,
    ) -> Result<Box<dyn StorageBackend>> {
        match self.lookup(type_ref, PluginCapability::Storage)? {
            PluginEntry::Storage { load } => load(config, variant),
            other => Err(contract_violation(type_ref, PluginCapability::Storage, &other)),
        }
    }

    pub fn restore_provider(&self, record: &PluginRecord) -> Result<Box<dyn Provider>> {
        match self.lookup(&record.type_ref, PluginCapability::Provider)? {
            PluginEntry::Provider { restore, .. } => restore(record.state()?),
            other => Err(contract_violation(&record.type_ref, PluginCapability::Provider, &other)),
        }
    }

    pub fn restore_benchmark(&self, record: &PluginRecord) -> Result<Box<dyn Benchmark>> {
        match self.lookup(&record.type_ref, PluginCapability::Benchmark)? {
            PluginEntry::Benchmark { restore, .. } => restore(record.state()?),
            other => Err(contract_violation(
                &record.type_ref,
                PluginCapability::Benchmark,
                &other,
            )),
        }
    }
}

fn contract_violation(
    type_ref: &str,
    expected: PluginCapability,
    found: &PluginEntry,
) -> BenchsuiteError {
    BenchsuiteError::PluginContractViolation {
        type_ref: type_ref.to_string(),
        expected: expected.to_string(),
        found: found.capability().to_string(),
    }
}

/// Persistable form of a bound plugin: its type reference and its own state.
///
/// The state is kept as JSON text so the enclosing store can use a
/// non-self-describing binary encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub type_ref: String,
    state: String,
}

impl PluginRecord {
    pub fn new(type_ref: impl Into<String>, state: &serde_json::Value) -> Result<Self> {
        Ok(Self {
            type_ref: type_ref.into(),
            state: serde_json::to_string(state)?,
        })
    }

    pub fn state(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.state)?)
    }
}

/// A live plugin instance together with the type reference it was bound from
#[derive(Debug)]
pub struct Bound<T: ?Sized> {
    pub type_ref: String,
    pub instance: Box<T>,
}

impl Bound<dyn Provider> {
    pub fn record(&self) -> Result<PluginRecord> {
        PluginRecord::new(self.type_ref.clone(), &self.instance.save_state()?)
    }
}

impl Bound<dyn Benchmark> {
    pub fn record(&self) -> Result<PluginRecord> {
        PluginRecord::new(self.type_ref.clone(), &self.instance.save_state()?)
    }
}

/// Turns configuration sources into live plugin instances
#[derive(Clone)]
pub struct PluginBinder {
    registry: Arc<PluginRegistry>,
}

impl PluginBinder {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn bind_provider(
        &self,
        source: &ConfigSource,
        variant: Option<&str>,
    ) -> Result<Bound<dyn Provider>> {
        let (section, type_ref) = type_reference(source, PROVIDER_SECTION)?;
        let variant = select_variant(&source.document, Some(section.as_str()), variant)
            .map_err(|e| with_source_context(e, source))?
            .ok_or_else(|| {
                BenchsuiteError::configuration(
                    source.kind,
                    &source.name,
                    "no service type section defined",
                )
            })?;

        debug!(type_ref = %type_ref, variant = %variant, "Binding provider");
        let instance = self
            .registry
            .load_provider(&type_ref, &source.document, &variant)?;
        Ok(Bound { type_ref, instance })
    }

    pub fn bind_benchmark(
        &self,
        source: &ConfigSource,
        workload: Option<&str>,
    ) -> Result<Bound<dyn Benchmark>> {
        let type_ref = source
            .document
            .defaults()
            .get(CLASS_KEY)
            .map(str::to_string)
            .ok_or_else(|| {
                BenchsuiteError::configuration(
                    source.kind,
                    &source.name,
                    format!("missing '{}' in [{}]", CLASS_KEY, DEFAULT_SECTION),
                )
            })?;
        let workload = select_variant(&source.document, None, workload)
            .map_err(|e| with_source_context(e, source))?
            .ok_or_else(|| {
                BenchsuiteError::configuration(source.kind, &source.name, "no workload defined")
            })?;
        let tool = tool_name(source);

        debug!(type_ref = %type_ref, tool = %tool, workload = %workload, "Binding benchmark");
        let instance = self
            .registry
            .load_benchmark(&type_ref, &source.document, &tool, &workload)?;
        Ok(Bound { type_ref, instance })
    }

    pub fn bind_storage(
        &self,
        source: &ConfigSource,
        variant: Option<&str>,
    ) -> Result<Bound<dyn StorageBackend>> {
        let (section, type_ref) = type_reference(source, STORAGE_SECTION)?;
        let variant = select_variant(&source.document, Some(section.as_str()), variant)
            .map_err(|e| with_source_context(e, source))?;

        debug!(type_ref = %type_ref, "Binding storage backend");
        let instance = self
            .registry
            .load_storage(&type_ref, &source.document, variant.as_deref())?;
        Ok(Bound { type_ref, instance })
    }
}

/// Find the single type-reference section and its `class` value.
fn type_reference(source: &ConfigSource, section_name: &str) -> Result<(String, String)> {
    let sections = source.document.sections_named(section_name);
    let section = match sections.as_slice() {
        [one] => *one,
        [] => {
            return Err(BenchsuiteError::configuration(
                source.kind,
                &source.name,
                format!("missing [{}] section", section_name),
            ))
        }
        _ => {
            return Err(BenchsuiteError::configuration(
                source.kind,
                &source.name,
                format!("more than one [{}] section", section_name),
            ))
        }
    };

    let type_ref = section.get(CLASS_KEY).ok_or_else(|| {
        BenchsuiteError::configuration(
            source.kind,
            &source.name,
            format!("missing '{}' in [{}]", CLASS_KEY, section.name),
        )
    })?;
    Ok((section.name.clone(), type_ref.to_string()))
}

/// Pick the variant section, identically for every kind of document.
///
/// A pinned variant must exist. Otherwise a single candidate section is used
/// implicitly and several candidates are ambiguous.
pub fn select_variant(
    document: &ConfigDocument,
    type_section: Option<&str>,
    requested: Option<&str>,
) -> Result<Option<String>> {
    let candidates: Vec<&str> = document
        .section_names()
        .filter(|name| !type_section.is_some_and(|t| name.eq_ignore_ascii_case(t)))
        .collect();

    if let Some(requested) = requested {
        return if candidates.contains(&requested) {
            Ok(Some(requested.to_string()))
        } else {
            Err(BenchsuiteError::parse(format!(
                "variant '{}' is not defined (available: {})",
                requested,
                candidates.join(", ")
            )))
        };
    }

    match candidates.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(one.to_string())),
        many => Err(BenchsuiteError::AmbiguousVariant {
            candidates: many.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

fn with_source_context(err: BenchsuiteError, source: &ConfigSource) -> BenchsuiteError {
    match err {
        BenchsuiteError::ConfigParse(message) => {
            BenchsuiteError::configuration(source.kind, &source.name, message)
        }
        other => other,
    }
}

fn tool_name(source: &ConfigSource) -> String {
    debug_assert_eq!(source.kind, ConfigKind::Benchmark);
    match source.path() {
        Some(path) => path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&source.name)
            .to_string(),
        None => source.name.clone(),
    }
}
