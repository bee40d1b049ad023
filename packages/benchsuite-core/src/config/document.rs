//! Canonical configuration document
//!
//! Provider, benchmark and storage definitions are sectioned key/value
//! documents. They may be written as INI text (configparser conventions) or as
//! a JSON object of objects; both decode into the same [`ConfigDocument`].

use crate::error::{BenchsuiteError, Result};
use serde::{Deserialize, Serialize};

/// Name of the section whose entries are inherited by every other section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// One named section of key/value pairs, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSection {
    pub name: String,
    entries: Vec<(String, String)>,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Keys are case-insensitive; a repeated key replaces the earlier value.
    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().trim().to_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Ordered sections plus the reserved `DEFAULT` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    defaults: ConfigSection,
    sections: Vec<ConfigSection>,
}

impl ConfigDocument {
    pub fn new() -> Self {
        Self {
            defaults: ConfigSection::new(DEFAULT_SECTION),
            sections: Vec::new(),
        }
    }

    /// Decode `text` as JSON, falling back to INI when it is not JSON at all.
    ///
    /// A syntactically valid JSON document with the wrong shape is an error and
    /// is not re-read as INI.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => Self::from_json_value(value),
            Err(_) => Self::from_ini(text),
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(top) = value else {
            return Err(BenchsuiteError::parse(
                "JSON configuration must be an object of sections",
            ));
        };

        let mut doc = Self::new();
        for (section_name, body) in top {
            let serde_json::Value::Object(entries) = body else {
                return Err(BenchsuiteError::parse(format!(
                    "section '{}' must be a JSON object",
                    section_name
                )));
            };

            let mut section = ConfigSection::new(section_name.clone());
            for (key, value) in entries {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                        return Err(BenchsuiteError::parse(format!(
                            "value of '{}' in section '{}' must be a scalar",
                            key, section_name
                        )))
                    }
                };
                section.set(&key, value);
            }
            doc.insert_section(section)?;
        }
        Ok(doc)
    }

    pub fn from_ini(text: &str) -> Result<Self> {
        let mut doc = Self::new();
        let mut current: Option<ConfigSection> = None;
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let lineno = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // Indented line continues the previous value
            if raw.starts_with(char::is_whitespace) {
                if let (Some(section), Some(key)) = (current.as_mut(), last_key.as_ref()) {
                    let joined = match section.get(key) {
                        Some(prev) if !prev.is_empty() => format!("{}\n{}", prev, trimmed),
                        _ => trimmed.to_string(),
                    };
                    section.set(key, joined);
                    continue;
                }
            }

            // Text after the last `]` is ignored
            if trimmed.starts_with('[') {
                let name = match trimmed.rfind(']') {
                    Some(end) if end > 1 => trimmed[1..end].trim(),
                    _ => {
                        return Err(BenchsuiteError::parse(format!(
                            "line {}: malformed section header",
                            lineno
                        )))
                    }
                };
                if let Some(done) = current.take() {
                    doc.insert_section(done)?;
                }
                if name == DEFAULT_SECTION {
                    // reopened, so keys repeated across DEFAULT blocks are caught
                    current = Some(doc.defaults.clone());
                } else if doc.section(name).is_some() {
                    return Err(BenchsuiteError::parse(format!(
                        "line {}: duplicate section '{}'",
                        lineno, name
                    )));
                } else {
                    current = Some(ConfigSection::new(name));
                }
                last_key = None;
                continue;
            }

            let section = current.as_mut().ok_or_else(|| {
                BenchsuiteError::parse(format!(
                    "line {}: entry before the first section header",
                    lineno
                ))
            })?;

            let delim = trimmed.find(['=', ':']).ok_or_else(|| {
                BenchsuiteError::parse(format!("line {}: expected 'key = value'", lineno))
            })?;
            let key = trimmed[..delim].trim().to_lowercase();
            if key.is_empty() {
                return Err(BenchsuiteError::parse(format!("line {}: empty key", lineno)));
            }
            if section.contains_key(&key) {
                return Err(BenchsuiteError::parse(format!(
                    "line {}: duplicate key '{}' in section '{}'",
                    lineno, key, section.name
                )));
            }
            section.set(&key, trimmed[delim + 1..].trim());
            last_key = Some(key);
        }

        if let Some(done) = current.take() {
            doc.insert_section(done)?;
        }
        Ok(doc)
    }

    /// Add a section. `DEFAULT` entries merge into the reserved section.
    pub fn insert_section(&mut self, section: ConfigSection) -> Result<()> {
        if section.name == DEFAULT_SECTION {
            for (k, v) in section.entries {
                self.defaults.set(k, v);
            }
            return Ok(());
        }
        if self.sections.iter().any(|s| s.name == section.name) {
            return Err(BenchsuiteError::parse(format!(
                "duplicate section '{}'",
                section.name
            )));
        }
        self.sections.push(section);
        Ok(())
    }

    pub fn defaults(&self) -> &ConfigSection {
        &self.defaults
    }

    pub fn section(&self, name: &str) -> Option<&ConfigSection> {
        if name == DEFAULT_SECTION {
            return Some(&self.defaults);
        }
        self.sections.iter().find(|s| s.name == name)
    }

    /// All sections whose name matches `name` ignoring ASCII case.
    pub fn sections_named(&self, name: &str) -> Vec<&ConfigSection> {
        self.sections
            .iter()
            .filter(|s| s.name.eq_ignore_ascii_case(name))
            .collect()
    }

    /// Non-reserved section names, in document order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|s| s.name.as_str())
    }

    /// Look up `key` in `section`, falling back to `DEFAULT`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|s| s.get(key))
            .or_else(|| self.defaults.get(key))
    }

    pub fn require(&self, section: &str, key: &str) -> Result<&str> {
        self.get(section, key).ok_or_else(|| {
            BenchsuiteError::parse(format!(
                "missing key '{}' in section '{}'",
                key, section
            ))
        })
    }

    /// Effective key/value view of a section with `DEFAULT` entries merged in.
    pub fn merged(&self, section: &str) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .defaults
            .entries()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(s) = self.section(section) {
            for (k, v) in s.entries() {
                match out.iter_mut().find(|(ek, _)| ek == k) {
                    Some(entry) => entry.1 = v.to_string(),
                    None => out.push((k.to_string(), v.to_string())),
                }
            }
        }
        out
    }
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}
