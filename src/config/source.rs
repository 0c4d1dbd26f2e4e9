//! String-keyed configuration sources.
//!
//! Keys are dotted paths such as `FunctionLogger.IsActive` and are matched
//! case-insensitively by every source.

use std::collections::HashMap;

/// A read-only lookup of configuration values by key.
pub trait ConfigSource: Send + Sync {
    /// Look up a raw value. `None` means the key is not set.
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory source, mostly for hosts that already hold their settings.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    values: HashMap<String, String>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MapSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (k, v) in iter {
            source.insert(k.as_ref(), v);
        }
        source
    }
}

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(&key.to_ascii_lowercase()).cloned()
    }
}

/// Process environment. `A.B` is read from `A__B`, then from `A__B` upper-cased.
#[derive(Debug, Clone, Default)]
pub struct EnvSource;

impl EnvSource {
    pub fn new() -> Self {
        Self
    }

    fn var_name(key: &str) -> String {
        key.replace('.', "__")
    }
}

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let name = Self::var_name(key);
        std::env::var(&name)
            .or_else(|_| std::env::var(name.to_ascii_uppercase()))
            .ok()
    }
}

/// A TOML document flattened into dotted keys.
///
/// ```toml
/// [FunctionLogger]
/// IsActive = true
/// ```
/// yields `FunctionLogger.IsActive = "true"`.
#[derive(Debug, Clone, Default)]
pub struct TomlSource {
    values: MapSource,
}

impl TomlSource {
    pub fn from_table(table: &toml::Table) -> Self {
        let mut values = MapSource::new();
        flatten(&mut values, "", table);
        Self { values }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = content.parse()?;
        Ok(Self::from_table(&table))
    }
}

fn flatten(out: &mut MapSource, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten(out, &path, inner),
            toml::Value::String(s) => out.insert(&path, s.clone()),
            // Arrays have no meaning for the recognized keys.
            toml::Value::Array(_) => {}
            other => out.insert(&path, other.to_string()),
        }
    }
}

impl ConfigSource for TomlSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key)
    }
}

/// Stack of sources; later layers override earlier ones.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn ConfigSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, source: impl ConfigSource + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl ConfigSource for LayeredSource {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().rev().find_map(|layer| layer.get(key))
    }
}
