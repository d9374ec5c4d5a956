use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

use crate::error::{MapError, MapResult};
use crate::parser::{parse_map_file, MemoryUsageVisitor, ParseOptions};

/// Something able to produce memory usage data for the current build.
pub trait MemoryUsageProvider {
    fn is_enabled(&self, cache: &mut SupportCache) -> bool;
    fn fetch(&self, visitor: &mut dyn MemoryUsageVisitor) -> MapResult<()>;
}

/// Settings a provider is built from.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub target: String,
    pub build_mode: String,
    pub map_file: PathBuf,
    pub options: ParseOptions,
}

/// Memoized answers of the `-map` capability probe, per `(target, build mode)`.
#[derive(Debug, Default)]
pub struct SupportCache {
    entries: HashMap<(String, String), bool>,
}

impl SupportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `<target>-ld` understands `-map`.
    ///
    /// `help` returns the output of `<exe> --help`; it is only called on a
    /// cache miss and a failure counts as unsupported.
    pub fn map_file_is_supported<F>(&mut self, target: &str, build_mode: &str, help: F) -> bool
    where
        F: FnOnce(&str) -> io::Result<String>,
    {
        if target.is_empty() || target == "native" || build_mode != "default" {
            return false;
        }

        let key = (target.to_string(), build_mode.to_string());
        if let Some(supported) = self.entries.get(&key) {
            return *supported;
        }

        let ld_exe = format!("{target}-ld");
        let supported = match help(&ld_exe) {
            Ok(output) => output.contains("-map"),
            Err(e) => {
                debug!(%ld_exe, error = %e, "linker probe failed");
                false
            }
        };
        debug!(%ld_exe, supported, "probed linker");
        self.entries.insert(key, supported);
        supported
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs `<exe> --help` and returns everything it printed.
pub fn linker_help(exe: &str) -> io::Result<String> {
    let output = Command::new(exe).arg("--help").output()?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// GNU ld, reading the map it wrote with `-Map`.
pub struct LdProvider {
    config: ProviderConfig,
}

impl LdProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl MemoryUsageProvider for LdProvider {
    fn is_enabled(&self, cache: &mut SupportCache) -> bool {
        cache.map_file_is_supported(&self.config.target, &self.config.build_mode, linker_help)
    }

    fn fetch(&self, visitor: &mut dyn MemoryUsageVisitor) -> MapResult<()> {
        parse_map_file(&self.config.map_file, &self.config.options, visitor)
    }
}

fn ld_provider(config: &ProviderConfig) -> Box<dyn MemoryUsageProvider> {
    Box::new(LdProvider::new(config))
}

pub type ProviderFactory = fn(&ProviderConfig) -> Box<dyn MemoryUsageProvider>;

/// Providers by name, filled once at start-up.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("LD", ld_provider);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> MapResult<Box<dyn MemoryUsageProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MapError::UnknownProvider {
                name: name.to_string(),
                known: self.names().join(", "),
            })?;
        Ok(factory(config))
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
