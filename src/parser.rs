use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, instrument, trace, warn};

use crate::blocks::{MemoryUsage, ModuleContribution, Region, Section};
use crate::error::{MapError, MapResult};
use crate::matchers::{self, ModuleLine, SectionLine};

/// Name ld is asked to write the map under (`-Map=map.txt`).
pub const MAP_FILE_BASE_NAME: &str = "map.txt";

/// Receives the parse result of one map file.
pub trait MemoryUsageVisitor {
    fn on_memory_usage_data_fetched(
        &mut self,
        regions: Vec<Region>,
        sections: Vec<Section>,
        modules: Vec<ModuleContribution>,
    );
}

impl MemoryUsageVisitor for MemoryUsage {
    fn on_memory_usage_data_fetched(
        &mut self,
        regions: Vec<Region>,
        sections: Vec<Section>,
        modules: Vec<ModuleContribution>,
    ) {
        *self = MemoryUsage {
            regions,
            sections,
            modules,
        };
    }
}

/// What to do with a module line seen before any allocated section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanModulePolicy {
    /// Drop the line and log a warning.
    #[default]
    Skip,
    /// Abort with [`MapError::OrphanModule`].
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Sections whose name starts with one of these are not allocated.
    pub excluded_prefixes: Vec<String>,
    pub orphan_modules: OrphanModulePolicy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            excluded_prefixes: vec![".debug".to_string(), ".comment".to_string()],
            orphan_modules: OrphanModulePolicy::default(),
        }
    }
}

impl ParseOptions {
    pub fn with_excluded_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.excluded_prefixes.push(prefix.into());
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanModulePolicy) -> Self {
        self.orphan_modules = policy;
        self
    }

    fn is_excluded(&self, section: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| section.starts_with(prefix.as_str()))
    }
}

/// Single pass state machine over the lines of a map file.
///
/// Regions and sections are kept in the order they are read. Module
/// contributions are keyed by `(file description, section name)` and come out
/// in the order each key was first seen.
pub struct MapParser<'a> {
    options: &'a ParseOptions,
    map_dir: PathBuf,
    line: usize,
    regions: Vec<Region>,
    sections: Vec<Section>,
    modules: IndexMap<(String, String), ModuleContribution>,
}

impl<'a> MapParser<'a> {
    pub fn new(map_dir: impl Into<PathBuf>, options: &'a ParseOptions) -> Self {
        Self {
            options,
            map_dir: map_dir.into(),
            line: 0,
            regions: Vec::new(),
            sections: Vec::new(),
            modules: IndexMap::new(),
        }
    }

    pub fn process_line(&mut self, line: &str) -> MapResult<()> {
        self.line += 1;

        if let Some(region) = matchers::match_region(line) {
            let region = Region {
                name: region.name.to_string(),
                origin: matchers::parse_hex(region.origin, self.line)?,
                length: matchers::parse_hex(region.length, self.line)?,
                access: region.access.to_string(),
            };
            trace!(line = self.line, %region, "region");
            self.regions.push(region);
            return Ok(());
        }

        let section = match matchers::match_section(line) {
            Some(section) => self.allocated_section(section)?,
            None => None,
        };
        if let Some(section) = section {
            trace!(line = self.line, %section, region = %section.region_name, "section");
            self.sections.push(section);
        } else if let Some(module) = matchers::match_module(line) {
            self.add_module(module)?;
        }
        Ok(())
    }

    /// First region, in parse order, holding `addr`.
    fn region_name_from_address(&self, addr: u64) -> &str {
        self.regions
            .iter()
            .find(|region| region.contains(addr))
            .map_or("", |region| region.name.as_str())
    }

    fn allocated_section(&self, section: SectionLine<'_>) -> MapResult<Option<Section>> {
        let origin = matchers::parse_hex(section.origin, self.line)?;
        let length = matchers::parse_hex(section.length, self.line)?;

        if self.options.is_excluded(section.name) || length == 0 {
            trace!(line = self.line, name = section.name, length, "not allocated");
            return Ok(None);
        }

        Ok(Some(Section {
            name: section.name.to_string(),
            origin,
            length,
            region_name: self.region_name_from_address(origin).to_string(),
        }))
    }

    fn add_module(&mut self, module: ModuleLine<'_>) -> MapResult<()> {
        let Some(section) = self.sections.last() else {
            return match self.options.orphan_modules {
                OrphanModulePolicy::Skip => {
                    warn!(
                        line = self.line,
                        files = module.files,
                        "module outside of any section"
                    );
                    Ok(())
                }
                OrphanModulePolicy::Fail => Err(MapError::OrphanModule { line: self.line }),
            };
        };

        let origin = matchers::parse_hex(module.origin, self.line)?;
        let size = matchers::parse_hex(module.size, self.line)?;

        let key = (module.files.to_string(), section.name.clone());
        if let Some(existing) = self.modules.get_mut(&key) {
            existing.size = existing
                .size
                .checked_add(size)
                .ok_or_else(|| MapError::SizeOverflow {
                    line: self.line,
                    files: module.files.to_string(),
                })?;
            trace!(
                line = self.line,
                files = module.files,
                total = existing.size,
                "merged module"
            );
            return Ok(());
        }

        let (object_file, library_file) = matchers::split_files(module.files, &self.map_dir);
        let contribution = ModuleContribution {
            object_file,
            library_file,
            origin,
            size,
            region_name: section.region_name.clone(),
            section_name: section.name.clone(),
        };
        trace!(
            line = self.line,
            module = %contribution,
            section = %contribution.section_name,
            "module"
        );
        self.modules.insert(key, contribution);
        Ok(())
    }

    pub fn finish(self) -> MemoryUsage {
        let usage = MemoryUsage {
            regions: self.regions,
            sections: self.sections,
            modules: self.modules.into_values().collect(),
        };
        debug!(
            lines = self.line,
            regions = usage.regions.len(),
            sections = usage.sections.len(),
            modules = usage.modules.len(),
            "parsed memory map"
        );
        usage
    }
}

/// Parses a whole map read from `reader`. `map_dir` qualifies bare object
/// file names.
///
/// Bytes that are not UTF-8 are replaced, so stray Latin-1 text in comments
/// or paths never stops the parse.
pub fn process_map<R>(
    reader: &mut R,
    map_dir: &Path,
    options: &ParseOptions,
) -> MapResult<MemoryUsage>
where
    R: BufRead + ?Sized,
{
    let mut parser = MapParser::new(map_dir, options);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let mut line = buf.as_slice();
        if let Some(rest) = line.strip_suffix(b"\n") {
            line = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        parser.process_line(&String::from_utf8_lossy(line))?;
    }
    Ok(parser.finish())
}

/// Parses the map file at `path` and hands the result to `visitor`.
///
/// The visitor is called once on success and never on error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn parse_map_file(
    path: &Path,
    options: &ParseOptions,
    visitor: &mut dyn MemoryUsageVisitor,
) -> MapResult<()> {
    let file = File::open(path).map_err(|source| MapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let map_dir = path.parent().unwrap_or_else(|| Path::new(""));
    let usage = process_map(&mut BufReader::new(file), map_dir, options)?;
    visitor.on_memory_usage_data_fetched(usage.regions, usage.sections, usage.modules);
    Ok(())
}

/// A directory stands for the `map.txt` inside it.
pub fn resolve_map_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MAP_FILE_BASE_NAME)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
static INIT: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn configure_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    INIT.call_once(|| {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default tracing subscriber failed");
    });
}
