use std::fmt;
use std::path::PathBuf;

/// A named memory range `[origin, origin + length)` from the linker script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub origin: u64,
    pub length: u64,
    /// Access flags as printed in the map (`xrw`, `rw`, ...), empty if absent.
    pub access: String,
}

impl Region {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.origin && addr - self.origin < self.length
    }

    pub fn end(&self) -> u64 {
        self.origin.saturating_add(self.length)
    }
}

/// An allocated output section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub origin: u64,
    pub length: u64,
    /// Name of the region holding `origin`, empty if none does.
    pub region_name: String,
}

/// Memory taken by one object file inside one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleContribution {
    pub object_file: PathBuf,
    pub library_file: Option<PathBuf>,
    pub origin: u64,
    pub size: u64,
    pub region_name: String,
    pub section_name: String,
}

/// Everything recovered from one map file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub regions: Vec<Region>,
    pub sections: Vec<Section>,
    pub modules: Vec<ModuleContribution>,
}

impl MemoryUsage {
    /// Bytes of allocated sections placed in `region`.
    pub fn used_in(&self, region: &str) -> u64 {
        self.sections
            .iter()
            .filter(|s| s.region_name == region)
            .map(|s| s.length)
            .sum()
    }

    pub fn sections_in<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.sections.iter().filter(move |s| s.region_name == region)
    }

    pub fn modules_in<'a>(
        &'a self,
        section: &'a str,
    ) -> impl Iterator<Item = &'a ModuleContribution> + 'a {
        self.modules.iter().filter(move |m| m.section_name == section)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#010x}+{:#x}", self.name, self.origin, self.length)?;
        if !self.access.is_empty() {
            write!(f, " {}", self.access)?;
        }
        Ok(())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:#010x}+{:#x}", self.name, self.origin, self.length)
    }
}

impl fmt::Display for ModuleContribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library_file {
            Some(lib) => write!(f, "{}({})", lib.display(), self.object_file.display()),
            None => write!(f, "{}", self.object_file.display()),
        }
    }
}
