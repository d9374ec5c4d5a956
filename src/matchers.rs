//! Line classification for GNU ld style map files.
//!
//! Each matcher looks at a single line and either recognises its shape or
//! returns `None`. Numbers are handed back as the raw `0x...` text so the
//! caller can attach a line number to conversion failures.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MapError, MapResult};

macro_rules! static_regex {
    ($name:ident, $str:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($str).unwrap());
    };
}

static_regex!(
    REGION,
    r"^(?P<name>\w+)\s+(?P<origin>0x[0-9a-f]+)\s+(?P<length>0x[0-9a-f]+)(?:\s+(?P<access>x?r?w?))?"
);
static_regex!(
    SECTION,
    r"^(?P<name>[\w.]+)\s+(?P<origin>0x[0-9a-f]+)\s+(?P<length>0x[0-9a-f]+)"
);
static_regex!(
    MODULE,
    r"^\s+(?:[\w.]+\s+)?(?P<origin>0x[0-9a-f]+)\s+(?P<size>0x[0-9a-f]+) (?P<files>.+\.o\)?)"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLine<'a> {
    pub name: &'a str,
    pub origin: &'a str,
    pub length: &'a str,
    pub access: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLine<'a> {
    pub name: &'a str,
    pub origin: &'a str,
    pub length: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleLine<'a> {
    pub origin: &'a str,
    pub size: &'a str,
    /// Raw file description, e.g. `foo.o` or `libx.a(bar.o)`.
    pub files: &'a str,
}

pub fn match_region(line: &str) -> Option<RegionLine<'_>> {
    let caps = REGION.captures(line)?;
    Some(RegionLine {
        name: caps.name("name")?.as_str(),
        origin: caps.name("origin")?.as_str(),
        length: caps.name("length")?.as_str(),
        access: caps.name("access").map_or("", |m| m.as_str()),
    })
}

pub fn match_section(line: &str) -> Option<SectionLine<'_>> {
    let caps = SECTION.captures(line)?;
    Some(SectionLine {
        name: caps.name("name")?.as_str(),
        origin: caps.name("origin")?.as_str(),
        length: caps.name("length")?.as_str(),
    })
}

pub fn match_module(line: &str) -> Option<ModuleLine<'_>> {
    let caps = MODULE.captures(line)?;
    Some(ModuleLine {
        origin: caps.name("origin")?.as_str(),
        size: caps.name("size")?.as_str(),
        files: caps.name("files")?.as_str(),
    })
}

/// Converts a `0x`-prefixed hex field matched on line `line` (1-based).
pub fn parse_hex(text: &str, line: usize) -> MapResult<u64> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|source| MapError::InvalidNumber {
        line,
        text: text.to_string(),
        source,
    })
}

/// Splits a file description into `(object file, library)`.
///
/// `libx.a(bar.o)` names member `bar.o` of archive `libx.a`. A bare object
/// path without any directory is taken to live next to the map file.
pub fn split_files(files: &str, map_dir: &Path) -> (PathBuf, Option<PathBuf>) {
    let parts: Vec<&str> = files.split(['(', ')']).collect();
    let (object, library) = match parts.as_slice() {
        [object] => (*object, None),
        [library, object, ..] => (*object, Some(PathBuf::from(*library))),
        [] => (files, None),
    };

    let object = Path::new(object);
    let has_dir = object
        .parent()
        .is_some_and(|dir| !dir.as_os_str().is_empty());
    if !has_dir && library.is_none() {
        (map_dir.join(object), library)
    } else {
        (object.to_path_buf(), library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn region_with_and_without_flags() {
        assert_eq!(
            match_region("RAM              0x20000000         0x00020000         xrw"),
            Some(RegionLine {
                name: "RAM",
                origin: "0x20000000",
                length: "0x00020000",
                access: "xrw",
            })
        );
        assert_eq!(
            match_region("FLASH 0x08000000 0x00080000").map(|r| r.access),
            Some("")
        );
    }

    #[test]
    fn region_rejects_dotted_and_indented_names() {
        assert_eq!(match_region(".text 0x00000100 0x00000200"), None);
        assert_eq!(match_region(" RAM 0x00000000 0x00010000 xrw"), None);
        assert_eq!(match_region("*default* 0x00000000 0xffffffff"), None);
        assert_eq!(match_region("Name             Origin             Length"), None);
    }

    #[test]
    fn section_allows_dots_in_name() {
        assert_eq!(
            match_section(".bss.foo        0x20000000      0x24"),
            Some(SectionLine {
                name: ".bss.foo",
                origin: "0x20000000",
                length: "0x24",
            })
        );
        assert_eq!(match_section(" .text 0x0 0x10 foo.o"), None);
    }

    #[test]
    fn module_with_and_without_input_section_name() {
        assert_eq!(
            match_module(" .text          0x08000100       0x80 build/main.o"),
            Some(ModuleLine {
                origin: "0x08000100",
                size: "0x80",
                files: "build/main.o",
            })
        );
        assert_eq!(
            match_module(" 0x00000100 0x00000080 foo.o").map(|m| m.files),
            Some("foo.o")
        );
        assert_eq!(
            match_module(" .text 0x0 0x4c /usr/lib/libc.a(memcpy.o)").map(|m| m.files),
            Some("/usr/lib/libc.a(memcpy.o)")
        );
    }

    #[test]
    fn module_rejects_symbol_and_fill_lines() {
        assert_eq!(
            match_module("                0x08000000                _stext = ."),
            None
        );
        assert_eq!(match_module(" *fill*         0x08000104        0x4 "), None);
        assert_eq!(match_module(" .text 0x0 0x4 crt0.s"), None);
    }

    #[test]
    fn hex_fields() {
        assert_eq!(parse_hex("0x00010000", 1).unwrap(), 65536);
        assert_eq!(parse_hex("0xffffffffffffffff", 1).unwrap(), u64::MAX);
        match parse_hex("0x10000000000000000", 7) {
            Err(MapError::InvalidNumber { line, text, .. }) => {
                assert_eq!(line, 7);
                assert_eq!(text, "0x10000000000000000");
            }
            other => panic!("expected overflow error, got {other:?}"),
        }
    }

    #[test]
    fn bare_object_is_qualified_with_map_dir() {
        let dir = Path::new("/work/obj");
        assert_eq!(
            split_files("foo.o", dir),
            (PathBuf::from("/work/obj/foo.o"), None)
        );
        assert_eq!(
            split_files("src/foo.o", dir),
            (PathBuf::from("src/foo.o"), None)
        );
    }

    #[test]
    fn archive_member_is_left_alone() {
        assert_eq!(
            split_files("libx.a(bar.o)", Path::new("/work/obj")),
            (PathBuf::from("bar.o"), Some(PathBuf::from("libx.a")))
        );
    }
}
