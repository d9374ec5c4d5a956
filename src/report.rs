use std::io::{self, Write};

use ansi_term::{Color, Style};

use crate::blocks::{MemoryUsage, Region, Section};

const SECTION_COLORS: [u8; 6] = [6, 4, 5, 3, 2, 1];

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Width of the usage bar, in characters.
    pub width: usize,
    pub modules: bool,
    pub hide_empty: bool,
    pub color: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            width: 32,
            modules: false,
            hide_empty: false,
            color: true,
        }
    }
}

pub fn write_report<W: Write>(
    out: &mut W,
    usage: &MemoryUsage,
    options: &ReportOptions,
) -> io::Result<()> {
    let mut report = Report {
        out,
        usage,
        options,
        printer: ColorPrinter {
            enabled: options.color,
            last_style: Style::default(),
        },
        section_idx: 0,
    };

    for region in &usage.regions {
        let used = usage.used_in(&region.name);
        if used == 0 && options.hide_empty {
            continue;
        }
        report.region(region, used)?;
        let mut sections: Vec<_> = usage.sections_in(&region.name).collect();
        sections.sort_by_key(|s| (s.origin, s.length));
        for section in sections {
            report.section(section)?;
        }
    }

    let unmapped: Vec<_> = usage.sections_in("").collect();
    if !unmapped.is_empty() {
        report.print("(unmapped)", Style::default().italic())?;
        report.newline()?;
        for section in unmapped {
            report.section(section)?;
        }
    }
    Ok(())
}

struct Report<'a, W> {
    out: &'a mut W,
    usage: &'a MemoryUsage,
    options: &'a ReportOptions,
    printer: ColorPrinter,
    section_idx: usize,
}

impl<W: Write> Report<'_, W> {
    fn print(&mut self, s: &str, style: Style) -> io::Result<()> {
        self.printer.print(self.out, s, style)
    }

    fn newline(&mut self) -> io::Result<()> {
        self.printer.print(self.out, "", Style::default())?;
        writeln!(self.out)
    }

    fn region(&mut self, region: &Region, used: u64) -> io::Result<()> {
        let ratio = if region.length == 0 {
            0.0
        } else {
            used as f64 / region.length as f64
        };
        let filled = if region.length == 0 {
            0
        } else {
            (used as u128 * self.options.width as u128 / region.length as u128)
                .min(self.options.width as u128) as usize
        };
        let color = if ratio < 0.75 {
            Color::Green
        } else if ratio < 0.9 {
            Color::Yellow
        } else {
            Color::Red
        };

        self.print(&format!("{:<12}", region.name), Style::default().bold())?;
        self.print(
            &format!(" {:#010x}..{:#010x} [", region.origin, region.end()),
            Style::default(),
        )?;
        self.print(&"#".repeat(filled), Style::default().fg(color))?;
        self.print(
            &format!(
                "{}] {:>10} / {:<10} {:>5.1}%",
                " ".repeat(self.options.width - filled),
                format_size(used),
                format_size(region.length),
                ratio * 100.0
            ),
            Style::default(),
        )?;
        if !region.access.is_empty() {
            self.print(&format!(" {}", region.access), Style::default().dimmed())?;
        }
        self.newline()
    }

    fn section(&mut self, section: &Section) -> io::Result<()> {
        let style = Style::default().fg(Color::Fixed(
            SECTION_COLORS[self.section_idx % SECTION_COLORS.len()],
        ));
        self.section_idx += 1;

        self.print(&format!("  {:<24}", section.name), style)?;
        self.print(
            &format!(" {:#010x} {:>10}", section.origin, format_size(section.length)),
            Style::default(),
        )?;
        self.newline()?;

        if !self.options.modules {
            return Ok(());
        }
        let usage = self.usage;
        let mut modules: Vec<_> = usage.modules_in(&section.name).collect();
        modules.sort_by(|a, b| b.size.cmp(&a.size));
        for module in modules {
            self.print(&format!("      {:<40}", module.to_string()), style.dimmed())?;
            self.print(&format!(" {:>10}", format_size(module.size)), Style::default())?;
            self.newline()?;
        }
        Ok(())
    }
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < MIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    }
}

#[derive(Default, Debug, Clone, Copy)]
struct ColorPrinter {
    enabled: bool,
    last_style: Style,
}

impl ColorPrinter {
    fn print<W: Write>(&mut self, out: &mut W, s: &str, style: Style) -> io::Result<()> {
        if self.enabled && self.last_style != style {
            write!(out, "{}", self.last_style.infix(style))?;
            self.last_style = style;
        }
        write!(out, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ModuleContribution;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn usage() -> MemoryUsage {
        let section = |name: &str, origin, length, region: &str| Section {
            name: name.to_string(),
            origin,
            length,
            region_name: region.to_string(),
        };
        let module = |file: &str, size, section: &str| ModuleContribution {
            object_file: PathBuf::from(file),
            library_file: None,
            origin: 0,
            size,
            region_name: "RAM".to_string(),
            section_name: section.to_string(),
        };
        MemoryUsage {
            regions: vec![
                Region {
                    name: "RAM".to_string(),
                    origin: 0x1000,
                    length: 0x100,
                    access: "xrw".to_string(),
                },
                Region {
                    name: "SRAM2".to_string(),
                    origin: 0x8000,
                    length: 0x100,
                    access: String::new(),
                },
            ],
            sections: vec![
                section(".bss", 0x1010, 0x30, "RAM"),
                section(".data", 0x1000, 0x10, "RAM"),
                section(".stray", 0x9000, 0x8, ""),
            ],
            modules: vec![
                module("a.o", 0x10, ".bss"),
                module("b.o", 0x20, ".bss"),
            ],
        }
    }

    fn render(options: ReportOptions) -> String {
        let mut out = Vec::new();
        write_report(&mut out, &usage(), &options).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn plain_report() {
        let text = render(ReportOptions {
            width: 10,
            color: false,
            ..ReportOptions::default()
        });
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("RAM "));
        assert!(lines[0].contains("0x00001000..0x00001100 [##        ]"));
        assert!(lines[0].contains("64 B"));
        assert!(lines[0].contains("25.0%"));
        assert!(lines[0].ends_with(" xrw"));
        assert!(lines[1].trim_start().starts_with(".data"));
        assert!(lines[2].trim_start().starts_with(".bss"));
        assert!(lines[3].starts_with("SRAM2"));
        assert!(lines[3].contains("[          ]"));
        assert_eq!(lines[4], "(unmapped)");
        assert!(lines[5].trim_start().starts_with(".stray"));
    }

    #[test]
    fn hide_empty_and_modules() {
        let text = render(ReportOptions {
            width: 10,
            color: false,
            hide_empty: true,
            modules: true,
        });
        assert!(!text.contains("SRAM2"));
        let modules: Vec<_> = text
            .lines()
            .filter(|l| l.trim_start().ends_with(" B") && l.contains(".o"))
            .map(|l| l.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(modules, vec!["b.o", "a.o"]);
    }

    #[test]
    fn colored_report_has_escapes() {
        let text = render(ReportOptions::default());
        assert!(text.contains("\x1b["));
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(0x10000), "64.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5 MiB");
    }
}
