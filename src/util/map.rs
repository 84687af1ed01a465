use std::{
    io, mem,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::{
    obj::{ObjSectionKind, ObjSymbol, ObjUnit},
    util::file::read_map_file,
};

/// Marks the start of the memory layout in a makerom link map.
pub const MAP_ANCHOR: &str = "..makerom";

/// Minimum number of leading spaces on a symbol entry line.
pub const SYMBOL_INDENT: usize = 16;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("Failed to read map file '{}'", .path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'..makerom' not found; not a makerom link map")]
    MissingAnchor,
}

static UNIT_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s+(?P<section>\S+)\s+0x(?P<vram>[0-9A-Fa-f]+)\s+0x(?P<size>[0-9A-Fa-f]+)\s+(?P<path>\S+)\s*$",
    )
    .unwrap()
});
static SYMBOL_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s+0x(?P<vram>[0-9A-Fa-f]+)\s+(?P<name>\S+)\s*$").unwrap());
static JUMP_TABLE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^L[0-9A-F]{8}$").unwrap());

/// Locates the makerom anchor and splits everything after it into lines.
///
/// Line endings are split on `'\n'` only; a trailing `'\r'` is left in place
/// and tolerated by the entry patterns.
pub fn scan_map(text: &str) -> Result<impl Iterator<Item = &str>, MapError> {
    let start = text.find(MAP_ANCHOR).ok_or(MapError::MissingAnchor)?;
    Ok(text[start..].split('\n'))
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapLine<'a> {
    /// Starts with the section header token, e.g. `" .text "`
    UnitHeader(&'a str),
    /// Indented deep enough to be a symbol entry
    Indented(&'a str),
    Other(&'a str),
}

pub fn classify_line(line: &str, section: ObjSectionKind) -> MapLine<'_> {
    if line.starts_with(section.header_token()) {
        MapLine::UnitHeader(line)
    } else if line
        .as_bytes()
        .get(..SYMBOL_INDENT)
        .is_some_and(|prefix| prefix.iter().all(|&b| b == b' '))
    {
        MapLine::Indented(line)
    } else {
        MapLine::Other(line)
    }
}

/// Jump table labels are generated by the compiler and aren't real symbols.
#[inline]
pub fn is_jump_table_label(name: &str) -> bool { JUMP_TABLE_LABEL.is_match(name) }

/// Strips the two leading path components (the build/archive prefix) and the
/// object extension from a unit path.
///
/// `build/src/code/z_actor.o` becomes `code/z_actor`.
pub fn normalize_unit_name(path: &str) -> &str {
    let name = match path.splitn(3, '/').nth(2) {
        Some(rest) => rest,
        None => path.rsplit('/').next().unwrap_or(path),
    };
    let file_start = name.rfind('/').map_or(0, |idx| idx + 1);
    match name[file_start..].rfind('.') {
        Some(idx) => &name[..file_start + idx],
        None => name,
    }
}

#[inline]
fn parse_hex(s: &str) -> Option<u64> { u64::from_str_radix(s, 16).ok() }

/// Parses `<section> 0x<vram> 0x<size> <object path>`. The returned size is
/// already scaled to the section's unit.
fn parse_unit_header(line: &str, section: ObjSectionKind) -> Option<ObjUnit> {
    let captures = UNIT_ENTRY.captures(line)?;
    let address = parse_hex(&captures["vram"])?;
    let size = parse_hex(&captures["size"])? / section.unit_scale();
    let name = normalize_unit_name(&captures["path"]);
    Some(ObjUnit::new(name.to_string(), address, size))
}

/// Parses `0x<vram> <name>`. Jump table labels are rejected.
fn parse_symbol_entry(line: &str) -> Option<ObjSymbol> {
    let captures = SYMBOL_ENTRY.captures(line)?;
    let address = parse_hex(&captures["vram"])?;
    let name = &captures["name"];
    if is_jump_table_label(name) {
        log::trace!("Skipping jump table label {name} @ {address:#010X}");
        return None;
    }
    Some(ObjSymbol { name: name.to_string(), address, size: None })
}

#[derive(Debug)]
enum ParseState {
    OutsideUnit,
    InsideUnit(ObjUnit),
}

/// Line-driven state machine recovering units and their symbols for a single
/// section of a makerom map.
#[derive(Debug)]
pub struct MapParser {
    section: ObjSectionKind,
    state: ParseState,
    units: Vec<ObjUnit>,
}

impl MapParser {
    pub fn new(section: ObjSectionKind) -> Self {
        Self { section, state: ParseState::OutsideUnit, units: vec![] }
    }

    pub fn process_line(&mut self, line: &str) {
        let state = mem::replace(&mut self.state, ParseState::OutsideUnit);
        self.state = match (state, classify_line(line, self.section)) {
            (ParseState::OutsideUnit, MapLine::UnitHeader(line)) => {
                match parse_unit_header(line, self.section) {
                    Some(unit) if unit.size > 0 => {
                        log::debug!(
                            "Unit {} @ {:#010X} size {:#X}",
                            unit.name,
                            unit.address,
                            unit.size
                        );
                        ParseState::InsideUnit(unit)
                    }
                    Some(unit) => {
                        log::trace!("Skipping empty unit {}", unit.name);
                        ParseState::OutsideUnit
                    }
                    None => {
                        log::trace!("Ignoring malformed header: {}", line.trim_end());
                        ParseState::OutsideUnit
                    }
                }
            }
            (ParseState::InsideUnit(mut unit), MapLine::Indented(line)) => {
                if let Some(symbol) = parse_symbol_entry(line) {
                    unit.symbols.push(symbol);
                }
                ParseState::InsideUnit(unit)
            }
            // The line ending a unit is consumed by the transition.
            (ParseState::InsideUnit(unit), _) => {
                self.end_unit(unit);
                ParseState::OutsideUnit
            }
            (ParseState::OutsideUnit, _) => ParseState::OutsideUnit,
        };
    }

    fn end_unit(&mut self, unit: ObjUnit) {
        if unit.symbols.is_empty() {
            log::debug!("Dropping unit {} without symbols", unit.name);
        } else {
            self.units.push(unit);
        }
    }

    pub fn finish(mut self) -> Vec<ObjUnit> {
        if let ParseState::InsideUnit(unit) = mem::replace(&mut self.state, ParseState::OutsideUnit)
        {
            self.end_unit(unit);
        }
        self.units
    }
}

/// Parses every unit contributing to `section`, in declaration order.
/// Symbol sizes are left unknown.
pub fn parse_map(text: &str, section: ObjSectionKind) -> Result<Vec<ObjUnit>, MapError> {
    let mut parser = MapParser::new(section);
    for line in scan_map(text)? {
        parser.process_line(line);
    }
    let units = parser.finish();
    log::debug!("Found {} {} units", units.len(), section);
    Ok(units)
}

pub fn process_map_file<P>(path: P, section: ObjSectionKind) -> Result<Vec<ObjUnit>, MapError>
where P: AsRef<Path> {
    let text = read_map_file(path.as_ref())?;
    parse_map(&text, section)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_MAP: &str = concat!(
        "Linking build/rom.elf\n",
        " .text          0x80000000       0x40 build/src/boot/preamble.o\n",
        "                0x80000000                notInLayout\n",
        "..makerom       0x80000400\n",
        "\n",
        " .text          0x80000460       0x20 build/src/code/foo.o\n",
        "                0x80000460                funcA\n",
        "                0x80000468                funcB\n",
        "                0x8000046C                L8000046C\n",
        "\n",
        " .text          0x80000480        0x0 build/src/code/empty.o\n",
        "\n",
        " .text          0x80000480       0x10 build/src/code/nosyms.o\n",
        " *fill*         0x80000490        0x0\n",
        " .text          0x80000490       0x30 build/src/overlays/actors/ovl_En_Test/z_en_test.o\n",
        "                0x80000490                EnTest_Init\n",
        "                0x800004A0                EnTest_Update\n",
        "                0x800004B0                EnTest_Draw\n",
    );

    #[test]
    fn test_parse_text_map() {
        let units = parse_map(TEXT_MAP, ObjSectionKind::Text).unwrap();
        assert_eq!(units.len(), 2);

        let foo = &units[0];
        assert_eq!(foo.name, "code/foo");
        assert_eq!(foo.address, 0x80000460);
        assert_eq!(foo.size, 8);
        let names: Vec<&str> = foo.symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["funcA", "funcB"]);
        assert!(foo.symbols.iter().all(|s| s.size.is_none()));

        let actor = &units[1];
        assert_eq!(actor.name, "overlays/actors/ovl_En_Test/z_en_test");
        assert_eq!(actor.size, 0xC);
        assert_eq!(actor.symbols.len(), 3);
        assert_eq!(actor.symbols[2].address, 0x800004B0);
    }

    #[test]
    fn test_jump_table_labels_filtered() {
        let units = parse_map(TEXT_MAP, ObjSectionKind::Text).unwrap();
        assert!(units.iter().flat_map(|u| &u.symbols).all(|s| s.name != "L8000046C"));

        assert!(is_jump_table_label("L00001234"));
        assert!(!is_jump_table_label("L0000123"));
        assert!(!is_jump_table_label("L000012345"));
        assert!(!is_jump_table_label("L0000abcd"));
        assert!(!is_jump_table_label("D_80001234"));
        assert!(!is_jump_table_label("xL00001234"));
    }

    #[test]
    fn test_missing_anchor() {
        let text = " .text 0x80000460 0x20 build/src/code/foo.o\n";
        assert!(matches!(parse_map(text, ObjSectionKind::Text), Err(MapError::MissingAnchor)));
    }

    #[test]
    fn test_anchor_without_units() {
        let units = parse_map("..makerom 0x80000400\n", ObjSectionKind::Bss).unwrap();
        assert!(units.is_empty());
    }

    #[test]
    fn test_preamble_ignored() {
        let units = parse_map(TEXT_MAP, ObjSectionKind::Text).unwrap();
        assert!(units.iter().all(|u| u.name != "boot/preamble"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let crlf = TEXT_MAP.replace('\n', "\r\n");
        let units = parse_map(&crlf, ObjSectionKind::Text).unwrap();
        assert_eq!(units, parse_map(TEXT_MAP, ObjSectionKind::Text).unwrap());
    }

    #[test]
    fn test_bss_section() {
        let text = concat!(
            "..makerom\n",
            " .text          0x80000460       0x20 build/src/code/foo.o\n",
            "                0x80000460                funcA\n",
            "\n",
            " .bss           0x80100000       0x18 build/src/game/counter.o\n",
            "                0x80100000                gCounter\n",
            "                0x80100010                gTimer\n",
        );
        let units = parse_map(text, ObjSectionKind::Bss).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "game/counter");
        // Bytes, not words
        assert_eq!(units[0].size, 0x18);
        assert_eq!(units[0].symbols.len(), 2);
    }

    #[test]
    fn test_unit_ends_on_shallow_line() {
        let text = concat!(
            "..makerom\n",
            " .bss           0x80100000       0x10 build/src/game/a.o\n",
            "                0x80100000                gA\n",
            "               0x80100004                notIndentedEnough\n",
            "                0x80100008                gAfter\n",
        );
        let units = parse_map(text, ObjSectionKind::Bss).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].symbols.len(), 1);
    }

    #[test]
    fn test_header_ending_unit_is_consumed() {
        let text = concat!(
            "..makerom\n",
            " .bss           0x80100000       0x10 build/src/game/a.o\n",
            "                0x80100000                gA\n",
            " .bss           0x80100010       0x10 build/src/game/b.o\n",
            "                0x80100010                gB\n",
            "\n",
            " .bss           0x80100020       0x10 build/src/game/c.o\n",
            "                0x80100020                gC\n",
        );
        let units = parse_map(text, ObjSectionKind::Bss).unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["game/a", "game/c"]);
    }

    #[test]
    fn test_malformed_lines_ignored() {
        let text = concat!(
            "..makerom\n",
            " .bss           0x80100000       0x10 build/src/game/a.o\n",
            "                *(.bss)\n",
            "                0x80100000                gA\n",
            "                0x80100004                two words\n",
            "                0x1FFFFFFFFFFFFFFFF       overflow\n",
            "                0x80100008                gB\n",
            " .bss           garbage\n",
            " .bss           0x80100010       0x10\n",
        );
        let units = parse_map(text, ObjSectionKind::Bss).unwrap();
        assert_eq!(units.len(), 1);
        let names: Vec<&str> = units[0].symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["gA", "gB"]);
    }

    #[test]
    fn test_classify_line() {
        let section = ObjSectionKind::Text;
        let header = " .text          0x80000460       0x20 build/src/code/foo.o";
        assert_eq!(classify_line(header, section), MapLine::UnitHeader(header));
        assert_eq!(classify_line(header, ObjSectionKind::Bss), MapLine::Other(header));
        let entry = "                0x80000460                funcA";
        assert_eq!(classify_line(entry, section), MapLine::Indented(entry));
        let tabbed = "\t\t0x80000460 funcA";
        assert_eq!(classify_line(tabbed, section), MapLine::Other(tabbed));
        assert_eq!(classify_line(".text", section), MapLine::Other(".text"));
    }

    #[test]
    fn test_normalize_unit_name() {
        assert_eq!(normalize_unit_name("build/src/code/z_actor.o"), "code/z_actor");
        assert_eq!(normalize_unit_name("build/asm/boot.s.o"), "boot.s");
        assert_eq!(normalize_unit_name("build/src/foo"), "foo");
        assert_eq!(normalize_unit_name("build/foo.o"), "foo");
        assert_eq!(normalize_unit_name("foo.o"), "foo");
        assert_eq!(normalize_unit_name("build/lib.d/code/foo"), "code/foo");
    }
}
