use std::{io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use argp::FromArgs;
use itertools::Itertools;
use owo_colors::{AnsiColors, OwoColorize, Stream, Style};

use crate::{
    cmd::{output_format, OutputFormat},
    obj::ObjSectionKind,
    util::{
        bss::{
            build_symbol_table, compare_symbol_tables, BssComparison, ComparisonRecord,
            SymbolStatus,
        },
        file::output_writer,
        map::process_map_file,
    },
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Checks that globally visible BSS has not been reordered.
///
/// Only globally visible BSS appears in the map; in-function static BSS must
/// be examined with other tools.
#[argp(subcommand, name = "bss")]
pub struct Args {
    #[argp(positional)]
    /// path to the build's map
    map_file: PathBuf,
    #[argp(positional)]
    /// path to the expected map
    expected_map_file: PathBuf,
    #[argp(switch, short = 'a')]
    /// print all BSS, not just non-matching
    print_all: bool,
    #[argp(switch, short = 'n')]
    /// remove amusing messages
    no_fun_allowed: bool,
    #[argp(option, short = 'f', from_str_fn(output_format))]
    /// output format: csv or json. (Default: csv)
    format: Option<OutputFormat>,
    #[argp(option, short = 'o')]
    /// output file (Default: stdout)
    out: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<()> {
    log::info!("Build map:    {}", args.map_file.display());
    log::info!("Expected map: {}", args.expected_map_file.display());

    let build = process_map_file(&args.map_file, ObjSectionKind::Bss)
        .with_context(|| format!("Failed to process build map '{}'", args.map_file.display()))?;
    let expected = process_map_file(&args.expected_map_file, ObjSectionKind::Bss).with_context(
        || format!("Failed to process expected map '{}'", args.expected_map_file.display()),
    )?;
    let comparison =
        compare_symbol_tables(&build_symbol_table(&build), &build_symbol_table(&expected));
    log::debug!("Compared {} symbols", comparison.records.len());
    if !comparison.reordered.is_empty() {
        log::debug!("Reordered: {}", comparison.reordered.iter().join(", "));
    }

    let mut w = output_writer(args.out.as_deref())?;
    match args.format.unwrap_or_default() {
        OutputFormat::Csv => {
            // Don't write escape codes into files
            let color = args.out.is_none();
            write_csv(&mut w, &comparison, args.print_all, color)?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut w, &comparison)?;
            writeln!(w)?;
        }
    }
    w.flush()?;

    print_summary(&comparison, args.no_fun_allowed);
    if !comparison.is_clean() {
        bail!(
            "BSS check failed ({} reordered, {} with missing symbols)",
            comparison.reordered.len(),
            comparison.missing.len()
        );
    }
    Ok(())
}

fn paint(text: &str, color: AnsiColors, enabled: bool) -> String {
    if enabled {
        text.if_supports_color(Stream::Stdout, |t| t.color(color)).to_string()
    } else {
        text.to_string()
    }
}

fn format_delta(delta: i64) -> String {
    if delta < 0 {
        format!("-{:X}", delta.unsigned_abs())
    } else {
        format!("{delta:X}")
    }
}

/// Matching symbols are only listed next to a reordered unit, unless
/// `print_all` is set.
fn should_print(record: &ComparisonRecord, comparison: &BssComparison, print_all: bool) -> bool {
    if print_all || record.status.delta() != Some(0) {
        return true;
    }
    [&record.build, &record.expected]
        .into_iter()
        .flatten()
        .any(|loc| comparison.reordered.contains(&loc.unit))
}

fn write_csv<W>(w: &mut W, comparison: &BssComparison, print_all: bool, color: bool) -> Result<()>
where W: Write + ?Sized {
    writeln!(
        w,
        "Symbol Name,Build Address,Build File,Expected Address,Expected File,Difference,GOOD/BAD/MISSING"
    )?;
    for record in &comparison.records {
        if !should_print(record, comparison, print_all) {
            continue;
        }
        let (build_address, build_unit) = match &record.build {
            Some(loc) => (format!("{:X}", loc.address), loc.unit.as_str()),
            None => (String::new(), ""),
        };
        let (expected_address, expected_unit) = match &record.expected {
            Some(loc) => (format!("{:X}", loc.address), loc.unit.as_str()),
            None => (String::new(), ""),
        };
        let (difference, label) = match record.status {
            SymbolStatus::MissingFromBuild | SymbolStatus::MissingFromExpected => {
                ("Unknown".to_string(), paint("MISSING", AnsiColors::Yellow, color))
            }
            SymbolStatus::Matched { delta } | SymbolStatus::Moved { delta } => {
                let mut label = if delta == 0 {
                    paint("GOOD", AnsiColors::Green, color)
                } else {
                    paint("BAD", AnsiColors::Red, color)
                };
                if matches!(record.status, SymbolStatus::Moved { .. }) {
                    label.push(' ');
                    label.push_str(&paint("MOVED", AnsiColors::Cyan, color));
                }
                (format_delta(delta), label)
            }
        };
        writeln!(
            w,
            "{},{},{},{},{},{},{}",
            record.name,
            build_address,
            build_unit,
            expected_address,
            expected_unit,
            difference,
            label
        )?;
    }
    Ok(())
}

fn print_summary(comparison: &BssComparison, no_fun_allowed: bool) {
    if !comparison.reordered.is_empty() {
        eprintln!();
        eprintln!("{}", "  BAD".if_supports_color(Stream::Stderr, |t| t.red()));
        for unit in &comparison.reordered {
            eprintln!("bss reordering in {unit}");
        }
        eprintln!();
        if !no_fun_allowed {
            eprintln!(
                "{}",
                "  BSS is REORDERED!!\n  Oh! MY GOD!!"
                    .if_supports_color(Stream::Stderr, |t| t.bright_white())
            );
            eprintln!();
        }
    }

    if !comparison.missing.is_empty() {
        eprintln!();
        eprintln!("{}", "  MISSING".if_supports_color(Stream::Stderr, |t| t.yellow()));
        for unit in &comparison.missing {
            eprintln!("Symbols missing from {unit}");
        }
        eprintln!();
        if !no_fun_allowed {
            eprintln!(
                "{}",
                "  Error, should (not) be in here "
                    .if_supports_color(Stream::Stderr, |t| t.bright_white())
            );
            eprintln!();
        }
        eprintln!(
            "Some files appear to be missing symbols. Have they been renamed or declared as \
             static? You may need to remake 'expected'"
        );
    }

    if !comparison.is_clean() {
        return;
    }
    eprintln!("{}", "  GOOD".if_supports_color(Stream::Stderr, |t| t.green()));
    if no_fun_allowed {
        return;
    }
    eprintln!();
    for line in [
        "                                  ",
        "         CONGRATURATIONS!         ",
        "    All global BSS is correct.    ",
        "             THANK YOU!           ",
        "      You are great decomper!     ",
        "                                  ",
    ] {
        eprintln!(
            "{}",
            line.if_supports_color(Stream::Stderr, |t| {
                t.style(Style::new().bright_white().on_red())
            })
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::bss::{SymbolLocation, SymbolTable};

    fn comparison() -> BssComparison {
        let build: SymbolTable = [
            ("gA", "game/a", 0x80100000),
            ("gB", "game/a", 0x80100010),
            ("gC", "game/c", 0x80100020),
            ("gD", "game/d", 0x80100030),
            ("gNew", "game/new", 0x80100040),
        ]
        .into_iter()
        .map(|(name, unit, address)| {
            (name.to_string(), SymbolLocation { unit: unit.to_string(), address })
        })
        .collect();
        let mut expected = build.clone();
        expected.shift_remove("gNew");
        expected.get_mut("gA").unwrap().address = 0x80100010;
        expected.get_mut("gB").unwrap().address = 0x80100000;
        expected.get_mut("gD").unwrap().unit = "game/old_d".to_string();
        compare_symbol_tables(&build, &expected)
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(0), "0");
        assert_eq!(format_delta(0x10), "10");
        assert_eq!(format_delta(-0x10), "-10");
    }

    #[test]
    fn test_csv_filtered() {
        let mut out = Vec::<u8>::new();
        write_csv(&mut out, &comparison(), false, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, [
            "Symbol Name,Build Address,Build File,Expected Address,Expected File,Difference,GOOD/BAD/MISSING",
            "gA,80100000,game/a,80100010,game/a,-10,BAD",
            "gB,80100010,game/a,80100000,game/a,10,BAD",
            "gNew,80100040,game/new,,,Unknown,MISSING",
        ]);
    }

    #[test]
    fn test_csv_print_all() {
        let mut out = Vec::<u8>::new();
        write_csv(&mut out, &comparison(), true, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert!(text.contains("gC,80100020,game/c,80100020,game/c,0,GOOD\n"));
        assert!(text.contains("gD,80100030,game/d,80100030,game/old_d,0,GOOD MOVED\n"));
    }
}
