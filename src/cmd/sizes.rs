use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use argp::FromArgs;

use crate::{
    cmd::{output_format, OutputFormat},
    obj::{ObjSectionKind, ObjUnit},
    util::{
        file::output_writer,
        folder::aggregate_folders,
        map::process_map_file,
        sizes::{apply_all_sizes, UnitSummary},
    },
};

#[derive(FromArgs, PartialEq, Eq, Debug)]
/// Summarizes file sizes by parsing a makerom map.
#[argp(subcommand, name = "sizes")]
pub struct Args {
    #[argp(positional)]
    /// path to input map
    map_file: PathBuf,
    #[argp(option, short = 's', from_str_fn(section_kind))]
    /// section to measure: text (in words) or bss (in bytes). (Default: text)
    section: Option<ObjSectionKind>,
    #[argp(switch)]
    /// merge files by directory
    folders: bool,
    #[argp(switch)]
    /// print the size of every function instead of a summary
    functions: bool,
    #[argp(option, short = 'f', from_str_fn(output_format))]
    /// output format: csv or json. (Default: csv)
    format: Option<OutputFormat>,
    #[argp(option, short = 'o')]
    /// output file (Default: stdout)
    out: Option<PathBuf>,
}

fn section_kind(value: &str) -> Result<ObjSectionKind, String> { value.parse() }

pub fn run(args: Args) -> Result<()> {
    let section = args.section.unwrap_or(ObjSectionKind::Text);
    let mut units = process_map_file(&args.map_file, section)
        .with_context(|| format!("Failed to process map '{}'", args.map_file.display()))?;
    let anomalies = apply_all_sizes(&mut units, section);
    if !anomalies.is_empty() {
        log::warn!("{} symbol(s) with implausible sizes", anomalies.len());
    }
    if args.folders {
        units = aggregate_folders(units);
    }
    log::info!("Processed {} {} entries", units.len(), section);

    let mut w = output_writer(args.out.as_deref())?;
    match (args.format.unwrap_or_default(), args.functions) {
        (OutputFormat::Csv, false) => write_summary_csv(&mut w, &units)?,
        (OutputFormat::Csv, true) => write_functions_csv(&mut w, &units)?,
        (OutputFormat::Json, false) => {
            let summaries = units.iter().map(UnitSummary::new).collect::<Vec<_>>();
            serde_json::to_writer_pretty(&mut w, &summaries)?;
            writeln!(w)?;
        }
        (OutputFormat::Json, true) => {
            serde_json::to_writer_pretty(&mut w, &units)?;
            writeln!(w)?;
        }
    }
    w.flush()?;
    Ok(())
}

fn write_summary_csv<W>(w: &mut W, units: &[ObjUnit]) -> Result<()>
where W: Write + ?Sized {
    writeln!(w, "VRAM,File,Num functions,Max size,Total size,Average size")?;
    for summary in units.iter().map(UnitSummary::new) {
        writeln!(
            w,
            "{:08X},{},{},{},{},{:.2}",
            summary.address,
            summary.name,
            summary.symbol_count,
            summary.max_size,
            summary.total_size,
            summary.average_size
        )?;
    }
    Ok(())
}

fn write_functions_csv<W>(w: &mut W, units: &[ObjUnit]) -> Result<()>
where W: Write + ?Sized {
    writeln!(w, "VRAM,File,Function,Size")?;
    for unit in units {
        for symbol in &unit.symbols {
            let size = symbol.size.map(|s| s.to_string()).unwrap_or_default();
            writeln!(w, "{:08X},{},{},{}", symbol.address, unit.name, symbol.name, size)?;
        }
    }
    Ok(())
}
