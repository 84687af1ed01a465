use std::{
    fs::{DirBuilder, File},
    io,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use memmap2::Mmap;

use crate::util::map::MapError;

/// Reads an entire map file into memory. Invalid UTF-8 is replaced rather
/// than rejected.
pub fn read_map_file(path: &Path) -> Result<String, MapError> {
    let unavailable =
        |source: io::Error| MapError::Unavailable { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(unavailable)?;
    let map = unsafe { Mmap::map(&file) }.map_err(unavailable)?;
    Ok(String::from_utf8_lossy(&map).into_owned())
}

/// Creates a buffered writer around a file (not memory mapped).
pub fn buf_writer<P>(path: P) -> Result<BufWriter<File>>
where P: AsRef<Path> {
    if let Some(parent) = path.as_ref().parent() {
        DirBuilder::new().recursive(true).create(parent)?;
    }
    let file = File::create(&path)
        .with_context(|| format!("Failed to create file '{}'", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Writes to the given path, or to stdout if none is given.
pub fn output_writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(buf_writer(path)?),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}
