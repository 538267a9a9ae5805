//! Gzip helpers for index files.

use crate::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// Write a gzip-compressed sibling of `path` (`<path>.gz`), keeping the
/// uncompressed original in place. Returns the path of the compressed
/// file.
pub fn gzip_file(path: &Path) -> Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = File::open(path)?;
    let output = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    Ok(gz_path)
}
