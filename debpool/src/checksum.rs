//! Checksumming of package files.
//!
//! MD5 is used throughout because it is the digest declared in the
//! `Files` field of upload manifests; pool conflict detection reuses the
//! same algorithm so both call sites compare like with like.

use crate::Result;
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BLOCK_SIZE: usize = 4096;

/// Compute the hex-encoded MD5 digest of a file, streaming it in
/// fixed-size blocks.
pub fn md5sum<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut block = [0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut block)?;
        if n == 0 {
            break;
        }
        context.consume(&block[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}
