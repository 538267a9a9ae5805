//! Pool placement.
//!
//! The pool is a bucketed directory tree holding the authoritative copy
//! of every package artifact:
//! `<pool>/<component>/<prefix>/<source_name>/<filename>`. Within one
//! source directory a filename maps to exactly one content digest;
//! re-placing identical content is a no-op, different content is a
//! conflict.

use crate::checksum::md5sum;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Prefix bucket for a source package name: `"lib"` for names starting
/// with "lib", else the first character.
pub fn source_prefix(source_name: &str) -> &str {
    if source_name.starts_with("lib") {
        "lib"
    } else {
        let end = source_name.chars().next().map_or(0, |c| c.len_utf8());
        &source_name[..end]
    }
}

/// Split a section string into `(component, subsection)`. A bare
/// section with no `/` belongs to the "main" component.
pub fn split_section(section: &str) -> (&str, &str) {
    match section.split_once('/') {
        Some((component, subsection)) => (component, subsection),
        None => ("main", section),
    }
}

/// Outcome of a pool placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The file was copied to the given pool path.
    Copied(PathBuf),
    /// An identical file was already present at the given pool path.
    AlreadyPresent(PathBuf),
}

/// Place a file into the pool under
/// `<pool_root>/<component>/<prefix>/<source_name>/`.
///
/// Intermediate directories are created on demand; racing creators are
/// tolerated. If the target filename exists with identical content the
/// placement is an idempotent no-op; with different content it fails
/// with [`Error::PoolConflict`] and leaves the existing file untouched.
/// New files are staged in the target directory and renamed into place
/// so a partial copy never appears under the final name.
pub fn place_file(
    pool_root: &Path,
    component: &str,
    source_name: &str,
    filepath: &Path,
) -> Result<Placement> {
    if source_name.is_empty() {
        return Err(Error::Config("empty source package name".to_string()));
    }
    let filename = filepath
        .file_name()
        .ok_or_else(|| Error::Config(format!("'{}' has no filename", filepath.display())))?;

    let package_dir = pool_root
        .join(component)
        .join(source_prefix(source_name))
        .join(source_name);
    fs::create_dir_all(&package_dir)?;

    let target = package_dir.join(filename);
    if target.exists() {
        if md5sum(&target)? != md5sum(filepath)? {
            return Err(Error::PoolConflict {
                filename: filename.to_string_lossy().into_owned(),
            });
        }
        return Ok(Placement::AlreadyPresent(target));
    }

    let mut staged = tempfile::NamedTempFile::new_in(&package_dir)?;
    io::copy(&mut File::open(filepath)?, staged.as_file_mut())?;
    staged.persist(&target).map_err(|e| Error::Io(e.error))?;
    // The staging file is created mode 0600; pool files are served.
    fs::set_permissions(&target, fs::Permissions::from_mode(0o644))?;

    Ok(Placement::Copied(target))
}
