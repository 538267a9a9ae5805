//! Binary package metadata extraction.
//!
//! A `.deb` file is an ar archive with a `control.tar*` member holding
//! the control paragraph and a `data.tar*` member holding the installed
//! files. Placement needs the `Package` and `Section` control fields,
//! plus (when available) the topmost changelog entry from the data
//! member to learn the source package name and target distribution.

use crate::{Error, Result};
use deb822_lossless::Deb822;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source name and target distribution taken from the package changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogInfo {
    /// Source package name.
    pub source: String,
    /// Target distribution declared by the topmost changelog entry.
    pub distribution: String,
}

/// Control metadata extracted from a binary package.
#[derive(Debug, Clone)]
pub struct DebInfo {
    /// Binary package name (`Package` control field).
    pub package: String,
    /// Declared section, if any (`Section` control field).
    pub section: Option<String>,
    /// Changelog-derived metadata, `None` when the changelog is absent
    /// or cannot be read. Callers fall back to [`DebInfo::package`] as
    /// the source name in that case.
    pub changelog: Option<ChangelogInfo>,
}

/// Read control metadata and changelog information from a `.deb` file.
///
/// A missing or unreadable changelog is not an error; only the control
/// member is mandatory.
pub fn read_deb(path: &Path) -> Result<DebInfo> {
    let file = File::open(path)?;
    let mut archive = ar::Archive::new(file);

    let mut control_member: Option<(String, Vec<u8>)> = None;
    let mut data_member: Option<(String, Vec<u8>)> = None;

    while let Some(entry) = archive.next_entry() {
        let mut entry = entry?;
        let name = String::from_utf8_lossy(entry.header().identifier()).into_owned();
        if name.starts_with("control.tar") {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            control_member = Some((name, buf));
        } else if name.starts_with("data.tar") {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            data_member = Some((name, buf));
        }
    }

    let (control_name, control_raw) = control_member
        .ok_or_else(|| Error::Deb(format!("'{}' has no control.tar member", path.display())))?;
    let control_tar = decompress_member(&control_name, &control_raw)?;
    let control_text = read_tar_entry(&control_tar, |p| p == Path::new("control"))?
        .ok_or_else(|| Error::Deb(format!("'{}' has no control file", path.display())))?;
    let control_text = String::from_utf8_lossy(&control_text).into_owned();

    let deb822 = control_text
        .parse::<Deb822>()
        .map_err(|e| Error::Deb(format!("cannot parse control of '{}': {}", path.display(), e)))?;
    let paragraph = deb822
        .paragraphs()
        .next()
        .ok_or_else(|| Error::Deb(format!("empty control file in '{}'", path.display())))?;
    let package = paragraph
        .get("Package")
        .ok_or_else(|| Error::Deb(format!("'{}' has no Package field", path.display())))?;
    let section = paragraph.get("Section");

    let changelog = extract_changelog(data_member, &package);
    if changelog.is_none() {
        debug!(
            "no usable changelog in '{}', falling back to binary package name",
            path.display()
        );
    }

    Ok(DebInfo {
        package,
        section,
        changelog,
    })
}

/// Decompress an ar member according to its filename suffix.
fn decompress_member(name: &str, data: &[u8]) -> Result<Vec<u8>> {
    if name.ends_with(".tar") {
        Ok(data.to_vec())
    } else if name.ends_with(".gz") {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    } else if name.ends_with(".xz") {
        let mut out = Vec::new();
        xz2::read::XzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    } else if name.ends_with(".zst") {
        Ok(zstd::stream::decode_all(data)?)
    } else {
        Err(Error::Deb(format!("unsupported archive member '{}'", name)))
    }
}

/// Read the first tar entry whose normalized path satisfies `want`.
fn read_tar_entry(
    tar_data: &[u8],
    want: impl Fn(&Path) -> bool,
) -> Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(tar_data);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw = entry.path()?.into_owned();
        let path = raw.strip_prefix("./").unwrap_or(&raw).to_path_buf();
        if want(&path) {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

/// Best-effort extraction of the topmost changelog entry from the data
/// member. Any failure (unsupported compression, missing changelog,
/// malformed contents) selects the fallback path.
fn extract_changelog(data_member: Option<(String, Vec<u8>)>, package: &str) -> Option<ChangelogInfo> {
    let (name, raw) = data_member?;
    let tar = decompress_member(&name, &raw).ok()?;

    let doc_dir = PathBuf::from("usr/share/doc").join(package);
    let entry = read_tar_entry(&tar, |p| {
        p.starts_with(&doc_dir)
            && p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("changelog"))
    })
    .ok()??;

    // Changelogs under usr/share/doc are conventionally gzipped.
    let text = if entry.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(&entry[..])
            .read_to_end(&mut out)
            .ok()?;
        out
    } else {
        entry
    };
    parse_changelog(&String::from_utf8_lossy(&text))
}

fn parse_changelog(text: &str) -> Option<ChangelogInfo> {
    let changelog: debian_changelog::ChangeLog = text.parse().ok()?;
    let entry = changelog.entries().next()?;
    let source = entry.package()?;
    let distribution = entry.distributions()?.into_iter().next()?;
    Some(ChangelogInfo {
        source,
        distribution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    const CHANGELOG: &str = "foo-app (1.0-1) stable; urgency=medium\n\n  \
        * Initial release.\n\n \
        -- Jane Doe <jane@example.com>  Thu, 01 Aug 2024 12:00:00 +0000\n";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn write_deb(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = ar::Builder::new(file);
        let header = ar::Header::new(b"debian-binary".to_vec(), 4);
        builder.append(&header, &b"2.0\n"[..]).unwrap();
        for (name, data) in members {
            let header = ar::Header::new(name.as_bytes().to_vec(), data.len() as u64);
            builder.append(&header, *data).unwrap();
        }
    }

    fn control_tar_gz(control: &str) -> Vec<u8> {
        gzip(&tar_bytes(&[("./control", control.as_bytes())]))
    }

    #[test]
    fn test_read_deb_with_changelog() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("foo-app-bin_1.0-1_amd64.deb");

        let control = "Package: foo-app-bin\nVersion: 1.0-1\nArchitecture: amd64\nSection: main\n";
        let data = gzip(&tar_bytes(&[(
            "./usr/share/doc/foo-app-bin/changelog.Debian.gz",
            &gzip(CHANGELOG.as_bytes()),
        )]));
        write_deb(
            &deb,
            &[
                ("control.tar.gz", &control_tar_gz(control)),
                ("data.tar.gz", &data),
            ],
        );

        let info = read_deb(&deb).unwrap();
        assert_eq!(info.package, "foo-app-bin");
        assert_eq!(info.section.as_deref(), Some("main"));
        let changelog = info.changelog.unwrap();
        assert_eq!(changelog.source, "foo-app");
        assert_eq!(changelog.distribution, "stable");
    }

    #[test]
    fn test_read_deb_without_changelog_falls_back() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("bare_1.0_amd64.deb");

        let control = "Package: bare\nVersion: 1.0\nSection: utils\n";
        let data = gzip(&tar_bytes(&[("./usr/bin/bare", b"#!/bin/sh\n")]));
        write_deb(
            &deb,
            &[
                ("control.tar.gz", &control_tar_gz(control)),
                ("data.tar.gz", &data),
            ],
        );

        let info = read_deb(&deb).unwrap();
        assert_eq!(info.package, "bare");
        assert_eq!(info.section.as_deref(), Some("utils"));
        assert!(info.changelog.is_none());
    }

    #[test]
    fn test_unsupported_data_compression_selects_fallback() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("odd_1.0_amd64.deb");

        let control = "Package: odd\nSection: misc\n";
        write_deb(
            &deb,
            &[
                ("control.tar.gz", &control_tar_gz(control)),
                ("data.tar.lzma", b"not actually lzma"),
            ],
        );

        let info = read_deb(&deb).unwrap();
        assert_eq!(info.package, "odd");
        assert!(info.changelog.is_none());
    }

    #[test]
    fn test_missing_package_field_is_an_error() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("broken.deb");

        write_deb(
            &deb,
            &[("control.tar.gz", &control_tar_gz("Section: misc\n"))],
        );
        assert!(matches!(read_deb(&deb), Err(Error::Deb(_))));
    }

    #[test]
    fn test_missing_control_member_is_an_error() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("empty.deb");
        write_deb(&deb, &[]);
        assert!(matches!(read_deb(&deb), Err(Error::Deb(_))));
    }

    #[test]
    fn test_xz_control_member() {
        let dir = TempDir::new().unwrap();
        let deb = dir.path().join("xz_1.0_amd64.deb");

        let control_tar = tar_bytes(&[("./control", b"Package: xzpkg\nSection: misc\n")]);
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(&control_tar).unwrap();
        let control_xz = encoder.finish().unwrap();

        write_deb(&deb, &[("control.tar.xz", &control_xz)]);
        let info = read_deb(&deb).unwrap();
        assert_eq!(info.package, "xzpkg");
    }
}
