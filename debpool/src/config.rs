//! Distribution configuration.
//!
//! Distributions are described in `<confdir>/distributions`, a
//! deb822-format file with one paragraph per distribution:
//!
//! ```text
//! Codename: stable
//! Components: main contrib
//! Architectures: amd64 source
//! Pool: pool
//! ```

use crate::{Error, Result};
use deb822_lossless::Deb822;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor for one configured distribution. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    /// Distribution codename, e.g. "stable".
    pub codename: String,
    /// Pool directory, relative to the repository root.
    pub pool: PathBuf,
    /// Components, in configuration order.
    pub components: Vec<String>,
    /// Architectures, in configuration order. "source" denotes source packages.
    pub architectures: Vec<String>,
}

/// Parse `<confdir>/distributions` into a map keyed by codename.
///
/// The map is ordered so that topology initialization and index
/// regeneration walk distributions deterministically.
pub fn parse_distributions(confdir: &Path) -> Result<BTreeMap<String, Distribution>> {
    let path = confdir.join("distributions");
    let content = fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read '{}': {}", path.display(), e)))?;
    let deb822 = content
        .parse::<Deb822>()
        .map_err(|e| Error::Config(format!("cannot parse '{}': {}", path.display(), e)))?;

    let mut dists = BTreeMap::new();
    for paragraph in deb822.paragraphs() {
        let codename = paragraph
            .get("Codename")
            .ok_or_else(|| Error::Config(format!("missing Codename in '{}'", path.display())))?;
        let components = required_list(&paragraph, "Components", &codename)?;
        let architectures = required_list(&paragraph, "Architectures", &codename)?;
        let pool = paragraph
            .get("Pool")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("pool"));

        let dist = Distribution {
            codename: codename.clone(),
            pool,
            components,
            architectures,
        };
        if dists.insert(codename.clone(), dist).is_some() {
            return Err(Error::Config(format!(
                "duplicate distribution codename '{}'",
                codename
            )));
        }
    }
    Ok(dists)
}

fn required_list(
    paragraph: &deb822_lossless::Paragraph,
    field: &str,
    codename: &str,
) -> Result<Vec<String>> {
    let value = paragraph
        .get(field)
        .ok_or_else(|| Error::Config(format!("missing {} for '{}'", field, codename)))?;
    let items: Vec<String> = value.split_whitespace().map(str::to_owned).collect();
    if items.is_empty() {
        return Err(Error::Config(format!("empty {} for '{}'", field, codename)));
    }
    Ok(items)
}
