//! # debpool
//!
//! A library for maintaining a Debian-style APT package repository on
//! the local filesystem. It places uploaded artifacts into a pool
//! directory tree organized by component and source-package prefix, and
//! regenerates the per-distribution metadata indexes (Packages,
//! Sources, Contents, Release) by orchestrating external tools.
//!
//! ## Example
//!
//! ```no_run
//! use debpool::{Repository, SystemRunner};
//!
//! # fn main() -> debpool::Result<()> {
//! let mut repo = Repository::open("/srv/repo".as_ref(), None, 0)?;
//! repo.import_changes("/var/cache/pbuilder/results/sl_3.03-17_i386.changes".as_ref(), None)?;
//! repo.update_dists(&SystemRunner, false)?;
//! repo.sign_releases(&SystemRunner)?;
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod compression;
pub mod config;
pub mod deb;
pub mod error;
pub mod exec;
pub mod lock;
pub mod pool;
pub mod repository;

pub use checksum::md5sum;
pub use config::{parse_distributions, Distribution};
pub use deb::{ChangelogInfo, DebInfo};
pub use error::{Error, Result};
pub use exec::{StdoutSink, SystemRunner, ToolInvocation, ToolRunner};
pub use lock::RepoLock;
pub use pool::{source_prefix, split_section, Placement};
pub use repository::{arch_dir_name, Repository};
