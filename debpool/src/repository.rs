//! Repository session: locking, topology, ingestion and index
//! regeneration.
//!
//! A [`Repository`] owns the process-wide lock and the repository log
//! for its whole lifetime. Construction acquires both and ensures the
//! directory skeleton; dropping the session releases the lock, on error
//! paths included.

use crate::checksum::md5sum;
use crate::compression::gzip_file;
use crate::config::{self, Distribution};
use crate::exec::{StdoutSink, ToolInvocation, ToolRunner};
use crate::lock::RepoLock;
use crate::{deb, pool, Error, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only repository event log (`<root>/log`), one timestamped
/// line per notable event. Distinct from diagnostic tracing output.
struct RepoLog {
    file: File,
}

impl RepoLog {
    fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    fn write(&mut self, msg: &str) -> Result<()> {
        let ts = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        writeln!(self.file, "{}  {}", ts, msg)?;
        Ok(())
    }
}

/// An exclusive mutating session over one repository directory tree.
pub struct Repository {
    root: PathBuf,
    dists: BTreeMap<String, Distribution>,
    log: RepoLog,
    _lock: RepoLock,
}

impl Repository {
    /// Open a repository session rooted at `root`.
    ///
    /// Acquires the repository lock (see [`RepoLock::acquire`] for the
    /// `timeout_secs` modes), opens the event log, loads the
    /// distribution configuration from `confdir` (default
    /// `<root>/conf`) and ensures the pool and dists skeletons exist.
    pub fn open(root: &Path, confdir: Option<&Path>, timeout_secs: i64) -> Result<Self> {
        let root = fs::canonicalize(root)?;
        let confdir = confdir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.join("conf"));

        let lock = RepoLock::acquire(&root, timeout_secs)?;
        let log = RepoLog::open(root.join("log"))?;
        let dists = config::parse_distributions(&confdir)?;

        let mut repo = Self {
            root,
            dists,
            log,
            _lock: lock,
        };
        repo.ensure_pool_dirs()?;
        repo.ensure_dist_dirs()?;
        Ok(repo)
    }

    /// Repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configured distributions, keyed by codename.
    pub fn distributions(&self) -> &BTreeMap<String, Distribution> {
        &self.dists
    }

    /// Create `<pool>/<component>` for every configured distribution
    /// and component. Idempotent; logs only newly created directories.
    pub fn ensure_pool_dirs(&mut self) -> Result<()> {
        let mut dirs = Vec::new();
        for dist in self.dists.values() {
            for component in &dist.components {
                dirs.push(self.root.join(&dist.pool).join(component));
            }
        }
        for dir in dirs {
            self.create_dir_logged(&dir)?;
        }
        Ok(())
    }

    /// Create `dists/<codename>/<component>/<archdir>` for every
    /// configured combination. Idempotent; logs only newly created
    /// directories.
    pub fn ensure_dist_dirs(&mut self) -> Result<()> {
        let mut dirs = Vec::new();
        for (codename, dist) in &self.dists {
            for component in &dist.components {
                for arch in &dist.architectures {
                    dirs.push(
                        self.root
                            .join("dists")
                            .join(codename)
                            .join(component)
                            .join(arch_dir_name(arch)),
                    );
                }
            }
        }
        for dir in dirs {
            self.create_dir_logged(&dir)?;
        }
        Ok(())
    }

    fn create_dir_logged(&mut self, dir: &Path) -> Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        self.log
            .write(&format!("created directory '{}'", dir.display()))
    }

    /// Place a file into the pool of `codename`, deriving the location
    /// from the source name and section.
    pub fn copy_to_pool(
        &mut self,
        filepath: &Path,
        codename: &str,
        source_name: &str,
        section: &str,
    ) -> Result<()> {
        let pool_subpath = self
            .dists
            .get(codename)
            .ok_or_else(|| Error::UnknownCodename(codename.to_string()))?
            .pool
            .clone();
        let (component, _subsection) = pool::split_section(section);
        let pool_root = self.root.join(pool_subpath);

        match pool::place_file(&pool_root, component, source_name, filepath)? {
            pool::Placement::Copied(target) => {
                info!("copied '{}' to '{}'", filepath.display(), target.display());
                self.log.write(&format!(
                    "copied '{}' to '{}'",
                    filepath.display(),
                    target.display()
                ))?;
            }
            pool::Placement::AlreadyPresent(target) => {
                info!("'{}' already in pool, skipping", target.display());
            }
        }
        Ok(())
    }

    /// Import a binary package into the pool.
    ///
    /// The source name and target distribution are taken from the
    /// package changelog when it is readable; otherwise the binary
    /// package name is used as the source name and `codename` must be
    /// supplied by the caller. `section` defaults to the control
    /// metadata's `Section` field.
    pub fn import_deb(
        &mut self,
        deb_path: &Path,
        codename: Option<&str>,
        section: Option<&str>,
    ) -> Result<()> {
        let deb_info = deb::read_deb(deb_path)?;

        let (source_name, codename) = match deb_info.changelog {
            Some(changelog) => {
                let codename = codename
                    .map(str::to_owned)
                    .unwrap_or(changelog.distribution);
                (changelog.source, codename)
            }
            None => {
                let codename = codename
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "'{}' has no readable changelog and no distribution was given",
                            deb_path.display()
                        ))
                    })?
                    .to_owned();
                (deb_info.package.clone(), codename)
            }
        };

        let section = match section {
            Some(s) => s.to_owned(),
            None => deb_info.section.clone().ok_or_else(|| {
                Error::Deb(format!("'{}' has no Section field", deb_path.display()))
            })?,
        };

        self.copy_to_pool(deb_path, &codename, &source_name, &section)
    }

    /// Import every file declared by an upload manifest (`.changes`).
    ///
    /// Each declared MD5 digest is verified against the file on disk
    /// before that file is placed; a mismatch aborts with
    /// [`Error::ChangesDigest`] naming the file and both digests.
    /// Files already placed stay in the pool (no rollback).
    pub fn import_changes(&mut self, changes_path: &Path, codename: Option<&str>) -> Result<()> {
        let file = File::open(changes_path)?;
        let changes = debian_control::changes::Changes::read(&file).map_err(|e| {
            Error::Changes(format!("cannot parse '{}': {}", changes_path.display(), e))
        })?;

        let codename = match codename {
            Some(c) => c.to_owned(),
            None => changes.distribution().ok_or_else(|| {
                Error::Changes(format!(
                    "'{}' has no Distribution field",
                    changes_path.display()
                ))
            })?,
        };
        let source_name = changes.source().ok_or_else(|| {
            Error::Changes(format!("'{}' has no Source field", changes_path.display()))
        })?;

        let changes_dir = changes_path.parent().unwrap_or_else(|| Path::new("."));
        for entry in changes.files().unwrap_or_default() {
            let filepath = changes_dir.join(&entry.filename);
            let actual = md5sum(&filepath)?;
            if actual != entry.md5sum {
                return Err(Error::ChangesDigest {
                    filename: entry.filename.clone(),
                    declared: entry.md5sum.clone(),
                    actual,
                });
            }
            self.copy_to_pool(&filepath, &codename, &source_name, &entry.section)?;
        }
        Ok(())
    }

    /// Regenerate every configured distribution's index files.
    ///
    /// With `prune`, the whole `dists/` tree is deleted and its empty
    /// skeleton recreated first; this is destructive and opt-in. For
    /// each codename and component the contents index is generated,
    /// then per architecture the source or package list; finally the
    /// Release manifest is generated once per codename. A failing tool
    /// aborts immediately; already written index files stay in place.
    pub fn update_dists(&mut self, runner: &dyn ToolRunner, prune: bool) -> Result<()> {
        if prune {
            let dists_dir = self.root.join("dists");
            if dists_dir.exists() {
                fs::remove_dir_all(&dists_dir)?;
            }
            self.ensure_dist_dirs()?;
        }

        let dists = self.dists.clone();
        for (codename, dist) in &dists {
            for component in &dist.components {
                self.write_contents(runner, &dist.pool, codename, component)?;
                for arch in &dist.architectures {
                    if arch == "source" {
                        self.write_sources(runner, &dist.pool, codename, component)?;
                    } else {
                        self.write_packages(runner, &dist.pool, codename, component, arch)?;
                    }
                }
            }
            self.write_release(runner, codename, &dist.components, &dist.architectures)?;
        }
        Ok(())
    }

    fn write_contents(
        &mut self,
        runner: &dyn ToolRunner,
        pool: &Path,
        codename: &str,
        component: &str,
    ) -> Result<()> {
        let path = self
            .root
            .join("dists")
            .join(codename)
            .join(component)
            .join("Contents.gz");
        runner.run(&ToolInvocation {
            argv: vec![
                "apt-ftparchive".into(),
                "--db".into(),
                "db".into(),
                "contents".into(),
                pool.join(component).display().to_string(),
            ],
            cwd: self.root.clone(),
            stdout: StdoutSink::GzipFile(path.clone()),
        })?;
        self.log.write(&format!("wrote '{}'", path.display()))
    }

    fn write_packages(
        &mut self,
        runner: &dyn ToolRunner,
        pool: &Path,
        codename: &str,
        component: &str,
        arch: &str,
    ) -> Result<()> {
        let path = self
            .root
            .join("dists")
            .join(codename)
            .join(component)
            .join(format!("binary-{}", arch))
            .join("Packages");
        runner.run(&ToolInvocation {
            argv: vec![
                "apt-ftparchive".into(),
                "--db".into(),
                "db".into(),
                "packages".into(),
                pool.join(component).display().to_string(),
            ],
            cwd: self.root.clone(),
            stdout: StdoutSink::File(path.clone()),
        })?;
        self.log.write(&format!("wrote '{}'", path.display()))?;
        let gz_path = gzip_file(&path)?;
        self.log.write(&format!("wrote '{}'", gz_path.display()))
    }

    fn write_sources(
        &mut self,
        runner: &dyn ToolRunner,
        pool: &Path,
        codename: &str,
        component: &str,
    ) -> Result<()> {
        let path = self
            .root
            .join("dists")
            .join(codename)
            .join(component)
            .join("source")
            .join("Sources");
        runner.run(&ToolInvocation {
            argv: vec![
                "apt-ftparchive".into(),
                "sources".into(),
                pool.join(component).display().to_string(),
            ],
            cwd: self.root.clone(),
            stdout: StdoutSink::File(path.clone()),
        })?;
        self.log.write(&format!("wrote '{}'", path.display()))?;
        let gz_path = gzip_file(&path)?;
        self.log.write(&format!("wrote '{}'", gz_path.display()))
    }

    fn write_release(
        &mut self,
        runner: &dyn ToolRunner,
        codename: &str,
        components: &[String],
        architectures: &[String],
    ) -> Result<()> {
        let path = self.root.join("dists").join(codename).join("Release");
        runner.run(&ToolInvocation {
            argv: vec![
                "apt-ftparchive".into(),
                "--db".into(),
                "db".into(),
                "-o".into(),
                format!("APT::FTPArchive::Release::Codename={}", codename),
                "-o".into(),
                format!(
                    "APT::FTPArchive::Release::Components={}",
                    components.join(" ")
                ),
                "-o".into(),
                format!(
                    "APT::FTPArchive::Release::Architectures={}",
                    architectures.join(" ")
                ),
                "release".into(),
                format!("dists/{}", codename),
            ],
            cwd: self.root.clone(),
            stdout: StdoutSink::File(path.clone()),
        })?;
        self.log.write(&format!("wrote '{}'", path.display()))
    }

    /// Write a detached ASCII-armored signature (`Release.gpg`) next to
    /// every distribution's Release manifest.
    pub fn sign_releases(&mut self, runner: &dyn ToolRunner) -> Result<()> {
        let codenames: Vec<String> = self.dists.keys().cloned().collect();
        for codename in codenames {
            let release_path = self.root.join("dists").join(&codename).join("Release");
            let signature_path = release_path.with_extension("gpg");
            runner
                .run(&ToolInvocation {
                    argv: vec![
                        "gpg".into(),
                        "--output".into(),
                        "-".into(),
                        "-a".into(),
                        "-b".into(),
                        release_path.display().to_string(),
                    ],
                    cwd: self.root.clone(),
                    stdout: StdoutSink::File(signature_path),
                })
                .map_err(|e| match e {
                    Error::Tool { status, .. } => Error::Sign {
                        codename: codename.clone(),
                        status,
                    },
                    other => other,
                })?;
            self.log.write(&format!("signed '{}'", release_path.display()))?;
        }
        Ok(())
    }
}

/// Directory name for an architecture under a component: `source` for
/// source packages, `binary-<arch>` otherwise.
pub fn arch_dir_name(arch: &str) -> String {
    if arch == "source" {
        arch.to_string()
    } else {
        format!("binary-{}", arch)
    }
}
