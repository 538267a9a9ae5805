//! External index-tool invocation.
//!
//! Index content is produced by external tools (`apt-ftparchive`,
//! `gpg`). The orchestrator only decides the argument list, the working
//! directory and where captured stdout goes; [`ToolRunner`] is a trait
//! so tests can substitute a recording fake.

use crate::{Error, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Where a tool's captured stdout is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutSink {
    /// Write stdout verbatim to the given path.
    File(PathBuf),
    /// Gzip-compress stdout into the given path.
    GzipFile(PathBuf),
}

/// One external tool invocation: argument vector, working directory and
/// stdout destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Full argument vector; the first element is the program.
    pub argv: Vec<String>,
    /// Working directory for the subprocess.
    pub cwd: PathBuf,
    /// Destination of the captured stdout.
    pub stdout: StdoutSink,
}

impl ToolInvocation {
    /// Human-readable identification of this invocation, used in error
    /// reporting.
    pub fn step(&self) -> String {
        self.argv.join(" ")
    }
}

/// Runs external index tools.
pub trait ToolRunner {
    /// Run the tool synchronously, writing its stdout to the sink.
    /// A non-zero exit status is an error; the sink is only written on
    /// success.
    fn run(&self, invocation: &ToolInvocation) -> Result<()>;
}

/// [`ToolRunner`] backed by real subprocesses.
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<()> {
        let (program, args) = invocation
            .argv
            .split_first()
            .ok_or_else(|| Error::Config("empty tool command".to_string()))?;

        debug!(
            "running {:?} in '{}'",
            invocation.argv,
            invocation.cwd.display()
        );
        let output = Command::new(program)
            .args(args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed ({}): {}", program, output.status, stderr.trim());
            return Err(Error::Tool {
                step: invocation.step(),
                status: output.status.code().unwrap_or(-1),
            });
        }

        match &invocation.stdout {
            StdoutSink::File(path) => fs::write(path, &output.stdout)?,
            StdoutSink::GzipFile(path) => {
                let file = File::create(path)?;
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&output.stdout)?;
                encoder.finish()?;
            }
        }
        Ok(())
    }
}
