//! Error types for the debpool library.

use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while maintaining a repository.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during filesystem access.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable repository configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A distribution codename that is not present in the configuration.
    #[error("Unknown distribution codename '{0}'")]
    UnknownCodename(String),

    /// The repository lock is held by another process.
    #[error("Repository lock is held by another process")]
    LockBusy,

    /// The repository lock could not be acquired before the deadline.
    #[error("Timed out after {secs}s waiting for the repository lock")]
    LockTimeout {
        /// Number of seconds waited.
        secs: u64,
    },

    /// A pool file with the same name but different content already exists.
    #[error("'{filename}' already exists in the repository with a different checksum")]
    PoolConflict {
        /// Basename of the conflicting pool file.
        filename: String,
    },

    /// A checksum declared in an upload manifest does not match the file on disk.
    #[error("md5 checksum mismatch '{filename}': '{declared}' != '{actual}'")]
    ChangesDigest {
        /// Basename of the mismatched file.
        filename: String,
        /// Checksum declared in the manifest.
        declared: String,
        /// Checksum recomputed from the file.
        actual: String,
    },

    /// Malformed or incomplete upload manifest.
    #[error("Invalid changes file: {0}")]
    Changes(String),

    /// Malformed or incomplete binary package.
    #[error("Invalid package: {0}")]
    Deb(String),

    /// An external index generator exited with a failure status.
    #[error("'{step}' failed with exit status {status}")]
    Tool {
        /// The command line that failed.
        step: String,
        /// Process exit status, -1 when killed by a signal.
        status: i32,
    },

    /// The signing tool failed for a distribution's Release file.
    #[error("Signing the Release file for '{codename}' failed with exit status {status}")]
    Sign {
        /// Codename whose Release file was being signed.
        codename: String,
        /// Process exit status, -1 when killed by a signal.
        status: i32,
    },
}
