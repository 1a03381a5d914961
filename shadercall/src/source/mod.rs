//! Module source providers.
//!
//! The loader never touches `std::fs` directly; it reads module and include
//! sources through a [`SourceProvider`]. This keeps include resolution
//! testable against in-memory trees and lets embedders ship shaders inside
//! the binary.
//!
//! # Providers
//!
//! - [`FileSystemSource`]: Native filesystem access
//! - [`MemorySource`]: In-memory storage for tests and embedded shaders
//!
//! # Path Contract
//!
//! Paths handed to providers are already joined with the device base
//! directory and normalized with [`path::normalize`], so providers can
//! compare them verbatim.

mod filesystem;
mod memory;
pub mod path;

use std::fmt;
use std::path::{Path, PathBuf};

pub use filesystem::FileSystemSource;
pub use memory::MemorySource;

/// Errors that can occur while reading module sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The requested path does not exist in the provider.
    NotFound(PathBuf),
    /// The path exists but could not be read.
    Io {
        /// Path being read.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NotFound(path) => write!(f, "not found: {}", path.display()),
            SourceError::Io { path, message } => {
                write!(f, "IO error reading {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for SourceError {}

impl SourceError {
    /// Classify an I/O error for the given path.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(path.to_path_buf())
        } else {
            SourceError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        }
    }
}

/// Trait for module source backends.
///
/// Implementations must be thread-safe: a [`Device`](crate::Device) is a
/// cloneable handle and may share its provider.
pub trait SourceProvider: Send + Sync + 'static {
    /// Read the entire text of the file at `path`.
    fn read_to_string(&self, path: &Path) -> Result<String, SourceError>;

    /// Check whether a file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}
