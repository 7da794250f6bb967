//! In-memory reading of downloaded Actions artifacts.
//!
//! Artifacts arrive as ZIP archives. Reading them applies:
//! - Path traversal rejection
//! - Zip bomb protection (size limits, checked against bytes actually inflated)
//! - Empty archive detection

use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

/// Maximum allowed extracted size (100MB default)
pub const MAX_EXTRACTED_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of files allowed in archive
pub const MAX_FILE_COUNT: usize = 10000;

/// Errors that can occur while reading an artifact archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Artifact archive is empty or contains no files")]
    EmptyArchive,

    #[error("Artifact archive exceeds maximum allowed size of {0} bytes")]
    TooLarge(u64),

    #[error("Artifact archive contains too many files (max {0})")]
    TooManyFiles(usize),

    #[error("Invalid path in artifact archive: {0}")]
    PathTraversal(String),

    #[error("Invalid artifact archive: {0}")]
    InvalidZip(String),
}

/// One regular file from an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Decoded contents of an artifact archive, in archive order.
#[derive(Debug, Clone, Default)]
pub struct ArtifactArchive {
    files: Vec<ArtifactFile>,
}

impl ArtifactArchive {
    pub fn files(&self) -> &[ArtifactFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.contents.len() as u64).sum()
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Contents of `name` as UTF-8 text, if present and valid.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|f| std::str::from_utf8(&f.contents).ok())
    }
}

fn is_unsafe_path(name: &str) -> bool {
    name.starts_with('/')
        || name.starts_with('\\')
        || name
            .split(['/', '\\'])
            .any(|segment| segment == "..")
}

/// Read every file of an artifact ZIP into memory using the default limits.
pub fn read_archive(zip_data: &[u8]) -> Result<ArtifactArchive, ArchiveError> {
    read_archive_with_limit(zip_data, MAX_EXTRACTED_SIZE)
}

/// Read every file of an artifact ZIP into memory, failing once more than
/// `max_size` bytes have been inflated.
pub fn read_archive_with_limit(
    zip_data: &[u8],
    max_size: u64,
) -> Result<ArtifactArchive, ArchiveError> {
    read_archive_with_limits(zip_data, max_size, MAX_FILE_COUNT)
}

fn read_archive_with_limits(
    zip_data: &[u8],
    max_size: u64,
    max_files: usize,
) -> Result<ArtifactArchive, ArchiveError> {
    let cursor = Cursor::new(zip_data);
    let mut archive =
        ZipArchive::new(cursor).map_err(|e| ArchiveError::InvalidZip(e.to_string()))?;

    if archive.len() > max_files {
        return Err(ArchiveError::TooManyFiles(max_files));
    }

    let mut files = Vec::new();
    let mut total_size: u64 = 0;

    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| ArchiveError::InvalidZip(e.to_string()))?;
        let name = file.name().to_string();

        if is_unsafe_path(&name) {
            return Err(ArchiveError::PathTraversal(name));
        }

        if file.is_dir() {
            continue;
        }

        // Declared sizes can lie; cap what we inflate instead.
        let remaining = max_size.saturating_sub(total_size);
        let mut contents = Vec::new();
        file.take(remaining.saturating_add(1))
            .read_to_end(&mut contents)
            .map_err(|e| ArchiveError::InvalidZip(e.to_string()))?;

        total_size += contents.len() as u64;
        if total_size > max_size {
            return Err(ArchiveError::TooLarge(max_size));
        }

        debug!(file = %name, size = contents.len(), "Read artifact file");
        files.push(ArtifactFile { name, contents });
    }

    if files.is_empty() {
        return Err(ArchiveError::EmptyArchive);
    }

    Ok(ArtifactArchive { files })
}
