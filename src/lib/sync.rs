//! Environment file promotion.
//!
//! This module reads the source and destination files, runs the merge in
//! memory and writes the result back to the destination. It is the only part
//! of the crate that touches the filesystem.
//!
//! # Sync Logic
//!
//! The sync process:
//! 1. Reads the source file; any failure is fatal
//! 2. Reads the destination file; a missing destination is treated as empty
//! 3. Computes the missing and unused keys for reporting
//! 4. Merges the two files (see [`crate::merge`])
//! 5. Writes the result to the destination unless `dry_run` is set
//!
//! Nothing is written until the full output has been built.
//!
//! # Examples
//!
//! ```rust,no_run
//! use env_promote::sync::{EnvSync, SyncOptions};
//! use std::path::PathBuf;
//!
//! let options = SyncOptions {
//!     source_file: PathBuf::from(".env.uat"),
//!     destination_file: PathBuf::from(".env.prod"),
//!     dry_run: false,
//!     keep_unused: true,
//!     use_source_defaults: false,
//!     fill_empty: false,
//! };
//!
//! let report = EnvSync::sync_with_options(options).unwrap();
//! println!("{} keys missing from destination", report.missing_keys.len());
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

#[cfg(feature = "tracing")]
use tracing::{debug, info};

use crate::diff::KeyDiff;
use crate::merge::{MergeOptions, merge};
use crate::parse::{ParseError, ParsedFile};

pub const DEFAULT_SOURCE_FILENAME: &str = ".env.uat";
pub const DEFAULT_DESTINATION_FILENAME: &str = ".env.prod";

/// Main synchronization service for environment files.
pub struct EnvSync;

impl EnvSync {
  /// Promotes the source file onto the destination using the provided options.
  ///
  /// Returns an error if the source cannot be read. A missing destination is
  /// created on write.
  pub fn sync_with_options(options: SyncOptions) -> Result<SyncReport, SyncError> {
    #[cfg(feature = "tracing")]
    info!("Starting env sync");

    let SyncOptions {
      source_file,
      destination_file,
      dry_run,
      keep_unused,
      use_source_defaults,
      fill_empty,
    } = options;

    #[cfg(feature = "tracing")]
    debug!(?source_file, ?destination_file, dry_run, "Resolved file paths");

    let source_bytes = Self::read_source(&source_file)?;
    let destination_bytes = Self::read_destination(&destination_file)?;

    let source = ParsedFile::from_bytes(&source_bytes).map_err(SyncError::SourceParse)?;
    let destination =
      ParsedFile::from_bytes(&destination_bytes).map_err(SyncError::DestinationParse)?;

    let KeyDiff { missing, unused } = KeyDiff::new(&source, &destination);

    #[cfg(feature = "tracing")]
    debug!(
      "{} keys missing from destination, {} unused",
      missing.len(),
      unused.len()
    );

    let unused_keys: Vec<String> = unused.iter().map(|key| key.to_string()).collect();
    let merge_options = MergeOptions {
      keep_unused,
      use_source_defaults,
      fill_empty,
      unused_keys: Some(unused_keys.clone()),
    };

    let output = merge(&source, &destination, &merge_options).to_string();

    if dry_run {
      #[cfg(feature = "tracing")]
      debug!("Dry run, leaving {:?} untouched", destination_file);
    } else {
      Self::update_destination(&output, &destination_file)?;
    }

    Ok(SyncReport {
      missing_keys: missing.iter().map(|key| key.to_string()).collect(),
      unused_keys,
      output,
      written: !dry_run,
    })
  }

  fn read_source(path: &Path) -> Result<Vec<u8>, SyncError> {
    std::fs::read(path).map_err(|err| match err.kind() {
      io::ErrorKind::NotFound => SyncError::SourceNotFound(path.to_path_buf()),
      _ => SyncError::SourceIo(err),
    })
  }

  fn read_destination(path: &Path) -> Result<Vec<u8>, SyncError> {
    match std::fs::read(path) {
      Ok(bytes) => Ok(bytes),
      Err(err) if err.kind() == io::ErrorKind::NotFound => {
        #[cfg(feature = "tracing")]
        debug!("Destination {:?} does not exist, treating as empty", path);
        Ok(Vec::new())
      }
      Err(err) => Err(SyncError::DestinationIo(err)),
    }
  }

  /// Writes the merged content to the destination file.
  ///
  /// The content goes to a temporary file next to the destination, which then
  /// replaces it, so the destination is never left half written.
  fn update_destination<P: AsRef<Path>>(output: &str, destination_path: P) -> Result<(), SyncError> {
    let destination_path = destination_path.as_ref();

    #[cfg(feature = "tracing")]
    debug!("Writing merged content to {:?}", destination_path);

    let directory = match destination_path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(directory).map_err(SyncError::Write)?;
    if let Ok(metadata) = std::fs::metadata(destination_path) {
      staged
        .as_file()
        .set_permissions(metadata.permissions())
        .map_err(SyncError::Write)?;
    }
    staged.write_all(output.as_bytes()).map_err(SyncError::Write)?;
    staged.as_file().sync_all().map_err(SyncError::Write)?;
    staged
      .persist(destination_path)
      .map_err(|err| SyncError::Write(err.error))?;

    #[cfg(feature = "tracing")]
    info!("Sync completed successfully");

    Ok(())
  }
}

/// Errors that can occur during environment file synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  /// Source file does not exist
  #[error("Source file not found: {0}")]
  SourceNotFound(PathBuf),
  /// Error reading the source environment file
  #[error("Source file IO error: {0}")]
  SourceIo(io::Error),
  /// Error parsing the source environment file
  #[error("Source file parse error: {0}")]
  SourceParse(ParseError),
  /// Error reading the destination environment file
  #[error("Destination file IO error: {0}")]
  DestinationIo(io::Error),
  /// Error parsing the destination environment file
  #[error("Destination file parse error: {0}")]
  DestinationParse(ParseError),
  /// Error writing the merged content
  #[error("Write error: {0}")]
  Write(io::Error),
}

/// Configuration options for environment file synchronization.
#[derive(Debug, Clone)]
pub struct SyncOptions {
  /// Path to the source (template) environment file.
  pub source_file: PathBuf,
  /// Path to the destination environment file. Created if it doesn't exist.
  pub destination_file: PathBuf,
  /// Build the output without writing it.
  pub dry_run: bool,
  pub keep_unused: bool,
  pub use_source_defaults: bool,
  pub fill_empty: bool,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      source_file: PathBuf::from(DEFAULT_SOURCE_FILENAME),
      destination_file: PathBuf::from(DEFAULT_DESTINATION_FILENAME),
      dry_run: false,
      keep_unused: true,
      use_source_defaults: false,
      fill_empty: false,
    }
  }
}

/// What a sync found and produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
  /// Keys in the source but not the destination, in source order.
  pub missing_keys: Vec<String>,
  /// Keys in the destination but not the source, in destination order.
  pub unused_keys: Vec<String>,
  /// The merged file content.
  pub output: String,
  /// Whether the destination file was written.
  pub written: bool,
}
