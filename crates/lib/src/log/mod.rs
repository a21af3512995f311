//! Build output capture and streaming.
//!
//! # Submodules
//!
//! - [`sink`] - per-attempt append-only buffer with live readers
//! - [`registry`] - latest sink per package, mirrored to disk and followable across processes

pub mod registry;
pub mod sink;

use std::io;

use thiserror::Error;

use crate::types::PackageId;

pub use registry::{LogArchive, LogRegistry};
pub use sink::{LogReader, LogSink, LogWriter};

#[derive(Debug, Error)]
pub enum LogError {
  /// The attempt owning this log has finished.
  #[error("log for package {0} is sealed")]
  Sealed(PackageId),

  /// The package has never been built.
  #[error("no logs available for package {0}")]
  NoLogs(PackageId),

  #[error("failed to read archived log: {0}")]
  ReadArchive(#[source] io::Error),

  #[error("failed to write archived log: {0}")]
  WriteArchive(#[source] io::Error),
}
