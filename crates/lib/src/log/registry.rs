//! Latest log per package.
//!
//! The registry owns the sink of each package's most recent build attempt;
//! starting a new attempt replaces it. With a [`LogArchive`] configured,
//! every sink is mirrored into `<dir>/<id>.log` as it is written, so another
//! process can serve the log while the build runs and after it has ended.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::types::PackageId;

use super::{LogError, LogReader, LogSink};

/// How often a log written by another process is polled for new output.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(100);

/// Build logs on disk, one file per package (`<dir>/<id>.log`).
#[derive(Debug, Clone)]
pub struct LogArchive {
  dir: PathBuf,
}

impl LogArchive {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  fn path(&self, package_id: PackageId) -> PathBuf {
    self.dir.join(format!("{}.log", package_id))
  }

  /// Truncate the log of `package_id` for a new attempt.
  pub fn create(&self, package_id: PackageId) -> Result<File, LogError> {
    fs::create_dir_all(&self.dir).map_err(LogError::WriteArchive)?;
    File::create(self.path(package_id)).map_err(LogError::WriteArchive)
  }

  pub fn load(&self, package_id: PackageId) -> Result<Option<Vec<u8>>, LogError> {
    match fs::read(self.path(package_id)) {
      Ok(content) => Ok(Some(content)),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(LogError::ReadArchive(e)),
    }
  }

  pub fn exists(&self, package_id: PackageId) -> bool {
    self.path(package_id).is_file()
  }
}

#[derive(Debug, Default)]
pub struct LogRegistry {
  sinks: RwLock<HashMap<PackageId, LogSink>>,
  archive: Option<LogArchive>,
}

impl LogRegistry {
  /// A registry that keeps logs in memory only.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_archive(archive: LogArchive) -> Self {
    Self {
      sinks: RwLock::default(),
      archive: Some(archive),
    }
  }

  /// Start a fresh sink for a new attempt, replacing the previous one.
  ///
  /// If the archive file cannot be created the log stays in memory.
  pub fn begin(&self, package_id: PackageId) -> LogSink {
    let sink = match self.archive.as_ref().map(|archive| archive.create(package_id)) {
      Some(Ok(file)) => LogSink::mirrored(package_id, file),
      Some(Err(err)) => {
        warn!(package = %package_id, error = %err, "failed to create log file");
        LogSink::new(package_id)
      }
      None => LogSink::new(package_id),
    };

    self
      .sinks
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(package_id, sink.clone());
    sink
  }

  /// Sink of the most recent attempt started by this process.
  pub fn latest(&self, package_id: PackageId) -> Option<LogSink> {
    self
      .sinks
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&package_id)
      .cloned()
  }

  /// Attach a reader to the latest log of `package_id`.
  ///
  /// Without a sink in this process the archive is read. While `running`
  /// reports a build in another process, the file is followed until that
  /// build ends; this needs a tokio runtime.
  pub fn attach(
    &self,
    package_id: PackageId,
    running: impl Fn() -> bool + Send + 'static,
  ) -> Result<LogReader, LogError> {
    if let Some(sink) = self.latest(package_id) {
      return Ok(sink.attach_reader());
    }

    let Some(archive) = &self.archive else {
      return Err(LogError::NoLogs(package_id));
    };

    if running() {
      debug!(package = %package_id, "following log of a build in another process");
      let sink = LogSink::new(package_id);
      let reader = sink.attach_reader();
      tokio::spawn(follow(archive.path(package_id), sink, running));
      return Ok(reader);
    }

    match archive.load(package_id)? {
      Some(content) => {
        debug!(package = %package_id, bytes = content.len(), "serving archived log");
        Ok(LogSink::sealed(package_id, content).attach_reader())
      }
      None => Err(LogError::NoLogs(package_id)),
    }
  }

  pub fn has_logs(&self, package_id: PackageId) -> bool {
    self.latest(package_id).is_some() || self.archive.as_ref().is_some_and(|a| a.exists(package_id))
  }
}

/// Copy what another process appends to `path` into `sink`, then seal it.
///
/// `running` is sampled before each read: its writer puts every chunk on
/// disk before committing the terminal state, so the read following a
/// `false` sample is the last one needed.
async fn follow(path: PathBuf, sink: LogSink, running: impl Fn() -> bool) {
  let writer = sink.writer();
  let mut position = 0;

  loop {
    let live = running();
    match read_from(&path, position).await {
      Ok(chunk) => {
        position += chunk.len() as u64;
        if writer.write(chunk).is_err() {
          break;
        }
      }
      Err(err) if err.kind() == io::ErrorKind::NotFound => {}
      Err(err) => {
        warn!(path = %path.display(), error = %err, "failed to follow build log");
        break;
      }
    }

    if !live {
      break;
    }
    tokio::time::sleep(FOLLOW_INTERVAL).await;
  }

  sink.seal();
}

async fn read_from(path: &Path, position: u64) -> io::Result<Vec<u8>> {
  let mut file = tokio::fs::File::open(path).await?;
  file.seek(SeekFrom::Start(position)).await?;
  let mut chunk = Vec::new();
  file.read_to_end(&mut chunk).await?;
  Ok(chunk)
}
