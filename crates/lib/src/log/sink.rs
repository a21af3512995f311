//! Append-only, multi-reader build log.
//!
//! A [`LogSink`] is created per build attempt. The executor appends through
//! a [`LogWriter`]; any number of [`LogReader`]s replay what is buffered and
//! then follow live output until the sink is sealed.
//!
//! Chunks are reference-counted `Bytes`, so the mutex is only held long
//! enough to push or clone one chunk. Readers park on a `watch` channel that
//! is bumped after every append and on seal, which makes sealing visible to
//! every waiting reader without polling.
//!
//! A sink may also mirror every chunk into a file. The chunk reaches the
//! file before it is visible in memory, so once the executor returns the
//! file holds the complete output.

use std::fs::File;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::watch;
use tracing::warn;

use crate::types::PackageId;

use super::LogError;

#[derive(Debug, Default)]
struct Buffer {
  chunks: Vec<Bytes>,
  bytes: usize,
  sealed: bool,
  mirror: Option<File>,
}

#[derive(Debug)]
struct Shared {
  package_id: PackageId,
  buffer: Mutex<Buffer>,
  changes: watch::Sender<u64>,
}

impl Shared {
  fn buffer(&self) -> MutexGuard<'_, Buffer> {
    // A panic while holding the lock cannot leave a half-pushed chunk.
    self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn bump(&self) {
    self.changes.send_modify(|generation| *generation += 1);
  }
}

#[derive(Debug, Clone)]
pub struct LogSink {
  shared: Arc<Shared>,
}

impl LogSink {
  pub fn new(package_id: PackageId) -> Self {
    let (changes, _) = watch::channel(0);
    Self {
      shared: Arc::new(Shared {
        package_id,
        buffer: Mutex::new(Buffer::default()),
        changes,
      }),
    }
  }

  /// A sink that also appends every chunk to `mirror`.
  pub fn mirrored(package_id: PackageId, mirror: File) -> Self {
    let sink = Self::new(package_id);
    sink.shared.buffer().mirror = Some(mirror);
    sink
  }

  /// A sink that already holds `content` and is sealed.
  pub fn sealed(package_id: PackageId, content: Vec<u8>) -> Self {
    let sink = Self::new(package_id);
    {
      let mut buffer = sink.shared.buffer();
      if !content.is_empty() {
        buffer.bytes = content.len();
        buffer.chunks.push(Bytes::from(content));
      }
      buffer.sealed = true;
    }
    sink
  }

  pub fn writer(&self) -> LogWriter {
    LogWriter {
      shared: Arc::clone(&self.shared),
    }
  }

  pub fn attach_reader(&self) -> LogReader {
    LogReader {
      shared: Arc::clone(&self.shared),
      changes: self.shared.changes.subscribe(),
      position: 0,
    }
  }

  /// Stop accepting writes. Returns `false` if the sink was already sealed.
  pub fn seal(&self) -> bool {
    {
      let mut buffer = self.shared.buffer();
      if buffer.sealed {
        return false;
      }
      buffer.sealed = true;
      buffer.mirror = None;
    }
    self.shared.bump();
    true
  }

  pub fn is_sealed(&self) -> bool {
    self.shared.buffer().sealed
  }

  /// Number of bytes written so far.
  pub fn len(&self) -> usize {
    self.shared.buffer().bytes
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Concatenation of everything written so far.
  pub fn contents(&self) -> Vec<u8> {
    let buffer = self.shared.buffer();
    let mut out = Vec::with_capacity(buffer.bytes);
    for chunk in &buffer.chunks {
      out.extend_from_slice(chunk);
    }
    out
  }
}

/// Write side of a [`LogSink`], handed to the build executor.
#[derive(Debug, Clone)]
pub struct LogWriter {
  shared: Arc<Shared>,
}

impl LogWriter {
  /// Append a chunk. Empty chunks are ignored.
  pub fn write(&self, chunk: impl Into<Bytes>) -> Result<(), LogError> {
    let chunk = chunk.into();
    {
      let mut buffer = self.shared.buffer();
      if buffer.sealed {
        return Err(LogError::Sealed(self.shared.package_id));
      }
      if chunk.is_empty() {
        return Ok(());
      }
      if let Some(mirror) = buffer.mirror.as_mut()
        && let Err(err) = mirror.write_all(&chunk)
      {
        warn!(
          package = %self.shared.package_id,
          error = %err,
          "log file write failed, keeping the log in memory only"
        );
        buffer.mirror = None;
      }
      buffer.bytes += chunk.len();
      buffer.chunks.push(chunk);
    }
    self.shared.bump();
    Ok(())
  }

  pub fn write_line(&self, line: &str) -> Result<(), LogError> {
    let mut chunk = String::with_capacity(line.len() + 1);
    chunk.push_str(line);
    chunk.push('\n');
    self.write(chunk)
  }
}

/// Read side of a [`LogSink`].
///
/// Starts at the first chunk ever written, so a reader attaching mid-build
/// sees a gap-free view. Dropping a reader has no effect on the writer or
/// on other readers.
#[derive(Debug)]
pub struct LogReader {
  shared: Arc<Shared>,
  changes: watch::Receiver<u64>,
  position: usize,
}

impl LogReader {
  /// Next chunk, waiting for the writer if necessary. `None` once the sink
  /// is sealed and every chunk has been delivered.
  pub async fn next_chunk(&mut self) -> Option<Bytes> {
    loop {
      // Mark the current generation as seen before looking at the buffer, so
      // a write landing after the check still wakes `changed()` below.
      self.changes.borrow_and_update();

      {
        let buffer = self.shared.buffer();
        if let Some(chunk) = buffer.chunks.get(self.position) {
          self.position += 1;
          return Some(chunk.clone());
        }
        if buffer.sealed {
          return None;
        }
      }

      if self.changes.changed().await.is_err() {
        return None;
      }
    }
  }

  /// Drain the reader until end-of-stream.
  pub async fn read_to_end(mut self) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = self.next_chunk().await {
      out.extend_from_slice(&chunk);
    }
    out
  }
}
