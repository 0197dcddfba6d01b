//! Append-only key-value log
//!
//! One record per line, `KEY SP VALUE LF`; keys and values carry no
//! whitespace. Records are never modified in place: a re-set appends a new
//! record and repoints the index, a removal only tombstones the index.
//! Startup rebuilds index and filter with a single forward scan, so the
//! file needs no header. Space is reclaimed by [`compact`](LogStore::compact).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::filter::CountingFilter;
use super::index::KeyIndex;

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactionStats {
  pub kept: usize,
  pub dropped: usize,
  pub live_bytes: u64,
}

struct LogState {
  index: KeyIndex,
  filter: CountingFilter,
}

/// Disk-backed fallback store for entries evicted from the cache.
///
/// Lock discipline: `file` guards the shared read/append handle, `state`
/// guards index and filter. Paths that need both take `file` before
/// `state`; readers take them one at a time, never nested the other way.
pub struct LogStore {
  path: PathBuf,
  filter_buckets: usize,
  file: Mutex<File>,
  state: Mutex<LogState>,
  dirty: AtomicU64,
}

impl LogStore {
  /// Open or create the log at `path` and rebuild index and filter from
  /// the records already on disk.
  pub fn open(path: impl AsRef<Path>, filter_buckets: usize) -> io::Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .open(&path)?;

    let mut index = KeyIndex::new();
    let mut filter = CountingFilter::new(filter_buckets);

    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut file);
    let mut offset = 0u64;
    let mut line = String::new();
    loop {
      line.clear();
      let n = reader.read_line(&mut line)?;
      if n == 0 {
        break;
      }
      if let Some((key, _)) = split_record(&line) {
        index.insert(key, offset);
        filter.insert(key);
      }
      offset += n as u64;
    }

    Ok(Self {
      path,
      filter_buckets,
      file: Mutex::new(file),
      state: Mutex::new(LogState { index, filter }),
      dirty: AtomicU64::new(0),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Appends accumulated since the last compaction.
  pub fn dirty(&self) -> u64 {
    self.dirty.load(Ordering::Relaxed)
  }

  /// Number of live keys.
  pub fn live_len(&self) -> usize {
    self.state.lock().live_len()
  }

  /// Append a record and point the index at it.
  pub fn insert(&self, key: &str, value: &str) -> io::Result<()> {
    let mut file = self.file.lock();
    let offset = file.seek(SeekFrom::End(0))?;
    file.write_all(format!("{} {}\n", key, value).as_bytes())?;
    file.flush()?;

    // Index update stays inside the file lock so two appends for the same
    // key cannot publish their offsets out of order.
    let mut state = self.state.lock();
    state.index.insert(key, offset);
    state.filter.insert(key);
    drop(state);
    drop(file);

    self.dirty.fetch_add(1, Ordering::Relaxed);
    Ok(())
  }

  /// Fetch the latest value for `key`, or `None` if absent or tombstoned.
  ///
  /// The record's key token is checked against the requested key; a
  /// mismatch means the index points at a stale or corrupt offset, so the
  /// entry is dropped and the lookup reports a miss.
  pub fn get(&self, key: &str) -> io::Result<Option<String>> {
    let offset = {
      let state = self.state.lock();
      if !state.filter.contains(key) {
        return Ok(None);
      }
      match state.index.search(key) {
        Some(offset) => offset,
        None => return Ok(None),
      }
    };

    let line = {
      let mut file = self.file.lock();
      file.seek(SeekFrom::Start(offset))?;
      let mut reader = BufReader::new(&mut *file);
      let mut line = String::new();
      reader.read_line(&mut line)?;
      line
    };

    match split_record(&line) {
      Some((stored_key, value)) if stored_key == key => Ok(Some(value.to_string())),
      _ => {
        tracing::warn!(
          "log record at offset {} does not match key {:?}, dropping index entry",
          offset,
          key
        );
        let mut state = self.state.lock();
        if state.index.remove(key) {
          state.filter.remove(key);
        }
        Ok(None)
      }
    }
  }

  /// Tombstone `key`. Returns whether a live record was removed. The stale
  /// record stays on disk until the next compaction.
  pub fn remove(&self, key: &str) -> bool {
    let removed = {
      let mut state = self.state.lock();
      if state.index.remove(key) {
        state.filter.remove(key);
        true
      } else {
        false
      }
    };
    if removed {
      self.dirty.fetch_add(1, Ordering::Relaxed);
    }
    removed
  }

  /// Rewrite the log keeping only the latest live record per key, then
  /// atomically replace the live file and swap in a freshly built index
  /// and filter. Any I/O error aborts the pass and leaves the live file
  /// untouched.
  pub fn compact(&self) -> io::Result<CompactionStats> {
    let rewrite_path = self.path.with_extension("rewrite");
    let result = self.rewrite_into(&rewrite_path);
    if result.is_err() {
      let _ = fs::remove_file(&rewrite_path);
    }
    result
  }

  fn rewrite_into(&self, rewrite_path: &Path) -> io::Result<CompactionStats> {
    let scan_len = self.file.lock().metadata()?.len();

    let mut rewrite = File::create(rewrite_path)?;
    let mut new_index = KeyIndex::new();
    let mut new_filter = CountingFilter::new(self.filter_buckets);
    let mut stats = CompactionStats::default();

    // Scan through an independent handle so reads and appends keep flowing.
    let mut reader = BufReader::new(File::open(&self.path)?);
    let mut offset = 0u64;
    let mut line = String::new();
    while offset < scan_len {
      line.clear();
      let n = reader.read_line(&mut line)?;
      if n == 0 {
        break;
      }
      self.retain_record(
        &line,
        offset,
        &mut rewrite,
        &mut new_index,
        &mut new_filter,
        &mut stats,
      )?;
      offset += n as u64;
    }

    // Swap point: drain whatever was appended during the scan, then move
    // the rewritten file into place and republish index and filter.
    let mut file = self.file.lock();
    let mut state = self.state.lock();

    file.seek(SeekFrom::Start(offset))?;
    let mut tail = BufReader::new(&mut *file);
    loop {
      line.clear();
      let n = tail.read_line(&mut line)?;
      if n == 0 {
        break;
      }
      // `state` is already held, so check liveness against it directly.
      match split_record(&line) {
        Some((key, _)) if state.index.search(key) == Some(offset) => {
          new_index.insert(key, stats.live_bytes);
          new_filter.insert(key);
          rewrite.write_all(line.as_bytes())?;
          stats.kept += 1;
          stats.live_bytes += n as u64;
        }
        _ => stats.dropped += 1,
      }
      offset += n as u64;
    }

    rewrite.flush()?;
    rewrite.sync_all()?;
    drop(rewrite);

    fs::rename(rewrite_path, &self.path)?;
    *file = OpenOptions::new().read(true).write(true).open(&self.path)?;
    state.index = new_index;
    state.filter = new_filter;
    self.dirty.store(0, Ordering::Relaxed);

    Ok(stats)
  }

  fn retain_record(
    &self,
    line: &str,
    offset: u64,
    rewrite: &mut File,
    new_index: &mut KeyIndex,
    new_filter: &mut CountingFilter,
    stats: &mut CompactionStats,
  ) -> io::Result<()> {
    match split_record(line) {
      Some((key, _)) if self.state.lock().index.search(key) == Some(offset) => {
        new_index.insert(key, stats.live_bytes);
        new_filter.insert(key);
        rewrite.write_all(line.as_bytes())?;
        stats.kept += 1;
        stats.live_bytes += line.len() as u64;
      }
      _ => stats.dropped += 1,
    }
    Ok(())
  }
}

impl LogState {
  fn live_len(&self) -> usize {
    self.index.live_len()
  }
}

fn split_record(line: &str) -> Option<(&str, &str)> {
  let line = line.strip_suffix('\n').unwrap_or(line);
  let (key, value) = line.split_once(' ')?;
  if key.is_empty() {
    return None;
  }
  Some((key, value))
}
