use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::log::QueryLogEntry;
use crate::error::{Result, SyncError};

/// Persistent storage for query log entries.
pub trait QueryLogStore: Send + Sync {
    fn save(&self, entry: &QueryLogEntry) -> Result<()>;

    fn get(&self, id: &Uuid) -> Result<Option<QueryLogEntry>>;

    /// Every stored entry, oldest first.
    fn list(&self) -> Result<Vec<QueryLogEntry>>;

    /// Entries sharing a `reference` grouping key, oldest first.
    fn by_reference(&self, reference: &str) -> Result<Vec<QueryLogEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|e| e.reference.as_deref() == Some(reference))
            .collect())
    }
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| SyncError::Storage("query log lock poisoned".to_string()))
}

#[derive(Default)]
pub struct MemoryQueryLogStore {
    entries: Mutex<Vec<QueryLogEntry>>,
}

impl MemoryQueryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueryLogStore for MemoryQueryLogStore {
    fn save(&self, entry: &QueryLogEntry) -> Result<()> {
        let mut stored = entry.clone();
        stored.raw_response = None;
        lock(&self.entries)?.push(stored);
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<QueryLogEntry>> {
        Ok(lock(&self.entries)?.iter().find(|e| &e.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<QueryLogEntry>> {
        Ok(lock(&self.entries)?.clone())
    }
}

/// Append-only JSON-lines file, one entry per line.
///
/// Lines that fail to parse are skipped on read so a torn final write does
/// not make the whole log unreadable.
pub struct JsonlQueryLogStore {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlQueryLogStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        if ends_mid_line(&mut file)? {
            // A torn tail from an interrupted save; start the next entry on its own line.
            tracing::warn!("[QUERYLOG] {} ends mid-line, terminating it", path.display());
            file.write_all(b"\n")?;
        }
        tracing::debug!("[QUERYLOG] opened {}", path.display());
        Ok(JsonlQueryLogStore {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<QueryLogEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueryLogEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        "[QUERYLOG] skipping line {} of {}: {}",
                        n + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl QueryLogStore for JsonlQueryLogStore {
    fn save(&self, entry: &QueryLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut writer = lock(&self.writer)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<QueryLogEntry>> {
        Ok(self.list()?.into_iter().find(|e| &e.id == id))
    }

    fn list(&self) -> Result<Vec<QueryLogEntry>> {
        // Hold the writer lock so a concurrent save is not read half-written.
        let _guard = lock(&self.writer)?;
        self.read_all()
    }
}

fn ends_mid_line(file: &mut File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
