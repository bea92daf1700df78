//! JSON-lines file store.
//!
//! Each record is one line of JSON. Inserts append and flush; fetches read
//! the whole file, so this suits line histories of modest size. Blank lines
//! are ignored; a malformed line is skipped with a warning unless the store
//! is strict.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use extrusion_traits::{BoxError, ReadingStore, Timestamped};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Result, StoreError};
use crate::newest_first;

#[derive(Debug)]
pub struct JsonlStore<R> {
    path: PathBuf,
    strict: bool,
    write_lock: Mutex<()>,
    _r: PhantomData<fn() -> R>,
}

impl<R> JsonlStore<R> {
    /// Store backed by `path`. The file is created on first insert; a missing
    /// file reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
            write_lock: Mutex::new(()),
            _r: PhantomData,
        }
    }

    /// Fail fetches on malformed lines instead of skipping them.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<R: DeserializeOwned> JsonlStore<R> {
    /// Every record in file order.
    pub fn read_all(&self) -> Result<Vec<R>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let mut out = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<R>(&line) {
                Ok(r) => out.push(r),
                Err(source) if self.strict => {
                    return Err(StoreError::Decode {
                        path: self.path.clone(),
                        line: idx + 1,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = idx + 1, error = %e, "skipping malformed record");
                }
            }
        }
        Ok(out)
    }
}

impl<R: Serialize> JsonlStore<R> {
    pub fn append(&self, records: &[R]) -> Result<usize> {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let mut w = BufWriter::new(file);
        for r in records {
            serde_json::to_writer(&mut w, r)?;
            w.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }
        w.flush().map_err(|e| self.io_err(e))?;
        tracing::debug!(path = %self.path.display(), appended = records.len(), "jsonl store append");
        Ok(records.len())
    }
}

impl<R> ReadingStore<R> for JsonlStore<R>
where
    R: Serialize + DeserializeOwned + Timestamped,
{
    fn fetch_recent(&self, limit: usize) -> std::result::Result<Vec<R>, BoxError> {
        let mut all = self.read_all()?;
        newest_first(&mut all);
        all.truncate(limit);
        Ok(all)
    }

    fn insert(&self, records: &[R]) -> std::result::Result<usize, BoxError> {
        Ok(self.append(records)?)
    }
}
