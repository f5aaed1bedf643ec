// Shared fixtures for table build tests: a fault-injecting Env, a writer
// factory that fails on demand, verifiers, and in-memory sources.
#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use lsm_table::env::{DiskEnv, Env, WritableFile};
use lsm_table::error::{Error, Result};
use lsm_table::iterator::StorageIterator;
use lsm_table::options::Options;
use lsm_table::sstable::SSTableBuilder;
use lsm_table::table::{TableVerifier, TableWriter, TableWriterFactory};
use lsm_table::types::{encode_internal_key, ValueType};
use parking_lot::Mutex;

pub fn injected(what: &str) -> Error {
    Error::Io(io::Error::other(format!("injected {what} failure")))
}

pub fn put(user: &[u8], seq: u64, value: &[u8]) -> (Vec<u8>, Vec<u8>) {
    (encode_internal_key(user, seq, ValueType::Put), value.to_vec())
}

pub fn del(user: &[u8], seq: u64) -> (Vec<u8>, Vec<u8>) {
    (encode_internal_key(user, seq, ValueType::Delete), Vec::new())
}

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Where the fault-injecting env fails or damages the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Create,
    /// Fail the n-th append (0-based) and every append after it.
    Append(usize),
    Sync,
    Fsync,
    Close,
    /// Close succeeds, then one byte of the index block is flipped.
    CorruptIndexAfterClose,
    /// Close succeeds, then one byte of the first data block is flipped.
    CorruptDataAfterClose,
    /// Close succeeds, then the last byte is cut off.
    TruncateAfterClose,
}

/// File operation as seen by the env.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Append,
    Flush,
    Sync,
    Fsync,
    Close,
}

/// `DiskEnv` wrapper with one optional fault and a log of file operations.
#[derive(Default)]
pub struct FaultyEnv {
    fault: Option<Fault>,
    ops: Arc<Mutex<Vec<FileOp>>>,
    removed: Mutex<Vec<PathBuf>>,
}

impl FaultyEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(fault: Fault) -> Self {
        FaultyEnv {
            fault: Some(fault),
            ..Self::default()
        }
    }

    pub fn ops(&self) -> Vec<FileOp> {
        self.ops.lock().clone()
    }

    /// Operations other than appends and flushes, in order.
    pub fn durability_ops(&self) -> Vec<FileOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, FileOp::Append | FileOp::Flush))
            .collect()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().clone()
    }
}

impl Env for FaultyEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        if self.fault == Some(Fault::Create) {
            return Err(injected("create"));
        }
        Ok(Box::new(FaultyFile {
            inner: DiskEnv.new_writable_file(path)?,
            path: path.to_path_buf(),
            fault: self.fault,
            appends: 0,
            ops: Arc::clone(&self.ops),
        }))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.removed.lock().push(path.to_path_buf());
        DiskEnv.remove_file(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        DiskEnv.file_exists(path)
    }
}

struct FaultyFile {
    inner: Box<dyn WritableFile>,
    path: PathBuf,
    fault: Option<Fault>,
    appends: usize,
    ops: Arc<Mutex<Vec<FileOp>>>,
}

impl FaultyFile {
    fn flip_byte(&self, from_end: Option<usize>) -> Result<()> {
        let mut bytes = fs::read(&self.path)?;
        let at = match from_end {
            Some(n) => bytes.len() - n,
            None => 10,
        };
        bytes[at] ^= 0xFF;
        fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl WritableFile for FaultyFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.ops.lock().push(FileOp::Append);
        let n = self.appends;
        self.appends += 1;
        if matches!(self.fault, Some(Fault::Append(at)) if n >= at) {
            return Err(injected("append"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> Result<()> {
        self.ops.lock().push(FileOp::Flush);
        self.inner.flush()
    }

    fn sync(&mut self) -> Result<()> {
        self.ops.lock().push(FileOp::Sync);
        if self.fault == Some(Fault::Sync) {
            return Err(injected("sync"));
        }
        self.inner.sync()
    }

    fn fsync(&mut self) -> Result<()> {
        self.ops.lock().push(FileOp::Fsync);
        if self.fault == Some(Fault::Fsync) {
            return Err(injected("fsync"));
        }
        self.inner.fsync()
    }

    fn close(&mut self) -> Result<()> {
        self.ops.lock().push(FileOp::Close);
        if self.fault == Some(Fault::Close) {
            self.inner.close()?;
            return Err(injected("close"));
        }
        self.inner.close()?;
        match self.fault {
            // Footer is 40 bytes and the index CRC 4 more; land inside the index.
            Some(Fault::CorruptIndexAfterClose) => self.flip_byte(Some(48)),
            Some(Fault::CorruptDataAfterClose) => self.flip_byte(None),
            Some(Fault::TruncateAfterClose) => {
                let file = OpenOptions::new().write(true).open(&self.path)?;
                let len = file.metadata()?.len();
                file.set_len(len - 1)?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Counts writer releases; optionally fails `add` or `finish`.
#[derive(Default)]
pub struct FlakyWriterFactory {
    pub fail_add_at: Option<u64>,
    pub fail_finish: bool,
    /// Report this size from `finish` instead of the real one.
    pub finish_size: Option<u64>,
    pub finished: Arc<AtomicU32>,
    pub abandoned: Arc<AtomicU32>,
}

impl FlakyWriterFactory {
    pub fn finished(&self) -> u32 {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> u32 {
        self.abandoned.load(Ordering::SeqCst)
    }
}

impl TableWriterFactory for FlakyWriterFactory {
    fn new_writer<'a>(
        &self,
        options: &Options,
        file: &'a mut dyn WritableFile,
    ) -> Box<dyn TableWriter + 'a> {
        Box::new(FlakyWriter {
            inner: SSTableBuilder::new(options, file),
            fail_add_at: self.fail_add_at,
            fail_finish: self.fail_finish,
            finish_size: self.finish_size,
            finished: Arc::clone(&self.finished),
            abandoned: Arc::clone(&self.abandoned),
        })
    }
}

struct FlakyWriter<'a> {
    inner: SSTableBuilder<'a>,
    fail_add_at: Option<u64>,
    fail_finish: bool,
    finish_size: Option<u64>,
    finished: Arc<AtomicU32>,
    abandoned: Arc<AtomicU32>,
}

impl TableWriter for FlakyWriter<'_> {
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.fail_add_at == Some(self.inner.num_entries()) {
            return Err(injected("add"));
        }
        self.inner.add(key, value)
    }

    fn finish(&mut self) -> Result<u64> {
        if self.fail_finish {
            return Err(injected("finish"));
        }
        let size = self.inner.finish()?;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(self.finish_size.unwrap_or(size))
    }

    fn abandon(&mut self) {
        self.abandoned.fetch_add(1, Ordering::SeqCst);
        self.inner.abandon();
    }

    fn num_entries(&self) -> u64 {
        self.inner.num_entries()
    }

    fn file_size(&self) -> u64 {
        self.inner.file_size()
    }
}

// ---------------------------------------------------------------------------
// Verifiers
// ---------------------------------------------------------------------------

/// Rejects every table.
pub struct RejectingVerifier;

impl TableVerifier for RejectingVerifier {
    fn verify_table(&self, _file_number: u64, _file_size: u64) -> Result<()> {
        Err(Error::Corruption("injected verification failure".into()))
    }
}

/// Wraps another verifier and records what it was asked.
pub struct RecordingVerifier<'a> {
    pub inner: &'a dyn TableVerifier,
    pub verified: Mutex<Vec<(u64, u64)>>,
    pub evicted: Mutex<Vec<u64>>,
}

impl<'a> RecordingVerifier<'a> {
    pub fn new(inner: &'a dyn TableVerifier) -> Self {
        RecordingVerifier {
            inner,
            verified: Mutex::new(Vec::new()),
            evicted: Mutex::new(Vec::new()),
        }
    }
}

impl TableVerifier for RecordingVerifier<'_> {
    fn verify_table(&self, file_number: u64, file_size: u64) -> Result<()> {
        self.verified.lock().push((file_number, file_size));
        self.inner.verify_table(file_number, file_size)
    }

    fn evict(&self, file_number: u64) {
        self.evicted.lock().push(file_number);
        self.inner.evict(file_number);
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// In-memory source. Can stop early, or report a deferred error once
/// exhausted.
pub struct VecSource {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pos: usize,
    /// Entries served before the source pretends to hit a read fault.
    fail_after: Option<usize>,
    deferred: Option<Error>,
}

impl VecSource {
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        VecSource {
            entries,
            pos: 0,
            fail_after: None,
            deferred: None,
        }
    }

    /// Serve `n` entries, then stop and report a corruption.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Serve everything, then report `error` from `status()`.
    pub fn with_deferred_error(mut self, error: Error) -> Self {
        self.deferred = Some(error);
        self
    }

    fn limit(&self) -> usize {
        self.fail_after.map_or(self.entries.len(), |n| n.min(self.entries.len()))
    }
}

impl StorageIterator for VecSource {
    fn key(&self) -> &[u8] {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }

    fn is_valid(&self) -> bool {
        self.pos < self.limit()
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn seek_to_first(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.pos = self.entries.partition_point(|(k, _)| k.as_slice() < key);
    }

    fn status(&self) -> Result<()> {
        if let Some(e) = &self.deferred {
            return Err(e.clone());
        }
        if self.fail_after.is_some_and(|n| n < self.entries.len() && self.pos >= n) {
            return Err(Error::Corruption("injected source read failure".into()));
        }
        Ok(())
    }
}
