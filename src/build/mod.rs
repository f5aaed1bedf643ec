//! Table build driver.
//!
//! Turns one ordered stream of internal entries (a memtable being flushed,
//! or the merged inputs of a compaction) into at most one table file, and
//! only keeps the file if it was written, synced, closed and re-opened
//! cleanly.
//!
//! ```text
//! Idle → Scanning → Finalizing → Syncing → Closing → Verifying → Committed
//!   └──────────┴──────────┴──────────┴─────────┴──────────┴──→ Discarded
//! ```
//!
//! Older versions of a user key are dropped while scanning only when no
//! snapshot can still observe them, that is when every sequence in the
//! source is newer than the newest (highest) sequence any open snapshot
//! can see.

mod guard;

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use tracing::{debug, info, trace, warn};

use crate::comparator::Comparator;
use crate::env::Env;
use crate::error::Result;
use crate::filename::table_file_name;
use crate::iterator::StorageIterator;
use crate::memtable::MemTable;
use crate::options::Options;
use crate::sstable::{SSTableMeta, SSTableWriterFactory};
use crate::table::{TableVerifier, TableWriter, TableWriterFactory};
use crate::types::{extract_user_key, InternalKey, ParsedInternalKey, MAX_SEQUENCE_NUMBER};

use guard::{OutputGuard, WriterGuard};

static DEFAULT_WRITER_FACTORY: SSTableWriterFactory = SSTableWriterFactory;

/// Collaborators of one build.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    /// Directory the table file is created in.
    pub dir: &'a Path,
    pub env: &'a dyn Env,
    pub options: &'a Options,
    /// Re-opens the finished file; usually the engine's `TableCache`.
    pub verifier: &'a dyn TableVerifier,
    pub writer_factory: &'a dyn TableWriterFactory,
}

impl<'a> BuildContext<'a> {
    /// Context writing SSTables.
    pub fn new(
        dir: &'a Path,
        env: &'a dyn Env,
        options: &'a Options,
        verifier: &'a dyn TableVerifier,
    ) -> Self {
        BuildContext {
            dir,
            env,
            options,
            verifier,
            writer_factory: &DEFAULT_WRITER_FACTORY,
        }
    }

    /// Use a different table format.
    pub fn with_writer_factory(mut self, factory: &'a dyn TableWriterFactory) -> Self {
        self.writer_factory = factory;
        self
    }
}

/// Sequence numbers that decide whether older versions may be purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceBounds {
    /// Newest (highest) sequence visible to any open snapshot.
    pub snapshot_watermark: u64,
    /// Smallest sequence number present in the source.
    pub earliest_in_source: u64,
}

impl SequenceBounds {
    pub fn new(snapshot_watermark: u64, earliest_in_source: u64) -> Self {
        SequenceBounds {
            snapshot_watermark,
            earliest_in_source,
        }
    }

    /// No snapshot can see any version older than the newest one per key.
    pub fn allows_purge(&self) -> bool {
        self.earliest_in_source > self.snapshot_watermark
    }
}

/// Where a build is in its life. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    Idle,
    Scanning,
    Finalizing,
    Syncing,
    Closing,
    Verifying,
    Committed,
    Discarded,
}

impl BuildStage {
    fn advance(&mut self, next: BuildStage) {
        debug_assert!(next > *self, "build stage moved backwards: {self:?} -> {next:?}");
        trace!(from = ?*self, to = ?next, "build stage");
        *self = next;
    }
}

/// A source that broke the ordering contract of the driver.
///
/// Raised as a panic payload (`std::panic::panic_any`) in debug builds;
/// release builds do not check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFault {
    /// Two versions of one user key without a strictly decreasing sequence.
    SequenceNotDescending {
        user_key: Vec<u8>,
        previous: u64,
        current: u64,
    },
    /// An entry older than the source claimed to contain.
    SequenceBelowEarliest { sequence: u64, earliest: u64 },
}

impl fmt::Display for SourceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFault::SequenceNotDescending {
                user_key,
                previous,
                current,
            } => write!(
                f,
                "versions of key {user_key:?} out of order: sequence {current} follows {previous}"
            ),
            SourceFault::SequenceBelowEarliest { sequence, earliest } => write!(
                f,
                "entry with sequence {sequence} is older than earliest sequence {earliest}"
            ),
        }
    }
}

fn check_source(holds: bool, fault: impl FnOnce() -> SourceFault) {
    if cfg!(debug_assertions) && !holds {
        std::panic::panic_any(fault());
    }
}

/// What the scan wrote.
struct ScanSummary {
    smallest: InternalKey,
    largest: InternalKey,
    written: u64,
    dropped: u64,
}

struct BuiltTable {
    file_size: u64,
    scan: ScanSummary,
}

/// Build table `meta.id` in `ctx.dir` from `source`.
///
/// The source is consumed from its first entry. `meta` is reset first and
/// filled in only when a non-empty table is committed. On every other
/// outcome (an empty source, or any failure) no file named after
/// `meta.id` is left behind and `meta` stays in its zero state.
///
/// Errors are reported in the order they happened: a failure while
/// writing wins over a later one, and the source's deferred status only
/// replaces an otherwise successful result.
///
/// # Panics
///
/// In debug builds, with a [`SourceFault`] payload when purging finds a
/// source that breaks the ordering contract. The partial file is removed
/// while unwinding.
pub fn build_table(
    ctx: &BuildContext<'_>,
    source: &mut dyn StorageIterator,
    meta: &mut SSTableMeta,
    bounds: SequenceBounds,
) -> Result<()> {
    meta.reset();
    ctx.options.validate()?;

    let file_number = meta.id;
    let path = table_file_name(ctx.dir, file_number);
    let purge = ctx.options.purge_redundant_kvs_while_flush && bounds.allows_purge();
    let mut stage = BuildStage::Idle;
    debug!(
        file_number,
        purge,
        snapshot_watermark = bounds.snapshot_watermark,
        earliest_in_source = bounds.earliest_in_source,
        "building table"
    );

    // A handle cached for an earlier table with this number is stale.
    ctx.verifier.evict(file_number);

    source.seek_to_first();
    let mut result = if source.is_valid() {
        let mut output = OutputGuard::new(ctx.env, &path);
        let written = write_table(ctx, source, &path, file_number, purge, bounds, &mut stage);
        output.disarm();
        written.map(Some)
    } else {
        Ok(None)
    };

    // A source may only learn of a read fault after it reports exhaustion.
    if result.is_ok() {
        if let Err(e) = source.status() {
            result = Err(e);
        }
    }

    match result {
        Ok(Some(table)) if table.file_size > 0 => {
            stage.advance(BuildStage::Committed);
            meta.file_size = table.file_size;
            meta.entry_count = table.scan.written;
            meta.smallest = Some(table.scan.smallest);
            meta.largest = Some(table.scan.largest);
            info!(
                file_number,
                file_size = table.file_size,
                entries = table.scan.written,
                dropped = table.scan.dropped,
                "table committed"
            );
            Ok(())
        }
        Ok(_) => {
            discard(ctx, &path, file_number);
            debug!(file_number, "nothing to write, no table produced");
            Ok(())
        }
        Err(e) => {
            warn!(file_number, stage = ?stage, error = %e, "table build failed, discarding output");
            stage.advance(BuildStage::Discarded);
            discard(ctx, &path, file_number);
            Err(e)
        }
    }
}

/// Flush a memtable into table `file_number`.
///
/// The memtable must order user keys the way `ctx.options.comparator` does.
/// An empty memtable produces no table and a zero descriptor.
pub fn flush_memtable(
    ctx: &BuildContext<'_>,
    memtable: &MemTable,
    file_number: u64,
    snapshot_watermark: u64,
) -> Result<SSTableMeta> {
    let mut meta = SSTableMeta::new(file_number);
    let earliest = memtable.earliest_sequence().unwrap_or(MAX_SEQUENCE_NUMBER);
    let mut iter = memtable.iter();
    build_table(
        ctx,
        &mut iter,
        &mut meta,
        SequenceBounds::new(snapshot_watermark, earliest),
    )?;
    Ok(meta)
}

fn write_table(
    ctx: &BuildContext<'_>,
    source: &mut dyn StorageIterator,
    path: &Path,
    file_number: u64,
    purge: bool,
    bounds: SequenceBounds,
    stage: &mut BuildStage,
) -> Result<BuiltTable> {
    let mut file = ctx.env.new_writable_file(path)?;
    stage.advance(BuildStage::Scanning);

    // The writer borrows the file; it is released at the end of this block
    // so the file can be synced and closed afterwards.
    let (scan, file_size) = {
        let mut writer = WriterGuard::new(ctx.writer_factory.new_writer(ctx.options, file.as_mut()));
        let scanned = if purge {
            copy_purging(writer.writer(), source, ctx.options.comparator.as_ref(), bounds)
        } else {
            copy_all(writer.writer(), source)
        };
        let scan = match scanned {
            Ok(scan) => scan,
            Err(e) => {
                writer.abandon();
                return Err(e);
            }
        };
        stage.advance(BuildStage::Finalizing);
        let file_size = writer.finish()?;
        (scan, file_size)
    };

    if !ctx.options.disable_data_sync {
        stage.advance(BuildStage::Syncing);
        if ctx.options.use_fsync {
            file.fsync()?;
        } else {
            file.sync()?;
        }
    }
    stage.advance(BuildStage::Closing);
    file.close()?;
    drop(file);

    // A zero-size result is never kept, so there is nothing to re-open.
    if file_size > 0 {
        stage.advance(BuildStage::Verifying);
        ctx.verifier.verify_table(file_number, file_size)?;
    }
    Ok(BuiltTable { file_size, scan })
}

/// Write every entry verbatim. The source must be valid.
fn copy_all<W: TableWriter + ?Sized>(
    writer: &mut W,
    source: &mut dyn StorageIterator,
) -> Result<ScanSummary> {
    let smallest = InternalKey::decode(source.key())?;
    let mut last_key = Vec::new();
    let mut written = 0u64;
    while source.is_valid() {
        writer.add(source.key(), source.value())?;
        last_key.clear();
        last_key.extend_from_slice(source.key());
        written += 1;
        source.next();
    }
    Ok(ScanSummary {
        smallest,
        largest: InternalKey::decode(&last_key)?,
        written,
        dropped: 0,
    })
}

/// Write only the newest version of each user key. The source must be
/// valid.
fn copy_purging<W: TableWriter + ?Sized>(
    writer: &mut W,
    source: &mut dyn StorageIterator,
    user_comparator: &dyn Comparator,
    bounds: SequenceBounds,
) -> Result<ScanSummary> {
    let mut pending_key = source.key().to_vec();
    let mut pending_value = source.value().to_vec();
    let first = ParsedInternalKey::decode(&pending_key)?;
    let smallest = first.to_owned();
    let mut pending_sequence = first.sequence;
    check_earliest(pending_sequence, bounds);

    let mut written = 0u64;
    let mut dropped = 0u64;
    source.next();
    while source.is_valid() {
        let key = source.key();
        let current = ParsedInternalKey::decode(key)?;
        check_earliest(current.sequence, bounds);

        if user_comparator.compare(extract_user_key(&pending_key), current.user_key) == Ordering::Equal {
            check_source(current.sequence < pending_sequence, || SourceFault::SequenceNotDescending {
                user_key: current.user_key.to_vec(),
                previous: pending_sequence,
                current: current.sequence,
            });
            dropped += 1;
        } else {
            writer.add(&pending_key, &pending_value)?;
            written += 1;
            pending_sequence = current.sequence;
            pending_key.clear();
            pending_key.extend_from_slice(key);
            pending_value.clear();
            pending_value.extend_from_slice(source.value());
        }
        source.next();
    }

    writer.add(&pending_key, &pending_value)?;
    written += 1;
    Ok(ScanSummary {
        smallest,
        largest: InternalKey::decode(&pending_key)?,
        written,
        dropped,
    })
}

fn check_earliest(sequence: u64, bounds: SequenceBounds) {
    check_source(sequence >= bounds.earliest_in_source, || {
        SourceFault::SequenceBelowEarliest {
            sequence,
            earliest: bounds.earliest_in_source,
        }
    });
}

/// Remove whatever was written for `file_number`.
fn discard(ctx: &BuildContext<'_>, path: &Path, file_number: u64) {
    ctx.verifier.evict(file_number);
    if ctx.env.file_exists(path) {
        if let Err(e) = ctx.env.remove_file(path) {
            warn!(file_number, path = %path.display(), error = %e, "failed to remove table file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DiskEnv;
    use crate::sstable::TableCache;
    use crate::types::ValueType;
    use tempfile::tempdir;

    #[test]
    fn purge_requires_every_version_newer_than_the_watermark() {
        assert!(SequenceBounds::new(99, 100).allows_purge());
        assert!(!SequenceBounds::new(100, 100).allows_purge());
        assert!(!SequenceBounds::new(150, 100).allows_purge());
    }

    #[test]
    fn stages_are_ordered() {
        let mut stage = BuildStage::Idle;
        stage.advance(BuildStage::Scanning);
        stage.advance(BuildStage::Finalizing);
        stage.advance(BuildStage::Closing);
        assert_eq!(stage, BuildStage::Closing);
        assert!(BuildStage::Verifying < BuildStage::Committed);
    }

    #[test]
    fn fault_messages_name_the_sequences() {
        let fault = SourceFault::SequenceNotDescending {
            user_key: b"k".to_vec(),
            previous: 5,
            current: 7,
        };
        let msg = fault.to_string();
        assert!(msg.contains('5') && msg.contains('7'));

        let fault = SourceFault::SequenceBelowEarliest {
            sequence: 3,
            earliest: 10,
        };
        assert!(fault.to_string().contains("10"));
    }

    #[test]
    fn flush_memtable_keeps_newest_versions() {
        let dir = tempdir().unwrap();
        let options = Options::default();
        let cache = TableCache::new(dir.path(), options.clone());
        let ctx = BuildContext::new(dir.path(), &DiskEnv, &options, &cache);

        let mut mem = MemTable::new(1 << 20);
        mem.put(10, b"a", b"a1");
        mem.put(11, b"a", b"a2");
        mem.delete(12, b"b");

        let meta = flush_memtable(&ctx, &mem, 4, 5).unwrap();
        assert!(meta.has_table());
        assert_eq!(meta.entry_count, 2);
        assert_eq!(
            meta.smallest,
            Some(InternalKey::new(b"a".to_vec(), 11, ValueType::Put))
        );
        assert_eq!(
            meta.largest,
            Some(InternalKey::new(b"b".to_vec(), 12, ValueType::Delete))
        );
        assert!(cache.contains(4));
    }

    #[test]
    fn empty_memtable_produces_no_file() {
        let dir = tempdir().unwrap();
        let options = Options::default();
        let cache = TableCache::new(dir.path(), options.clone());
        let ctx = BuildContext::new(dir.path(), &DiskEnv, &options, &cache);

        let meta = flush_memtable(&ctx, &MemTable::new(1024), 1, 0).unwrap();
        assert_eq!(meta, SSTableMeta::new(1));
        assert!(!table_file_name(dir.path(), 1).exists());
    }
}
