//! # LSM table builder
//!
//! Turns a sorted stream of versioned key-value entries into an immutable
//! on-disk table, the step shared by memtable flush and compaction in a
//! Log-Structured Merge-Tree engine.
//!
//! ## Core idea
//! A table only counts once it is fully written, synced, closed and
//! re-opened cleanly. Anything less leaves no file behind and an empty
//! descriptor, so the caller never registers a half-built table.
//!
//! ```no_run
//! use lsm_table::{flush_memtable, BuildContext, DiskEnv, MemTable, Options, TableCache};
//!
//! let dir = std::path::Path::new("/tmp/db");
//! let options = Options::default();
//! let cache = TableCache::new(dir, options.clone());
//! let ctx = BuildContext::new(dir, &DiskEnv, &options, &cache);
//!
//! let mut mem = MemTable::new(4 << 20);
//! mem.put(1, b"key", b"value");
//! let meta = flush_memtable(&ctx, &mem, 7, 0)?;
//! assert!(meta.has_table());
//! # Ok::<(), lsm_table::Error>(())
//! ```

pub mod bloom;
pub mod build;
pub mod comparator;
pub mod env;
pub mod error;
pub mod filename;
pub mod iterator;
pub mod memtable;
pub mod options;
pub mod sstable;
pub mod table;
pub mod types;

// Public re-exports for the top-level API
pub use build::{build_table, flush_memtable, BuildContext, BuildStage, SequenceBounds, SourceFault};
pub use comparator::{BytewiseComparator, Comparator, InternalKeyComparator};
pub use env::{DiskEnv, Env, WritableFile};
pub use error::{Error, Result};
pub use iterator::{MergingIterator, StorageIterator};
pub use memtable::MemTable;
pub use options::Options;
pub use sstable::{SSTable, SSTableMeta, TableCache};
pub use table::{TableVerifier, TableWriter, TableWriterFactory};
pub use types::{InternalKey, LookupResult, ValueType};
