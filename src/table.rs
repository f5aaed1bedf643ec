//! Contracts between the table build driver and the components that encode
//! and validate table files.

use crate::env::WritableFile;
use crate::error::Result;
use crate::options::Options;

/// Encodes an ordered stream of entries into a table file.
///
/// Keys passed to `add` must be strictly increasing under the internal key
/// ordering. Exactly one of `finish` or `abandon` ends the writer's life;
/// after either, every call fails or is a no-op.
pub trait TableWriter {
    /// Append one entry.
    fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Flush remaining blocks, index and footer. Returns the final file size.
    fn finish(&mut self) -> Result<u64>;

    /// Drop buffered state without writing anything further.
    fn abandon(&mut self);

    /// Entries added so far.
    fn num_entries(&self) -> u64;

    /// Bytes handed to the file so far.
    fn file_size(&self) -> u64;
}

/// Creates table writers over a freshly created output file.
pub trait TableWriterFactory: Send + Sync {
    fn new_writer<'a>(
        &self,
        options: &Options,
        file: &'a mut dyn WritableFile,
    ) -> Box<dyn TableWriter + 'a>;
}

/// Re-opens a just-written table and checks that it is structurally sound.
pub trait TableVerifier: Send + Sync {
    /// Open table `file_number` of `file_size` bytes; any error means the
    /// file must not be registered.
    fn verify_table(&self, file_number: u64, file_size: u64) -> Result<()>;

    /// Forget any cached handle for `file_number` (its file is being deleted).
    fn evict(&self, _file_number: u64) {}
}
