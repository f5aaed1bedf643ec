use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Handle to a file being written sequentially.
///
/// Two layers of buffering sit between `append` and the disk:
///   flush()           → user-space buffer → OS page cache
///   sync() / fsync()  → OS page cache     → physical disk
///
/// Each step is independently fallible. After `close` every call fails.
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Push buffered bytes to the OS.
    fn flush(&mut self) -> Result<()>;

    /// Lighter durability sync: file data only (fdatasync).
    fn sync(&mut self) -> Result<()>;

    /// Full durability sync: data and metadata (fsync).
    fn fsync(&mut self) -> Result<()>;

    /// Flush and release the handle.
    fn close(&mut self) -> Result<()>;
}

/// File-system access used by the table builder.
pub trait Env: Send + Sync {
    /// Create (or truncate) a file for writing.
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    /// Delete a file.
    fn remove_file(&self, path: &Path) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;
}

/// `Env` backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskEnv;

impl Env for DiskEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        Ok(Box::new(DiskWritableFile::create(path)?))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Buffered writer over a local file.
pub struct DiskWritableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl DiskWritableFile {
    /// Create the file with truncate mode, so any existing file at this
    /// path is overwritten.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(DiskWritableFile {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or(Error::Closed("writable file"))
    }
}

impl WritableFile for DiskWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer()?.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    fn fsync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut writer = self.writer.take().ok_or(Error::Closed("writable file"))?;
        writer.flush()?;
        // The handle is released when `writer` drops here.
        Ok(())
    }
}
