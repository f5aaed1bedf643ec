use std::path::{Path, PathBuf};

/// Extension of table files.
pub const TABLE_EXTENSION: &str = "sst";

/// Path of the table file with the given number inside `dir`.
pub fn table_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number:06}.{TABLE_EXTENSION}"))
}
