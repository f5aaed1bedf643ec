pub mod block;
pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;
pub mod table_cache;

pub use builder::{SSTableBuilder, SSTableWriterFactory};
pub use footer::SSTableMeta;
pub use iterator::SSTableIterator;
pub use reader::SSTable;
pub use table_cache::TableCache;
