/// This module provides a keyset paging item reader over any page source.
pub mod paging;

/// This module provides an in-memory page source and a transactional in-memory writer.
pub mod memory;

#[cfg(feature = "logger")]
/// This module provides a logger item writer reporting chunk sizes.
pub mod logger;

#[cfg(feature = "rdbc")]
/// This module provides keyset queries, page sources and writers for SQL databases.
pub mod rdbc;
