//! Host storage implementations.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::MemoryHostStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteHostStore;
