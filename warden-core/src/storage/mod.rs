//! Key-value storage used for client-side state
//!
//! Every operation is fallible: quota limits, read-only mounts and
//! corrupted files all surface as [`StorageError`]. [`ResilientStore`] wraps
//! a primary store and keeps serving from memory when it fails.

pub mod file;
pub mod memory;
pub mod resilient;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use resilient::ResilientStore;

use crate::core::StorageError;

pub type StorageResult<T> = Result<T, StorageError>;

/// Fallible string key-value store
pub trait KeyValueStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> StorageResult<()>;

    fn keys(&self) -> StorageResult<Vec<String>>;

    fn clear_all(&self) -> StorageResult<()>;
}

/// Receives fault signals from components that degrade instead of failing
pub trait FaultSink: Send + Sync {
    fn report_fault(&self, source: &str);
}

/// Remove every key that does not contain one of `preserve` as a substring
///
/// Returns the number of keys removed. Stops at the first failing removal.
pub fn purge_except(store: &dyn KeyValueStore, preserve: &[String]) -> StorageResult<usize> {
    let mut removed = 0;
    for key in store.keys()? {
        if preserve.iter().any(|p| key.contains(p.as_str())) {
            continue;
        }
        store.remove(&key)?;
        removed += 1;
    }
    Ok(removed)
}
