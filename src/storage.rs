//! Pluggable storage backends for segment files.
//!
//! A [`Storage`] hands out named input and output streams. Segment writers only
//! ever see the trait, so the same code writes to memory in tests and to a
//! directory on disk in production.

pub mod codec_util;
pub mod file;
pub mod memory;
pub mod structured;

use std::fmt::Debug;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};

/// A readable, seekable stream over one stored file.
pub trait StorageInput: Read + Seek + Send + Debug {
    /// Total length of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable stream creating one stored file.
///
/// The file becomes visible to readers once the output is closed.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and make them durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush and publish the file. Calling it twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// A flat namespace of files.
pub trait Storage: Send + Sync + Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Whether a file with this name has been published.
    fn file_exists(&self, name: &str) -> bool;

    /// Remove a file. Removing a missing file is an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List every published file name, sorted.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Size in bytes of a published file.
    fn file_size(&self, name: &str) -> Result<u64>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    Memory(MemoryStorageConfig),
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Builds a [`Storage`] from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::new(config)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_memory_storage() {
        let storage = StorageFactory::create(StorageConfig::default()).unwrap();
        let mut out = storage.create_output("a.bin").unwrap();
        out.write_all(b"abc").unwrap();
        out.close().unwrap();

        assert!(storage.file_exists("a.bin"));
        assert_eq!(storage.file_size("a.bin").unwrap(), 3);
    }

    #[test]
    fn test_factory_creates_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::File(FileStorageConfig::new(dir.path()));
        let storage = StorageFactory::create(config).unwrap();

        let mut out = storage.create_output("b.bin").unwrap();
        out.write_all(b"hello").unwrap();
        out.close().unwrap();

        let mut input = storage.open_input("b.bin").unwrap();
        let mut buf = String::new();
        input.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
    }
}
