//! Directory-backed storage.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the files.
    pub path: PathBuf,

    /// Memory-map files opened for reading instead of buffered reads.
    pub use_mmap: bool,

    /// fsync on close.
    pub sync_on_close: bool,

    /// Write buffer size in bytes.
    pub buffer_size: usize,
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            use_mmap: false,
            sync_on_close: true,
            buffer_size: 64 * 1024,
        }
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn with_sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }
}

/// Storage rooted at a directory.
#[derive(Debug)]
pub struct FileStorage {
    config: FileStorageConfig,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path).map_err(|e| {
            IrisError::storage(format!(
                "Failed to create storage directory {}: {e}",
                config.path.display()
            ))
        })?;
        Ok(FileStorage { config })
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.config.path.join(name)
    }

    /// Files are written under a temporary name and renamed into place on close.
    fn temp_path_of(&self, name: &str) -> PathBuf {
        self.config.path.join(format!("{name}.tmp"))
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.path_of(name);
        let file = File::open(&path)
            .map_err(|e| IrisError::storage(format!("Failed to open {}: {e}", path.display())))?;
        let size = file.metadata()?.len();

        if self.config.use_mmap && size > 0 {
            // Safety: files are immutable once published.
            let mmap = unsafe { Mmap::map(&file)? };
            return Ok(Box::new(MmapInput { mmap, position: 0 }));
        }

        Ok(Box::new(FileInput {
            reader: BufReader::new(file),
            size,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let temp_path = self.temp_path_of(name);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                IrisError::storage(format!("Failed to create {}: {e}", temp_path.display()))
            })?;

        Ok(Box::new(FileOutput {
            writer: Some(BufWriter::with_capacity(self.config.buffer_size, file)),
            temp_path,
            final_path: self.path_of(name),
            sync_on_close: self.config.sync_on_close,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_of(name).is_file()
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.path_of(name);
        fs::remove_file(&path)
            .map_err(|e| IrisError::storage(format!("Failed to delete {}: {e}", path.display())))
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && !name.ends_with(".tmp")
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.path_of(name))?.len())
    }
}

#[derive(Debug)]
struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

#[derive(Debug)]
struct MmapInput {
    mmap: Mmap,
    position: u64,
}

impl Read for MmapInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data: &[u8] = &self.mmap;
        if self.position as usize >= data.len() {
            return Ok(0);
        }
        let start = self.position as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for MmapInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.mmap.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl StorageInput for MmapInput {
    fn size(&self) -> Result<u64> {
        Ok(self.mmap.len() as u64)
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    sync_on_close: bool,
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(io::Error::other("write to closed output")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        if self.sync_on_close {
            writer.get_ref().sync_all()?;
        }
        drop(writer);
        fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_publish_read() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(FileStorageConfig::new(dir.path())).unwrap();

        let mut out = storage.create_output("seg_000001.sppo").unwrap();
        out.write_all(&[7u8; 100]).unwrap();
        assert!(!storage.file_exists("seg_000001.sppo"));
        out.close().unwrap();

        assert!(storage.file_exists("seg_000001.sppo"));
        assert_eq!(storage.list_files().unwrap(), vec!["seg_000001.sppo"]);
        assert_eq!(storage.file_size("seg_000001.sppo").unwrap(), 100);
    }

    #[test]
    fn test_mmap_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileStorageConfig::new(dir.path()).with_mmap(true);
        let storage = FileStorage::new(config).unwrap();

        let mut out = storage.create_output("m").unwrap();
        out.write_all(b"abcdef").unwrap();
        out.close().unwrap();

        let mut input = storage.open_input("m").unwrap();
        input.seek(SeekFrom::Start(2)).unwrap();
        let mut buf = [0u8; 2];
        input.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cd");
        assert_eq!(input.size().unwrap(), 6);
    }
}
