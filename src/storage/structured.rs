//! Typed binary reading and writing on top of storage streams.
//!
//! Fixed-width integers are big-endian. Variable-length integers use
//! [`crate::util::varint`]. The writer keeps a running CRC32 of every byte it
//! emits so that a checksum footer can be appended without re-reading the file.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{IrisError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// Writer for structured binary data.
pub struct StructWriter {
    output: Box<dyn StorageOutput>,
    position: u64,
    hasher: crc32fast::Hasher,
    scratch: Vec<u8>,
}

impl std::fmt::Debug for StructWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("output", &self.output)
            .field("position", &self.position)
            .finish()
    }
}

impl StructWriter {
    pub fn new(output: Box<dyn StorageOutput>) -> Self {
        StructWriter {
            output,
            position: 0,
            hasher: crc32fast::Hasher::new(),
            scratch: Vec::with_capacity(varint::MAX_VARINT_LEN),
        }
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.output.write_all(bytes)?;
        self.hasher.update(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.emit(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        (&mut buf[..]).write_u32::<BigEndian>(value)?;
        self.emit(&buf)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        (&mut buf[..]).write_u64::<BigEndian>(value)?;
        self.emit(&buf)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_u64(value as u64)
    }

    /// Variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        self.write_vlong(value as u64)
    }

    /// Variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        varint::encode_u64_into(value, &mut scratch);
        let result = self.emit(&scratch);
        self.scratch = scratch;
        result
    }

    /// Raw bytes, no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.emit(bytes)
    }

    /// VInt length followed by the bytes.
    pub fn write_len_prefixed(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| IrisError::invalid_argument("byte string longer than u32::MAX"))?;
        self.write_vint(len)?;
        self.emit(bytes)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_len_prefixed(value.as_bytes())
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC32 of every byte written so far.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    pub fn close(&mut self) -> Result<()> {
        self.output.close()
    }
}

/// Reader for structured binary data.
#[derive(Debug)]
pub struct StructReader {
    input: Box<dyn StorageInput>,
    len: u64,
}

impl StructReader {
    pub fn new(input: Box<dyn StorageInput>) -> Result<Self> {
        let len = input.size()?;
        Ok(StructReader { input, len })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.input.read_u8()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.input.read_u32::<BigEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.input.read_u64::<BigEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_vint(&mut self) -> Result<u32> {
        let value = self.read_vlong()?;
        u32::try_from(value)
            .map_err(|_| IrisError::corrupt(format!("VInt {value} does not fit in 32 bits")))
    }

    pub fn read_vlong(&mut self) -> Result<u64> {
        let mut buf = [0u8; varint::MAX_VARINT_LEN];
        for i in 0..varint::MAX_VARINT_LEN {
            buf[i] = self.read_u8()?;
            if buf[i] & 0x80 == 0 {
                let (value, _) = varint::decode_u64(&buf[..=i])?;
                return Ok(value);
            }
        }
        Err(IrisError::corrupt("VarInt overflow"))
    }

    pub fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.position()? + len as u64 > self.len {
            return Err(IrisError::corrupt(format!(
                "read of {len} bytes past end of file (length {})",
                self.len
            )));
        }
        let mut buf = vec![0u8; len];
        self.input.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_len_prefixed(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vint()? as usize;
        self.read_exact_bytes(len)
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_len_prefixed()?;
        String::from_utf8(bytes).map_err(|e| IrisError::corrupt(format!("invalid UTF-8: {e}")))
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.len {
            return Err(IrisError::corrupt(format!(
                "seek to {position} past end of file (length {})",
                self.len
            )));
        }
        self.input.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.input.stream_position()?)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// CRC32 of the first `len` bytes of the file. Leaves the cursor at `len`.
    pub fn checksum_prefix(&mut self, len: u64) -> Result<u64> {
        self.seek(0)?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            self.input.read_exact(&mut buf[..want])?;
            hasher.update(&buf[..want]);
            remaining -= want as u64;
        }
        Ok(hasher.finalize() as u64)
    }
}
