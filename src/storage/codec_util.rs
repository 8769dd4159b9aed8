//! Index header and checksum footer shared by every segment file.
//!
//! Header: `magic u32 | codec name (vint len + bytes) | version u32 |
//! segment id (16 bytes) | suffix (u8 len + bytes)`.
//!
//! Footer: `!magic u32 | algorithm id u32 (0) | crc32 as u64`. The checksum
//! covers every byte before it, footer magic and algorithm id included.

use crate::error::{IrisError, Result};
use crate::storage::structured::{StructReader, StructWriter};

pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;
pub const ID_LENGTH: usize = 16;
pub const FOOTER_LENGTH: u64 = 16;

const CHECKSUM_ALGORITHM: u32 = 0;

/// Segment id, 16 random bytes.
pub type SegmentId = [u8; ID_LENGTH];

pub fn write_index_header(
    out: &mut StructWriter,
    codec: &str,
    version: u32,
    segment_id: &SegmentId,
    suffix: &str,
) -> Result<()> {
    if codec.is_empty() || codec.len() >= 128 || !codec.is_ascii() {
        return Err(IrisError::invalid_argument(format!(
            "codec name must be non-empty simple ASCII shorter than 128 bytes, got '{codec}'"
        )));
    }
    let suffix_len = u8::try_from(suffix.len()).map_err(|_| {
        IrisError::invalid_argument(format!("suffix '{suffix}' longer than 255 bytes"))
    })?;

    out.write_u32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_u32(version)?;
    out.write_bytes(segment_id)?;
    out.write_u8(suffix_len)?;
    out.write_bytes(suffix.as_bytes())
}

/// Byte length of a header written with these arguments.
pub fn index_header_length(codec: &str, suffix: &str) -> u64 {
    (4 + 1 + codec.len() + 4 + ID_LENGTH + 1 + suffix.len()) as u64
}

/// Validate the header at the reader's current position and return its version.
pub fn check_index_header(
    input: &mut StructReader,
    codec: &str,
    min_version: u32,
    max_version: u32,
    segment_id: &SegmentId,
    suffix: &str,
) -> Result<u32> {
    let magic = input.read_u32()?;
    if magic != CODEC_MAGIC {
        return Err(IrisError::corrupt(format!(
            "codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"
        )));
    }

    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(IrisError::corrupt(format!(
            "codec mismatch: actual codec={actual_codec} vs expected codec={codec}"
        )));
    }

    let version = input.read_u32()?;
    if version < min_version || version > max_version {
        return Err(IrisError::corrupt(format!(
            "index format version {version} outside supported range [{min_version}, {max_version}]"
        )));
    }

    let actual_id = input.read_exact_bytes(ID_LENGTH)?;
    if actual_id.as_slice() != segment_id {
        return Err(IrisError::corrupt(format!(
            "file mismatch, expected id={}, got={}",
            hex(segment_id),
            hex(&actual_id)
        )));
    }

    let suffix_len = input.read_u8()? as usize;
    let actual_suffix = input.read_exact_bytes(suffix_len)?;
    if actual_suffix != suffix.as_bytes() {
        return Err(IrisError::corrupt(format!(
            "file mismatch, expected suffix={suffix}, got={}",
            String::from_utf8_lossy(&actual_suffix)
        )));
    }

    Ok(version)
}

pub fn write_footer(out: &mut StructWriter) -> Result<()> {
    out.write_u32(FOOTER_MAGIC)?;
    out.write_u32(CHECKSUM_ALGORITHM)?;
    let checksum = out.checksum();
    out.write_u64(checksum)
}

/// Read the checksum stored in the footer, validating the footer's shape only.
pub fn retrieve_checksum(input: &mut StructReader) -> Result<u64> {
    if input.len() < FOOTER_LENGTH {
        return Err(IrisError::corrupt(format!(
            "misplaced codec footer (file truncated?): length={} but footerLength=={FOOTER_LENGTH}",
            input.len()
        )));
    }
    input.seek(input.len() - FOOTER_LENGTH)?;
    validate_footer(input)?;
    input.read_u64()
}

/// Recompute the whole-file checksum and compare it against the footer.
pub fn check_footer(input: &mut StructReader) -> Result<u64> {
    let expected = retrieve_checksum(input)?;
    let actual = input.checksum_prefix(input.len() - 8)?;
    if actual != expected {
        return Err(IrisError::corrupt(format!(
            "checksum failed (hardware problem?) : expected={expected:#x} actual={actual:#x}"
        )));
    }
    Ok(actual)
}

fn validate_footer(input: &mut StructReader) -> Result<()> {
    let magic = input.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(IrisError::corrupt(format!(
            "codec footer mismatch (file truncated?): actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"
        )));
    }
    let algorithm = input.read_u32()?;
    if algorithm != CHECKSUM_ALGORITHM {
        return Err(IrisError::corrupt(format!(
            "unknown checksum algorithm={algorithm}"
        )));
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    const ID: SegmentId = [7u8; ID_LENGTH];

    fn write_file(storage: &MemoryStorage, name: &str) {
        let mut out = StructWriter::new(storage.create_output(name).unwrap());
        write_index_header(&mut out, "SparseTerms", 1, &ID, "sfx").unwrap();
        assert_eq!(out.position(), index_header_length("SparseTerms", "sfx"));
        out.write_vlong(42).unwrap();
        write_footer(&mut out).unwrap();
        out.close().unwrap();
    }

    #[test]
    fn test_header_and_footer_validate() {
        let storage = MemoryStorage::default();
        write_file(&storage, "f");

        let mut input = StructReader::new(storage.open_input("f").unwrap()).unwrap();
        let version = check_index_header(&mut input, "SparseTerms", 1, 1, &ID, "sfx").unwrap();
        assert_eq!(version, 1);
        assert_eq!(input.read_vlong().unwrap(), 42);
        check_footer(&mut input).unwrap();
    }

    #[test]
    fn test_header_rejects_wrong_codec_and_id() {
        let storage = MemoryStorage::default();
        write_file(&storage, "f");

        let mut input = StructReader::new(storage.open_input("f").unwrap()).unwrap();
        assert!(check_index_header(&mut input, "Other", 1, 1, &ID, "sfx").is_err());

        let mut input = StructReader::new(storage.open_input("f").unwrap()).unwrap();
        assert!(check_index_header(&mut input, "SparseTerms", 1, 1, &[0u8; 16], "sfx").is_err());

        let mut input = StructReader::new(storage.open_input("f").unwrap()).unwrap();
        assert!(check_index_header(&mut input, "SparseTerms", 2, 3, &ID, "sfx").is_err());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let storage = MemoryStorage::default();
        write_file(&storage, "f");

        let mut bytes = storage.file_bytes("f").unwrap();
        let header_len = index_header_length("SparseTerms", "sfx") as usize;
        bytes[header_len] ^= 0x01;
        storage.replace_file("f", bytes);

        let mut input = StructReader::new(storage.open_input("f").unwrap()).unwrap();
        let err = check_footer(&mut input).unwrap_err();
        assert!(err.to_string().contains("checksum failed"));
    }

    #[test]
    fn test_truncated_file_has_no_footer() {
        let storage = MemoryStorage::default();
        storage.replace_file("t", vec![1, 2, 3]);
        let mut input = StructReader::new(storage.open_input("t").unwrap()).unwrap();
        assert!(retrieve_checksum(&mut input).is_err());
    }
}
