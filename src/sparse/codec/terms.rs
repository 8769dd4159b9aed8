//! The sparse terms directory (`.sptm`) and the on-disk reader over both
//! sparse files.
//!
//! ```text
//! header
//! VInt field count
//! per field: VInt field number, VLong term count,
//!            per term: VInt length, term bytes, VLong postings offset
//! i64 directory offset
//! footer
//! ```

use std::collections::BTreeMap;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{IrisError, Result};
use crate::sparse::cluster::PostingClusters;
use crate::sparse::codec::postings_file::read_clusters;
use crate::sparse::codec::segment::SegmentState;
use crate::sparse::codec::{
    POSTINGS_CODEC_NAME, POSTINGS_EXTENSION, TERMS_CODEC_NAME, TERMS_EXTENSION, VERSION_CURRENT,
    VERSION_START,
};
use crate::storage::codec_util::{
    FOOTER_LENGTH, check_footer, check_index_header, retrieve_checksum, write_footer,
    write_index_header,
};
use crate::storage::structured::{StructReader, StructWriter};

#[derive(Debug)]
pub struct SparseTermsWriter {
    out: StructWriter,
    dir_offset: u64,
    field_count: usize,
    fields_written: usize,
}

impl SparseTermsWriter {
    /// Create the terms file for a directory of `field_count` fields.
    pub fn create(state: &SegmentState, field_count: usize) -> Result<Self> {
        let output = state.storage.create_output(&state.file_name(TERMS_EXTENSION))?;
        let mut out = StructWriter::new(output);
        write_index_header(&mut out, TERMS_CODEC_NAME, VERSION_CURRENT, &state.segment.id, &state.suffix)?;
        let dir_offset = out.position();
        let count = u32::try_from(field_count)
            .map_err(|_| IrisError::invalid_argument(format!("too many sparse fields: {field_count}")))?;
        out.write_vint(count)?;
        Ok(SparseTermsWriter {
            out,
            dir_offset,
            field_count,
            fields_written: 0,
        })
    }

    /// Write one field's terms with their postings offsets.
    pub fn write_field(&mut self, number: u32, terms: &[(Vec<u8>, u64)]) -> Result<()> {
        if self.fields_written == self.field_count {
            return Err(IrisError::illegal_state(format!(
                "terms directory declared {} fields",
                self.field_count
            )));
        }
        self.out.write_vint(number)?;
        self.out.write_vlong(terms.len() as u64)?;
        for (term, offset) in terms {
            self.out.write_len_prefixed(term)?;
            self.out.write_vlong(*offset)?;
        }
        self.fields_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if self.fields_written != self.field_count {
            return Err(IrisError::illegal_state(format!(
                "terms directory declared {} fields but {} were written",
                self.field_count, self.fields_written
            )));
        }
        self.out.write_i64(self.dir_offset as i64)?;
        write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// Term directory and clustered postings of one segment, read from disk.
#[derive(Debug)]
pub struct SparseTermsReader {
    fields: AHashMap<String, BTreeMap<Vec<u8>, u64>>,
    terms_in: Mutex<StructReader>,
    postings_in: Mutex<StructReader>,
}

impl SparseTermsReader {
    pub fn open(state: &SegmentState) -> Result<Self> {
        let mut terms_in = StructReader::new(state.storage.open_input(&state.file_name(TERMS_EXTENSION))?)?;
        check_index_header(
            &mut terms_in,
            TERMS_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment.id,
            &state.suffix,
        )?;
        retrieve_checksum(&mut terms_in)?;
        seek_dir(&mut terms_in)?;

        let mut fields = AHashMap::new();
        let field_count = terms_in.read_vint()?;
        for _ in 0..field_count {
            let number = terms_in.read_vint()?;
            let field = state
                .field_by_number(number)
                .ok_or_else(|| IrisError::corrupt(format!("unknown field number {number} in terms directory")))?;
            let term_count = terms_in.read_vlong()?;
            let mut terms = BTreeMap::new();
            for _ in 0..term_count {
                let term = terms_in.read_len_prefixed()?;
                let offset = terms_in.read_vlong()?;
                terms.insert(term, offset);
            }
            fields.insert(field.name.clone(), terms);
        }

        let mut postings_in =
            StructReader::new(state.storage.open_input(&state.file_name(POSTINGS_EXTENSION))?)?;
        check_index_header(
            &mut postings_in,
            POSTINGS_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment.id,
            &state.suffix,
        )?;
        retrieve_checksum(&mut postings_in)?;

        Ok(SparseTermsReader {
            fields,
            terms_in: Mutex::new(terms_in),
            postings_in: Mutex::new(postings_in),
        })
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }

    /// Terms of `field` in byte order.
    pub fn terms(&self, field: &str) -> Vec<Vec<u8>> {
        self.fields
            .get(field)
            .map(|terms| terms.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Clusters of `term`; `None` for unknown terms and terms without clusters.
    pub fn read(&self, field: &str, term: &[u8]) -> Result<Option<PostingClusters>> {
        let Some(&offset) = self.fields.get(field).and_then(|terms| terms.get(term)) else {
            return Ok(None);
        };
        let clusters = read_clusters(&mut self.postings_in.lock(), offset)?;
        if clusters.is_empty() {
            return Ok(None);
        }
        Ok(Some(clusters))
    }

    /// Verify the checksums of both files.
    pub fn check_integrity(&self) -> Result<()> {
        check_footer(&mut self.terms_in.lock())?;
        check_footer(&mut self.postings_in.lock())?;
        Ok(())
    }
}

fn seek_dir(input: &mut StructReader) -> Result<()> {
    let pointer = input
        .len()
        .checked_sub(FOOTER_LENGTH + 8)
        .ok_or_else(|| IrisError::corrupt("terms file too short for a directory offset"))?;
    input.seek(pointer)?;
    let dir_offset = input.read_i64()?;
    let dir_offset = u64::try_from(dir_offset)
        .map_err(|_| IrisError::corrupt(format!("negative directory offset {dir_offset}")))?;
    input.seek(dir_offset)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sparse::cluster::{DocWeight, DocumentCluster};
    use crate::sparse::codec::postings_file::ClusteredPostingWriter;
    use crate::sparse::codec::segment::{FieldInfo, SegmentInfo};
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn state(storage: &Arc<MemoryStorage>) -> SegmentState {
        let storage: Arc<dyn Storage> = storage.clone();
        SegmentState::new(
            storage,
            SegmentInfo::new("_0", 10),
            vec![FieldInfo::new(0, "title"), FieldInfo::new(3, "body")],
        )
    }

    fn write(state: &SegmentState) {
        let mut postings = ClusteredPostingWriter::create(state).unwrap();
        let mut terms = SparseTermsWriter::create(state, 1).unwrap();
        let alpha = postings
            .write_clusters(&[DocumentCluster::new(
                vec![DocWeight::new(1, 5), DocWeight::new(2, 9)],
                None,
                true,
            )])
            .unwrap();
        let empty = postings.write_clusters(&[]).unwrap();
        terms
            .write_field(3, &[(b"alpha".to_vec(), alpha), (b"empty".to_vec(), empty)])
            .unwrap();
        postings.finish().unwrap();
        terms.finish().unwrap();
    }

    #[test]
    fn test_write_and_read() {
        let storage = Arc::new(MemoryStorage::default());
        let state = state(&storage);
        write(&state);

        let reader = SparseTermsReader::open(&state).unwrap();
        reader.check_integrity().unwrap();
        assert!(reader.has_field("body"));
        assert!(!reader.has_field("title"));
        assert_eq!(reader.terms("body"), vec![b"alpha".to_vec(), b"empty".to_vec()]);

        let clusters = reader.read("body", b"alpha").unwrap().unwrap();
        assert_eq!(
            clusters.doc_weights().collect::<Vec<_>>(),
            vec![DocWeight::new(1, 5), DocWeight::new(2, 9)]
        );
        assert!(reader.read("body", b"empty").unwrap().is_none());
        assert!(reader.read("body", b"missing").unwrap().is_none());
        assert!(reader.read("title", b"alpha").unwrap().is_none());
    }

    #[test]
    fn test_field_count_must_match() {
        let storage = Arc::new(MemoryStorage::default());
        let state = state(&storage);
        let mut terms = SparseTermsWriter::create(&state, 1).unwrap();
        terms.write_field(3, &[]).unwrap();
        assert!(terms.write_field(0, &[]).is_err());

        let short = SparseTermsWriter::create(&state, 2).unwrap();
        assert!(short.finish().is_err());
    }

    #[test]
    fn test_corruption_is_detected() {
        let storage = Arc::new(MemoryStorage::default());
        let state = state(&storage);
        write(&state);

        let mut bytes = storage.file_bytes("_0.sppo").unwrap();
        // Last byte of term data, just before the start pointer.
        let last = bytes.len() - FOOTER_LENGTH as usize - 9;
        bytes[last] ^= 0xff;
        storage.replace_file("_0.sppo", bytes);

        let reader = SparseTermsReader::open(&state).unwrap();
        let err = reader.check_integrity().unwrap_err();
        assert!(err.to_string().contains("checksum failed"));
    }

    #[test]
    fn test_wrong_segment_id_is_rejected() {
        let storage = Arc::new(MemoryStorage::default());
        let state = state(&storage);
        write(&state);

        let mut other = state.clone();
        other.segment = other.segment.clone().with_id([9u8; 16]);
        assert!(SparseTermsReader::open(&other).is_err());
    }
}
