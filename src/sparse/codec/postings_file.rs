//! The clustered postings file (`.sppo`).
//!
//! ```text
//! header
//! per term:  VLong cluster count
//!            per cluster: VLong size, size * (VInt doc, u8 weight),
//!                         u8 should_not_skip, VLong summary size,
//!                         summary size * (VInt token, u8 weight)
//! i64 start of term data
//! footer
//! ```

use crate::error::{IrisError, Result};
use crate::sparse::cluster::{DocWeight, DocumentCluster, PostingClusters};
use crate::sparse::codec::segment::SegmentState;
use crate::sparse::codec::{POSTINGS_CODEC_NAME, POSTINGS_EXTENSION, VERSION_CURRENT};
use crate::sparse::vector::SparseVector;
use crate::storage::codec_util::{write_footer, write_index_header};
use crate::storage::structured::{StructReader, StructWriter};

/// Preallocation cap for counts read from disk.
const MAX_PREALLOCATION: usize = 4096;

#[derive(Debug)]
pub struct ClusteredPostingWriter {
    out: StructWriter,
    start_fp: u64,
}

impl ClusteredPostingWriter {
    pub fn create(state: &SegmentState) -> Result<Self> {
        let output = state.storage.create_output(&state.file_name(POSTINGS_EXTENSION))?;
        let mut out = StructWriter::new(output);
        write_index_header(
            &mut out,
            POSTINGS_CODEC_NAME,
            VERSION_CURRENT,
            &state.segment.id,
            &state.suffix,
        )?;
        let start_fp = out.position();
        Ok(ClusteredPostingWriter { out, start_fp })
    }

    /// Append the clusters of one term and return the offset they start at.
    pub fn write_clusters(&mut self, clusters: &[DocumentCluster]) -> Result<u64> {
        let offset = self.out.position();
        self.out.write_vlong(clusters.len() as u64)?;
        for cluster in clusters {
            self.out.write_vlong(cluster.len() as u64)?;
            for posting in &cluster.docs {
                let doc = u32::try_from(posting.doc).map_err(|_| {
                    IrisError::illegal_state(format!("cannot write negative doc id {}", posting.doc))
                })?;
                self.out.write_vint(doc)?;
                self.out.write_u8(posting.weight)?;
            }
            self.out.write_u8(u8::from(cluster.should_not_skip))?;
            match &cluster.summary {
                None => self.out.write_vlong(0)?,
                Some(summary) => {
                    self.out.write_vlong(summary.len() as u64)?;
                    for (token, weight) in summary.items() {
                        self.out.write_vint(token)?;
                        self.out.write_u8(weight)?;
                    }
                }
            }
        }
        Ok(offset)
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.write_i64(self.start_fp as i64)?;
        write_footer(&mut self.out)?;
        self.out.close()
    }
}

/// Read the clusters of one term starting at `offset`.
pub fn read_clusters(input: &mut StructReader, offset: u64) -> Result<PostingClusters> {
    input.seek(offset)?;
    let count = read_count(input)?;
    let mut clusters = Vec::with_capacity(count.min(MAX_PREALLOCATION));
    for _ in 0..count {
        let size = read_count(input)?;
        let mut docs = Vec::with_capacity(size.min(MAX_PREALLOCATION));
        for _ in 0..size {
            let doc = input.read_vint()?;
            let doc = i32::try_from(doc)
                .map_err(|_| IrisError::corrupt(format!("doc id {doc} out of range")))?;
            docs.push(DocWeight::new(doc, input.read_u8()?));
        }
        let should_not_skip = input.read_u8()? == 1;
        let summary_size = read_count(input)?;
        let mut items = Vec::with_capacity(summary_size.min(MAX_PREALLOCATION));
        for _ in 0..summary_size {
            items.push((input.read_vint()?, input.read_u8()?));
        }
        let summary = if items.is_empty() {
            None
        } else {
            Some(SparseVector::new(items))
        };
        clusters.push(DocumentCluster::new(docs, summary, should_not_skip));
    }
    Ok(PostingClusters::new(clusters))
}

fn read_count(input: &mut StructReader) -> Result<usize> {
    let count = input.read_vlong()?;
    if count > input.len() {
        return Err(IrisError::corrupt(format!(
            "count {count} exceeds file length {}",
            input.len()
        )));
    }
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sparse::codec::segment::SegmentInfo;
    use crate::storage::codec_util::{check_footer, check_index_header};
    use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};
    use crate::storage::Storage;

    #[test]
    fn test_clusters_round_trip() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let state = SegmentState::new(storage.clone(), SegmentInfo::new("_0", 10), vec![]);

        let first = vec![
            DocumentCluster::new(
                vec![DocWeight::new(1, 5), DocWeight::new(300, 250)],
                Some(SparseVector::new(vec![(7, 200), (1000, 3)])),
                false,
            ),
            DocumentCluster::new(vec![DocWeight::new(4, 1)], None, true),
        ];
        let mut writer = ClusteredPostingWriter::create(&state).unwrap();
        let empty_offset = writer.write_clusters(&[]).unwrap();
        let offset = writer.write_clusters(&first).unwrap();
        writer.finish().unwrap();

        let mut input = StructReader::new(storage.open_input("_0.sppo").unwrap()).unwrap();
        check_index_header(&mut input, POSTINGS_CODEC_NAME, 1, 1, &state.segment.id, "").unwrap();
        check_footer(&mut input).unwrap();

        assert!(read_clusters(&mut input, empty_offset).unwrap().is_empty());
        assert_eq!(read_clusters(&mut input, offset).unwrap().clusters(), first.as_slice());
    }

    #[test]
    fn test_negative_doc_is_rejected() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
        let state = SegmentState::new(storage, SegmentInfo::new("_0", 10), vec![]);
        let mut writer = ClusteredPostingWriter::create(&state).unwrap();
        let bad = DocumentCluster::new(vec![DocWeight::new(-1, 5)], None, true);
        assert!(writer.write_clusters(&[bad]).is_err());
    }
}
