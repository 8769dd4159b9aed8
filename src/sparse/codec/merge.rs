//! Reading merge sources through the new segment's doc id space.

use std::collections::BTreeSet;

use ahash::AHashMap;

use crate::error::{IrisError, Result};
use crate::sparse::cache::CacheKey;
use crate::sparse::cluster::DocWeight;
use crate::sparse::codec::producer::{BinaryDocValues, Postings};
use crate::sparse::codec::segment::{FieldInfo, MergeState};
use crate::sparse::quantization::ByteQuantizer;
use crate::sparse::value_encoder::decode_feature_value;

/// Postings of one term across every source, renumbered.
#[derive(Debug, Clone, Default)]
pub struct MergedPostings {
    pub postings: Vec<DocWeight>,
    /// New doc id -> (source index, old doc id).
    pub origins: AHashMap<i32, (usize, i32)>,
}

/// Union of the terms of `field` over every source, in byte order.
pub fn all_terms(merge: &MergeState, field: &str) -> Result<BTreeSet<Vec<u8>>> {
    let mut terms = BTreeSet::new();
    for source in &merge.sources {
        terms.extend(source.postings.terms(field)?);
    }
    Ok(terms)
}

/// Quantized postings of `term` with new doc ids; deleted documents are
/// dropped. Raw frequencies go through `quantizer`, stored weights are kept.
pub fn merged_postings_for_term(
    merge: &MergeState,
    field: &str,
    term: &[u8],
    quantizer: &ByteQuantizer,
) -> Result<MergedPostings> {
    let total_docs = merge.total_docs();
    let mut merged = MergedPostings::default();
    for (index, source) in merge.sources.iter().enumerate() {
        let Some(postings) = source.postings.postings(field, term)? else {
            continue;
        };
        let weights: Vec<DocWeight> = match postings {
            Postings::Frequencies(p) => p
                .into_iter()
                .map(|(doc, freq)| DocWeight::new(doc, quantizer.quantize(decode_feature_value(freq))))
                .collect(),
            Postings::Quantized(p) => p,
        };
        for posting in weights {
            let new_doc = source.doc_map.get(posting.doc);
            if new_doc < 0 {
                continue;
            }
            if new_doc as usize >= total_docs {
                return Err(IrisError::illegal_state(format!(
                    "new doc id {new_doc} is out of range for a merge of {total_docs} documents"
                )));
            }
            merged.origins.insert(new_doc, (index, posting.doc));
            merged.postings.push(DocWeight::new(new_doc, posting.weight));
        }
    }
    Ok(merged)
}

/// Postings of `term` with new doc ids, in doc id order. Stays in raw
/// frequencies when every source has them.
pub fn remapped_postings(merge: &MergeState, field: &str, term: &[u8]) -> Result<Option<Postings>> {
    let mut frequencies = Vec::new();
    let mut all_raw = true;
    let mut found = false;
    for source in &merge.sources {
        let Some(postings) = source.postings.postings(field, term)? else {
            continue;
        };
        found = true;
        match postings {
            Postings::Frequencies(p) => {
                for (doc, freq) in p {
                    let new_doc = source.doc_map.get(doc);
                    if new_doc >= 0 {
                        frequencies.push((new_doc, freq));
                    }
                }
            }
            Postings::Quantized(_) => all_raw = false,
        }
    }
    if !found {
        return Ok(None);
    }
    if all_raw {
        frequencies.sort_by_key(|&(doc, _)| doc);
        return Ok(Some(Postings::Frequencies(frequencies)));
    }
    let mut merged = merged_postings_for_term(merge, field, term, &ByteQuantizer::ingest())?.postings;
    merged.sort_by_key(|d| d.doc);
    Ok(Some(Postings::Quantized(merged)))
}

/// A live binary doc value of a merge source.
#[derive(Debug, Clone)]
pub struct MergedValue {
    pub new_doc: i32,
    pub source: usize,
    pub old_doc: i32,
    pub bytes: Vec<u8>,
}

/// Every live binary value of `field`, sources in order.
pub fn merged_binary_entries(merge: &MergeState, field: &str) -> Result<Vec<MergedValue>> {
    let mut entries = Vec::new();
    for (index, source) in merge.sources.iter().enumerate() {
        let Some(values) = source.doc_values.binary(field)? else {
            continue;
        };
        for (old_doc, bytes) in values.iter() {
            let new_doc = source.doc_map.get(old_doc);
            if new_doc < 0 {
                continue;
            }
            entries.push(MergedValue {
                new_doc,
                source: index,
                old_doc,
                bytes: bytes.to_vec(),
            });
        }
    }
    Ok(entries)
}

pub fn merged_binary_values(merge: &MergeState, field: &str) -> Result<BinaryDocValues> {
    Ok(merged_binary_entries(merge, field)?
        .into_iter()
        .map(|v| (v.new_doc, v.bytes))
        .collect())
}

/// Cache keys of `field` in every source segment.
pub fn source_keys(merge: &MergeState, field: &FieldInfo) -> Vec<CacheKey> {
    merge
        .sources
        .iter()
        .map(|source| CacheKey::of(&source.segment, field))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sparse::codec::producer::{MemoryDocValuesProducer, MemoryFieldsProducer};
    use crate::sparse::codec::segment::{DocMap, MergeSource, SegmentInfo};
    use crate::sparse::value_encoder::encode_feature_value;

    fn source(name: &str, doc_map: DocMap, postings: MemoryFieldsProducer, values: BinaryDocValues) -> MergeSource {
        MergeSource::new(
            SegmentInfo::new(name, 3),
            doc_map,
            Arc::new(postings),
            Arc::new(MemoryDocValuesProducer::new().with_binary("body", values)),
        )
    }

    fn merge_state() -> MergeState {
        let freq = encode_feature_value(3.0).unwrap();
        let a = source(
            "_0",
            DocMap::new(vec![0, -1, 1]),
            MemoryFieldsProducer::new()
                .with_postings("body", "1", Postings::Frequencies(vec![(0, freq), (1, freq), (2, freq)]))
                .with_postings("body", "2", Postings::Frequencies(vec![(2, freq)])),
            [(0, vec![1]), (1, vec![2]), (2, vec![3])].into_iter().collect(),
        );
        let b = source(
            "_1",
            DocMap::shifted(3, 2),
            MemoryFieldsProducer::new().with_postings(
                "body",
                "3",
                Postings::Quantized(vec![DocWeight::new(0, 7), DocWeight::new(2, 9)]),
            ),
            [(1, vec![4])].into_iter().collect(),
        );
        MergeState::new(SegmentInfo::new("_2", 5), vec![], vec![a, b])
    }

    #[test]
    fn test_all_terms_union() {
        let terms: Vec<Vec<u8>> = all_terms(&merge_state(), "body").unwrap().into_iter().collect();
        assert_eq!(terms, vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
        assert!(all_terms(&merge_state(), "title").unwrap().is_empty());
    }

    #[test]
    fn test_merged_postings_skip_deleted_docs() {
        let merge = merge_state();
        let merged = merged_postings_for_term(&merge, "body", b"1", &ByteQuantizer::ingest()).unwrap();
        assert_eq!(merged.postings, vec![DocWeight::new(0, 255), DocWeight::new(1, 255)]);
        assert_eq!(merged.origins[&1], (0, 2));

        let stored = merged_postings_for_term(&merge, "body", b"3", &ByteQuantizer::ingest()).unwrap();
        assert_eq!(stored.postings, vec![DocWeight::new(2, 7), DocWeight::new(4, 9)]);
        assert_eq!(stored.origins[&4], (1, 2));
    }

    #[test]
    fn test_merged_binary_values() {
        let merge = merge_state();
        let values = merged_binary_values(&merge, "body").unwrap();
        let docs: Vec<(i32, Vec<u8>)> = values.iter().map(|(d, v)| (d, v.to_vec())).collect();
        assert_eq!(docs, vec![(0, vec![1]), (1, vec![3]), (3, vec![4])]);
    }

    #[test]
    fn test_remapped_postings_keep_raw_frequencies() {
        let merge = merge_state();
        let Some(Postings::Frequencies(p)) = remapped_postings(&merge, "body", b"1").unwrap() else {
            panic!("expected raw frequencies");
        };
        assert_eq!(p.iter().map(|&(d, _)| d).collect::<Vec<_>>(), vec![0, 1]);
        assert!(remapped_postings(&merge, "body", b"9").unwrap().is_none());
    }
}
