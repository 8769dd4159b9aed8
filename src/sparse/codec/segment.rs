//! Segment and field metadata handed to the codec.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::sparse::codec::producer::{DocValuesProducer, FieldsProducer};
use crate::sparse::params::{SeismicParams, is_sparse_field};
use crate::storage::Storage;
use crate::storage::codec_util::SegmentId;

/// `<segment>[_<suffix>].<extension>`
pub fn segment_file_name(segment: &str, suffix: &str, extension: &str) -> String {
    let mut name = segment.to_string();
    if !suffix.is_empty() {
        name.push('_');
        name.push_str(suffix);
    }
    if !extension.is_empty() {
        name.push('.');
        name.push_str(extension);
    }
    name
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub id: SegmentId,
    pub max_doc: usize,
}

impl SegmentInfo {
    /// A segment with a fresh random id.
    pub fn new<S: Into<String>>(name: S, max_doc: usize) -> Self {
        SegmentInfo {
            name: name.into(),
            id: Uuid::new_v4().into_bytes(),
            max_doc,
        }
    }

    pub fn with_id(mut self, id: SegmentId) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub number: u32,
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    pub fn new<S: Into<String>>(number: u32, name: S) -> Self {
        FieldInfo {
            number,
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// A clustered sparse field using `params`.
    pub fn sparse<S: Into<String>>(number: u32, name: S, params: &SeismicParams) -> Self {
        FieldInfo {
            number,
            name: name.into(),
            attributes: params.to_attributes(),
        }
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn is_sparse(&self) -> bool {
        is_sparse_field(&self.attributes)
    }

    pub fn params(&self) -> Result<SeismicParams> {
        SeismicParams::from_attributes(&self.attributes)
    }

    /// Sparse and large enough, in a segment of `max_doc` documents, to be
    /// written as clustered postings.
    pub fn clusters_in(&self, max_doc: usize) -> Result<bool> {
        Ok(self.is_sparse() && self.params()?.should_cluster(max_doc))
    }
}

/// Where a segment lives and what it contains.
#[derive(Clone)]
pub struct SegmentState {
    pub storage: Arc<dyn Storage>,
    pub segment: SegmentInfo,
    pub fields: Vec<FieldInfo>,
    pub suffix: String,
}

impl std::fmt::Debug for SegmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentState")
            .field("segment", &self.segment)
            .field("fields", &self.fields)
            .field("suffix", &self.suffix)
            .finish()
    }
}

impl SegmentState {
    pub fn new(storage: Arc<dyn Storage>, segment: SegmentInfo, fields: Vec<FieldInfo>) -> Self {
        SegmentState {
            storage,
            segment,
            fields,
            suffix: String::new(),
        }
    }

    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn file_name(&self, extension: &str) -> String {
        segment_file_name(&self.segment.name, &self.suffix, extension)
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.number == number)
    }
}

/// Old to new doc ids of one merge source. Deleted documents map to -1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocMap {
    new_ids: Vec<i32>,
}

impl DocMap {
    pub fn new(new_ids: Vec<i32>) -> Self {
        DocMap { new_ids }
    }

    /// Documents `0..max_doc` shifted by `doc_base`, none deleted.
    pub fn shifted(max_doc: usize, doc_base: i32) -> Self {
        DocMap {
            new_ids: (0..max_doc as i32).map(|d| d + doc_base).collect(),
        }
    }

    pub fn get(&self, old: i32) -> i32 {
        usize::try_from(old)
            .ok()
            .and_then(|i| self.new_ids.get(i))
            .copied()
            .unwrap_or(-1)
    }

    pub fn live_docs(&self) -> usize {
        self.new_ids.iter().filter(|&&id| id >= 0).count()
    }
}

/// One segment being merged away.
#[derive(Clone)]
pub struct MergeSource {
    pub segment: SegmentInfo,
    pub doc_map: DocMap,
    pub postings: Arc<dyn FieldsProducer>,
    pub doc_values: Arc<dyn DocValuesProducer>,
}

impl std::fmt::Debug for MergeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeSource")
            .field("segment", &self.segment)
            .field("doc_map", &self.doc_map)
            .finish()
    }
}

impl MergeSource {
    pub fn new(
        segment: SegmentInfo,
        doc_map: DocMap,
        postings: Arc<dyn FieldsProducer>,
        doc_values: Arc<dyn DocValuesProducer>,
    ) -> Self {
        MergeSource {
            segment,
            doc_map,
            postings,
            doc_values,
        }
    }
}

/// Sources of a merge, in the order their documents are renumbered.
#[derive(Debug, Clone)]
pub struct MergeState {
    pub segment: SegmentInfo,
    pub fields: Vec<FieldInfo>,
    pub sources: Vec<MergeSource>,
}

impl MergeState {
    pub fn new(segment: SegmentInfo, fields: Vec<FieldInfo>, sources: Vec<MergeSource>) -> Self {
        MergeState {
            segment,
            fields,
            sources,
        }
    }

    /// Sum of the sources' `max_doc`.
    pub fn total_docs(&self) -> usize {
        self.sources.iter().map(|s| s.segment.max_doc).sum()
    }
}
