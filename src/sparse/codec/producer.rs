//! Read side of a segment: term postings and binary doc values.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::Result;
use crate::sparse::cluster::DocWeight;

/// Postings of one term, in doc id order.
#[derive(Debug, Clone, PartialEq)]
pub enum Postings {
    /// `(doc, term frequency)`; the frequency encodes the feature weight.
    Frequencies(Vec<(i32, i32)>),
    /// Already quantized weights, as stored by the clustered format.
    Quantized(Vec<DocWeight>),
}

impl Postings {
    pub fn len(&self) -> usize {
        match self {
            Postings::Frequencies(p) => p.len(),
            Postings::Quantized(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inverted postings of a segment, per field.
pub trait FieldsProducer: Send + Sync + Debug {
    /// Terms of `field` in byte order; empty when the field is unknown.
    fn terms(&self, field: &str) -> Result<Vec<Vec<u8>>>;

    fn postings(&self, field: &str, term: &[u8]) -> Result<Option<Postings>>;

    fn check_integrity(&self) -> Result<()> {
        Ok(())
    }
}

/// Binary doc values of one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryDocValues {
    values: BTreeMap<i32, Vec<u8>>,
}

impl BinaryDocValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc: i32, value: Vec<u8>) {
        self.values.insert(doc, value);
    }

    pub fn get(&self, doc: i32) -> Option<&[u8]> {
        self.values.get(&doc).map(Vec::as_slice)
    }

    /// `(doc, value)` in doc id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &[u8])> + '_ {
        self.values.iter().map(|(&doc, value)| (doc, value.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(i32, Vec<u8>)> for BinaryDocValues {
    fn from_iter<I: IntoIterator<Item = (i32, Vec<u8>)>>(iter: I) -> Self {
        BinaryDocValues {
            values: iter.into_iter().collect(),
        }
    }
}

pub trait DocValuesProducer: Send + Sync + Debug {
    fn binary(&self, field: &str) -> Result<Option<Arc<BinaryDocValues>>>;
}

/// Postings held in memory, as produced by an indexing buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryFieldsProducer {
    fields: AHashMap<String, BTreeMap<Vec<u8>, Postings>>,
}

impl MemoryFieldsProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_postings<F: Into<String>, T: Into<Vec<u8>>>(
        mut self,
        field: F,
        term: T,
        postings: Postings,
    ) -> Self {
        self.insert(field, term, postings);
        self
    }

    pub fn insert<F: Into<String>, T: Into<Vec<u8>>>(&mut self, field: F, term: T, postings: Postings) {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(term.into(), postings);
    }
}

impl FieldsProducer for MemoryFieldsProducer {
    fn terms(&self, field: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .fields
            .get(field)
            .map(|terms| terms.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn postings(&self, field: &str, term: &[u8]) -> Result<Option<Postings>> {
        Ok(self.fields.get(field).and_then(|terms| terms.get(term)).cloned())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocValuesProducer {
    fields: AHashMap<String, Arc<BinaryDocValues>>,
}

impl MemoryDocValuesProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary<F: Into<String>>(mut self, field: F, values: BinaryDocValues) -> Self {
        self.insert(field, values);
        self
    }

    pub fn insert<F: Into<String>>(&mut self, field: F, values: BinaryDocValues) {
        self.fields.insert(field.into(), Arc::new(values));
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.keys().map(String::as_str)
    }
}

impl DocValuesProducer for MemoryDocValuesProducer {
    fn binary(&self, field: &str) -> Result<Option<Arc<BinaryDocValues>>> {
        Ok(self.fields.get(field).cloned())
    }
}
