//! Write side of a segment, and the in-memory consumers used for fields the
//! clustered format does not handle.

use std::fmt::Debug;

use crate::error::Result;
use crate::sparse::codec::merge::{all_terms, merged_binary_values, remapped_postings};
use crate::sparse::codec::producer::{
    DocValuesProducer, FieldsProducer, MemoryDocValuesProducer, MemoryFieldsProducer,
};
use crate::sparse::codec::segment::{FieldInfo, MergeState};

/// Writes the postings of a flushed or merged segment.
pub trait FieldsConsumer: Send + Debug {
    fn write(&mut self, fields: &[FieldInfo], postings: &dyn FieldsProducer) -> Result<()>;

    fn merge(&mut self, fields: &[FieldInfo], merge: &MergeState) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes the doc values of a flushed or merged segment.
pub trait DocValuesConsumer: Send + Debug {
    fn add_binary_field(&mut self, field: &FieldInfo, values: &dyn DocValuesProducer) -> Result<()>;

    fn merge(&mut self, merge: &MergeState) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryFieldsConsumer {
    written: MemoryFieldsProducer,
    fields: Vec<String>,
}

impl MemoryFieldsConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the fields this consumer received, in order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn into_producer(self) -> MemoryFieldsProducer {
        self.written
    }
}

impl FieldsConsumer for MemoryFieldsConsumer {
    fn write(&mut self, fields: &[FieldInfo], postings: &dyn FieldsProducer) -> Result<()> {
        for field in fields {
            self.fields.push(field.name.clone());
            for term in postings.terms(&field.name)? {
                if let Some(p) = postings.postings(&field.name, &term)? {
                    self.written.insert(field.name.clone(), term, p);
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, fields: &[FieldInfo], merge: &MergeState) -> Result<()> {
        for field in fields {
            self.fields.push(field.name.clone());
            for term in all_terms(merge, &field.name)? {
                if let Some(p) = remapped_postings(merge, &field.name, &term)? {
                    self.written.insert(field.name.clone(), term, p);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocValuesConsumer {
    written: MemoryDocValuesProducer,
}

impl MemoryDocValuesConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_producer(self) -> MemoryDocValuesProducer {
        self.written
    }
}

impl DocValuesConsumer for MemoryDocValuesConsumer {
    fn add_binary_field(&mut self, field: &FieldInfo, values: &dyn DocValuesProducer) -> Result<()> {
        if let Some(values) = values.binary(&field.name)? {
            self.written.insert(field.name.clone(), values.as_ref().clone());
        }
        Ok(())
    }

    fn merge(&mut self, merge: &MergeState) -> Result<()> {
        for field in &merge.fields {
            let values = merged_binary_values(merge, &field.name)?;
            if !values.is_empty() {
                self.written.insert(field.name.clone(), values);
            }
        }
        Ok(())
    }
}
