//! Result types shared by collectors, merge and the reduce phase.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Document id. Segment-local inside a collector, shard-global once collected.
pub type DocId = i32;

/// Doc id used when there is no document.
pub const NO_MORE_DOCS: DocId = -1;

/// One value of a sort field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortValue {
    /// The document has no value for the field.
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            SortValue::Null => 0,
            SortValue::Int(_) => 1,
            SortValue::Float(_) => 2,
            SortValue::Str(_) => 3,
        }
    }

    /// Natural (ascending) order. Missing values sort first.
    pub fn compare(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Int(a), SortValue::Float(b)) => (*a as f64).total_cmp(b),
            (SortValue::Float(a), SortValue::Int(b)) => a.total_cmp(&(*b as f64)),
            (SortValue::Str(a), SortValue::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Whether this value can stand for a field of the given type.
    pub fn matches_type(&self, field_type: SortFieldType) -> bool {
        match (self, field_type) {
            (SortValue::Null, _) => true,
            (SortValue::Float(_), SortFieldType::Score | SortFieldType::Float) => true,
            (SortValue::Int(_), SortFieldType::Doc | SortFieldType::Int) => true,
            (SortValue::Str(_), SortFieldType::String) => true,
            _ => false,
        }
    }
}

/// Type of a sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortFieldType {
    /// Relevance score, best first.
    Score,
    /// Shard-global document id, ascending.
    Doc,
    Int,
    Float,
    String,
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    pub field_type: SortFieldType,
    /// Flip the natural order of the field.
    pub reverse: bool,
}

impl SortField {
    pub fn new<S: Into<String>>(field: S, field_type: SortFieldType) -> Self {
        SortField {
            field: field.into(),
            field_type,
            reverse: false,
        }
    }

    pub fn score() -> Self {
        SortField::new("_score", SortFieldType::Score)
    }

    pub fn doc() -> Self {
        SortField::new("_doc", SortFieldType::Doc)
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }
}

/// Value of the collapse field for one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollapseValue {
    /// Placeholder at sentinel positions of a delimited stream.
    Sentinel,
    /// The document has no value for the collapse field.
    Missing,
    Int(i64),
    Str(String),
}

/// A scored document. `fields` is empty for score docs and carries one value
/// per sort field for field docs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    pub doc: DocId,
    pub score: f32,
    pub shard_index: i32,
    pub fields: Vec<SortValue>,
}

impl ScoreDoc {
    pub fn new(doc: DocId, score: f32) -> Self {
        ScoreDoc {
            doc,
            score,
            shard_index: -1,
            fields: Vec::new(),
        }
    }

    pub fn with_fields(doc: DocId, score: f32, fields: Vec<SortValue>) -> Self {
        ScoreDoc {
            doc,
            score,
            shard_index: -1,
            fields,
        }
    }

    pub fn with_shard_index(mut self, shard_index: i32) -> Self {
        self.shard_index = shard_index;
        self
    }
}

/// Whether a hit count is exact or a lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalHitsRelation {
    EqualTo,
    GreaterThanOrEqualTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalHitsRelation,
}

impl TotalHits {
    pub fn new(value: u64, relation: TotalHitsRelation) -> Self {
        TotalHits { value, relation }
    }

    pub fn exact(value: u64) -> Self {
        TotalHits::new(value, TotalHitsRelation::EqualTo)
    }

    pub fn is_lower_bound(&self) -> bool {
        self.relation == TotalHitsRelation::GreaterThanOrEqualTo
    }
}

/// Shape of a [`TopDocs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TopDocsKind {
    /// Ordered by score.
    Scores,
    /// Ordered by a sort field chain; every doc carries its sort values.
    Fields { sort_fields: Vec<SortField> },
    /// Collapsed by a field; `collapse_values` runs parallel to `score_docs`.
    Collapse {
        field: String,
        sort_fields: Vec<SortField>,
        collapse_values: Vec<CollapseValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    pub total_hits: TotalHits,
    pub score_docs: Vec<ScoreDoc>,
    pub kind: TopDocsKind,
}

impl TopDocs {
    pub fn new(total_hits: TotalHits, score_docs: Vec<ScoreDoc>) -> Self {
        TopDocs {
            total_hits,
            score_docs,
            kind: TopDocsKind::Scores,
        }
    }

    pub fn with_fields(
        total_hits: TotalHits,
        score_docs: Vec<ScoreDoc>,
        sort_fields: Vec<SortField>,
    ) -> Self {
        TopDocs {
            total_hits,
            score_docs,
            kind: TopDocsKind::Fields { sort_fields },
        }
    }

    pub fn collapsed(
        total_hits: TotalHits,
        score_docs: Vec<ScoreDoc>,
        field: String,
        sort_fields: Vec<SortField>,
        collapse_values: Vec<CollapseValue>,
    ) -> Self {
        TopDocs {
            total_hits,
            score_docs,
            kind: TopDocsKind::Collapse {
                field,
                sort_fields,
                collapse_values,
            },
        }
    }

    pub fn empty(kind: TopDocsKind) -> Self {
        TopDocs {
            total_hits: TotalHits::exact(0),
            score_docs: Vec::new(),
            kind,
        }
    }

    pub fn sort_fields(&self) -> Option<&[SortField]> {
        match &self.kind {
            TopDocsKind::Scores => None,
            TopDocsKind::Fields { sort_fields } => Some(sort_fields),
            TopDocsKind::Collapse { sort_fields, .. } => Some(sort_fields),
        }
    }

    pub fn collapse_values(&self) -> Option<&[CollapseValue]> {
        match &self.kind {
            TopDocsKind::Collapse {
                collapse_values, ..
            } => Some(collapse_values),
            _ => None,
        }
    }
}

/// Top docs together with the best score seen while producing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopDocsAndMaxScore {
    pub top_docs: TopDocs,
    pub max_score: f32,
}

impl TopDocsAndMaxScore {
    pub fn new(top_docs: TopDocs, max_score: f32) -> Self {
        TopDocsAndMaxScore {
            top_docs,
            max_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_value_order() {
        assert_eq!(SortValue::Null.compare(&SortValue::Int(-5)), Ordering::Less);
        assert_eq!(
            SortValue::Int(3).compare(&SortValue::Float(2.5)),
            Ordering::Greater
        );
        assert_eq!(
            SortValue::Str("a".into()).compare(&SortValue::Str("b".into())),
            Ordering::Less
        );
    }

    #[test]
    fn test_sort_value_type_check() {
        assert!(SortValue::Float(1.0).matches_type(SortFieldType::Score));
        assert!(SortValue::Int(1).matches_type(SortFieldType::Doc));
        assert!(SortValue::Null.matches_type(SortFieldType::String));
        assert!(!SortValue::Str("x".into()).matches_type(SortFieldType::Int));
    }

    #[test]
    fn test_top_docs_accessors() {
        let docs = TopDocs::collapsed(
            TotalHits::exact(1),
            vec![ScoreDoc::new(1, 1.0)],
            "category".into(),
            vec![SortField::score()],
            vec![CollapseValue::Int(7)],
        );
        assert_eq!(docs.sort_fields().map(|f| f.len()), Some(1));
        assert_eq!(docs.collapse_values(), Some(&[CollapseValue::Int(7)][..]));
        assert!(TopDocs::empty(TopDocsKind::Scores).sort_fields().is_none());
    }
}
