//! Field comparator chains for sorted hybrid results.
//!
//! Similar to Lucene's `FieldComparator` chain: the first field dominates, later
//! fields only break ties, and every field honours its own reverse flag.

use std::cmp::Ordering;

use crate::hybrid::score_doc::{ScoreDoc, SortField, SortFieldType, SortValue};

/// Compares field docs by their sort values.
#[derive(Debug, Clone, PartialEq)]
pub struct SortComparator {
    fields: Vec<SortField>,
}

impl SortComparator {
    pub fn new(fields: Vec<SortField>) -> Self {
        SortComparator { fields }
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// `Less` means `a` ranks before `b`. Docs whose value lists are shorter
    /// than the chain compare equal on the missing positions.
    pub fn compare(&self, a: &ScoreDoc, b: &ScoreDoc) -> Ordering {
        self.compare_values(&a.fields, &b.fields)
    }

    pub fn compare_values(&self, a: &[SortValue], b: &[SortValue]) -> Ordering {
        for (i, field) in self.fields.iter().enumerate() {
            let (Some(left), Some(right)) = (a.get(i), b.get(i)) else {
                break;
            };
            let ord = compare_field(field, left, right);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Comparator chain with the document id as the final tie-break.
    pub fn compare_with_doc(&self, a: &ScoreDoc, b: &ScoreDoc) -> Ordering {
        self.compare(a, b).then_with(|| a.doc.cmp(&b.doc))
    }
}

fn compare_field(field: &SortField, a: &SortValue, b: &SortValue) -> Ordering {
    let natural = match field.field_type {
        // Higher scores first.
        SortFieldType::Score => b.compare(a),
        _ => a.compare(b),
    };
    if field.reverse {
        natural.reverse()
    } else {
        natural
    }
}

/// Whether any criterion sorts by relevance score.
pub fn sorts_by_score(fields: &[SortField]) -> bool {
    fields.iter().any(|f| f.field_type == SortFieldType::Score)
}

/// Whether collection of a segment can stop once every queue is full: the
/// sort is ascending doc order, or a prefix of the segment's index sort.
pub fn can_early_terminate(sort: &[SortField], index_sort: &[SortField]) -> bool {
    if sort.len() == 1 && sort[0].field_type == SortFieldType::Doc && !sort[0].reverse {
        return true;
    }
    !sort.is_empty() && sort.len() <= index_sort.len() && index_sort.starts_with(sort)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: i32, fields: Vec<SortValue>) -> ScoreDoc {
        ScoreDoc::with_fields(id, 1.0, fields)
    }

    #[test]
    fn test_first_field_dominates() {
        let cmp = SortComparator::new(vec![
            SortField::new("price", SortFieldType::Int),
            SortField::new("name", SortFieldType::String),
        ]);
        let a = doc(1, vec![SortValue::Int(5), SortValue::Str("z".into())]);
        let b = doc(2, vec![SortValue::Int(7), SortValue::Str("a".into())]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_reverse_and_score_direction() {
        let cmp = SortComparator::new(vec![SortField::new("price", SortFieldType::Int).reversed()]);
        let a = doc(1, vec![SortValue::Int(5)]);
        let b = doc(2, vec![SortValue::Int(7)]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);

        let by_score = SortComparator::new(vec![SortField::score()]);
        let high = doc(1, vec![SortValue::Float(3.0)]);
        let low = doc(2, vec![SortValue::Float(1.0)]);
        assert_eq!(by_score.compare(&high, &low), Ordering::Less);
    }

    #[test]
    fn test_doc_tie_break() {
        let cmp = SortComparator::new(vec![SortField::new("price", SortFieldType::Int)]);
        let a = doc(9, vec![SortValue::Int(5)]);
        let b = doc(3, vec![SortValue::Int(5)]);
        assert_eq!(cmp.compare(&a, &b), Ordering::Equal);
        assert_eq!(cmp.compare_with_doc(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_can_early_terminate() {
        let index_sort = vec![
            SortField::new("ts", SortFieldType::Int),
            SortField::new("id", SortFieldType::String),
        ];
        assert!(can_early_terminate(&[SortField::doc()], &[]));
        assert!(can_early_terminate(&index_sort[..1], &index_sort));
        assert!(!can_early_terminate(
            &[SortField::new("ts", SortFieldType::Int).reversed()],
            &index_sort
        ));
        assert!(!can_early_terminate(&[SortField::score()], &index_sort));
    }
}
