//! Reduce-phase merging of delimited hybrid result streams.
//!
//! Partial results from collectors over disjoint documents are merged pairwise
//! and in a fixed order, since the order decides how ties land.

use std::cmp::Ordering;

use crate::error::{IrisError, Result};
use crate::hybrid::format::{check_stream_len, is_delimiter};
use crate::hybrid::score_doc::{
    CollapseValue, ScoreDoc, SortField, TopDocs, TopDocsAndMaxScore, TopDocsKind, TotalHits,
    TotalHitsRelation,
};
use crate::hybrid::sort::SortComparator;

/// Natural order of scores. With sorting disabled the merge treats it as
/// descending: the source doc goes first unless the incoming score is higher.
pub fn score_comparator(a: &ScoreDoc, b: &ScoreDoc) -> Ordering {
    a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Incoming,
}

/// Merges two delimited score doc arrays sub-query by sub-query.
pub struct ScoreDocsMerger;

impl ScoreDocsMerger {
    /// Merge `incoming` into `source`.
    ///
    /// Without sorting the source doc is taken when `comparator(source, incoming)`
    /// is `Greater` or `Equal`. With sorting the source doc is taken only when the
    /// comparator says `Less`, so the incoming doc wins ties.
    pub fn merge<F>(
        source: &[ScoreDoc],
        incoming: &[ScoreDoc],
        comparator: F,
        sort_enabled: bool,
    ) -> Result<Vec<ScoreDoc>>
    where
        F: Fn(&ScoreDoc, &ScoreDoc) -> Ordering,
    {
        check_stream_len(source.len())?;
        check_stream_len(incoming.len())?;
        if source.is_empty() {
            return Ok(incoming.to_vec());
        }
        if incoming.is_empty() {
            return Ok(source.to_vec());
        }

        let order = merge_order(source, incoming, &comparator, sort_enabled);
        Ok(order
            .into_iter()
            .map(|(side, i)| match side {
                Side::Source => source[i].clone(),
                Side::Incoming => incoming[i].clone(),
            })
            .collect())
    }

    /// Like [`ScoreDocsMerger::merge`], carrying the parallel collapse values
    /// of both sides along with their docs.
    pub fn merge_with_collapse<F>(
        source: (&[ScoreDoc], &[CollapseValue]),
        incoming: (&[ScoreDoc], &[CollapseValue]),
        comparator: F,
        sort_enabled: bool,
    ) -> Result<(Vec<ScoreDoc>, Vec<CollapseValue>)>
    where
        F: Fn(&ScoreDoc, &ScoreDoc) -> Ordering,
    {
        let (source_docs, source_values) = source;
        let (incoming_docs, incoming_values) = incoming;
        check_stream_len(source_docs.len())?;
        check_stream_len(incoming_docs.len())?;
        if source_docs.len() != source_values.len() || incoming_docs.len() != incoming_values.len()
        {
            return Err(IrisError::illegal_state(
                "collapse values must run parallel to score docs",
            ));
        }
        if source_docs.is_empty() {
            return Ok((incoming_docs.to_vec(), incoming_values.to_vec()));
        }
        if incoming_docs.is_empty() {
            return Ok((source_docs.to_vec(), source_values.to_vec()));
        }

        let order = merge_order(source_docs, incoming_docs, &comparator, sort_enabled);
        let mut docs = Vec::with_capacity(order.len());
        let mut values = Vec::with_capacity(order.len());
        for (side, i) in order {
            match side {
                Side::Source => {
                    docs.push(source_docs[i].clone());
                    values.push(source_values[i].clone());
                }
                Side::Incoming => {
                    docs.push(incoming_docs[i].clone());
                    values.push(incoming_values[i].clone());
                }
            }
        }
        Ok((docs, values))
    }
}

/// Positions of the merged output. Both inputs are non-empty and well formed.
fn merge_order<F>(
    source: &[ScoreDoc],
    incoming: &[ScoreDoc],
    comparator: &F,
    sort_enabled: bool,
) -> Vec<(Side, usize)>
where
    F: Fn(&ScoreDoc, &ScoreDoc) -> Ordering,
{
    let source_end = source.len() - 1;
    let incoming_end = incoming.len() - 1;
    let mut order = Vec::with_capacity(source.len() + incoming.len());

    // Shared leading sentinel.
    order.push((Side::Source, 0));
    let mut sp = 1;
    let mut np = 1;

    while sp < source_end && np < incoming_end {
        // One delimiter per sub-query.
        order.push((Side::Source, sp));
        sp += 1;
        np += 1;

        while sp < source_end
            && np < incoming_end
            && !is_delimiter(&source[sp])
            && !is_delimiter(&incoming[np])
        {
            let cmp = comparator(&source[sp], &incoming[np]);
            let take_source = if sort_enabled {
                cmp == Ordering::Less
            } else {
                cmp != Ordering::Less
            };
            if take_source {
                order.push((Side::Source, sp));
                sp += 1;
            } else {
                order.push((Side::Incoming, np));
                np += 1;
            }
        }
        while sp < source_end && !is_delimiter(&source[sp]) {
            order.push((Side::Source, sp));
            sp += 1;
        }
        while np < incoming_end && !is_delimiter(&incoming[np]) {
            order.push((Side::Incoming, np));
            np += 1;
        }
    }

    // Shared trailing sentinel.
    order.push((Side::Source, source_end));
    order
}

/// Merges two `(TopDocs, max score)` pairs produced by different collectors.
#[derive(Debug, Clone, Default)]
pub struct TopDocsMerger {
    sort: Option<SortComparator>,
    collapse_enabled: bool,
}

impl TopDocsMerger {
    pub fn new(sort_fields: Option<Vec<SortField>>, collapse_enabled: bool) -> Self {
        TopDocsMerger {
            sort: sort_fields.map(SortComparator::new),
            collapse_enabled,
        }
    }

    pub fn merge(
        &self,
        source: &TopDocsAndMaxScore,
        incoming: &TopDocsAndMaxScore,
    ) -> Result<TopDocsAndMaxScore> {
        if incoming.top_docs.total_hits.value == 0 {
            return Ok(source.clone());
        }
        if source.top_docs.total_hits.value == 0 {
            return Ok(incoming.clone());
        }

        let total_hits = merge_total_hits(&source.top_docs.total_hits, &incoming.top_docs.total_hits);
        let max_score = source.max_score.max(incoming.max_score);

        let top_docs = if self.collapse_enabled {
            self.merge_collapsed(&source.top_docs, &incoming.top_docs, total_hits)?
        } else {
            let score_docs = match &self.sort {
                Some(sort) => ScoreDocsMerger::merge(
                    &source.top_docs.score_docs,
                    &incoming.top_docs.score_docs,
                    |a, b| sort.compare_with_doc(a, b),
                    true,
                )?,
                None => ScoreDocsMerger::merge(
                    &source.top_docs.score_docs,
                    &incoming.top_docs.score_docs,
                    score_comparator,
                    false,
                )?,
            };
            TopDocs {
                total_hits,
                score_docs,
                kind: source.top_docs.kind.clone(),
            }
        };

        Ok(TopDocsAndMaxScore::new(top_docs, max_score))
    }

    fn merge_collapsed(
        &self,
        source: &TopDocs,
        incoming: &TopDocs,
        total_hits: TotalHits,
    ) -> Result<TopDocs> {
        let (
            TopDocsKind::Collapse {
                field,
                sort_fields,
                collapse_values: source_values,
            },
            TopDocsKind::Collapse {
                collapse_values: incoming_values,
                ..
            },
        ) = (&source.kind, &incoming.kind)
        else {
            return Err(IrisError::illegal_state(
                "collapse is enabled but top docs are not collapse top field docs",
            ));
        };

        let (score_docs, collapse_values) = match &self.sort {
            Some(sort) => ScoreDocsMerger::merge_with_collapse(
                (&source.score_docs, source_values),
                (&incoming.score_docs, incoming_values),
                |a, b| sort.compare_with_doc(a, b),
                true,
            )?,
            None => ScoreDocsMerger::merge_with_collapse(
                (&source.score_docs, source_values),
                (&incoming.score_docs, incoming_values),
                score_comparator,
                false,
            )?,
        };

        Ok(TopDocs::collapsed(
            total_hits,
            score_docs,
            field.clone(),
            sort_fields.clone(),
            collapse_values,
        ))
    }
}

/// Sum of both counts; a lower bound on either side makes the result one.
pub fn merge_total_hits(a: &TotalHits, b: &TotalHits) -> TotalHits {
    let relation = if a.is_lower_bound() || b.is_lower_bound() {
        TotalHitsRelation::GreaterThanOrEqualTo
    } else {
        TotalHitsRelation::EqualTo
    };
    TotalHits::new(a.value + b.value, relation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid::format::{build_stream, is_sentinel, is_start_stop, split_sub_queries};
    use crate::hybrid::score_doc::{SortFieldType, SortValue};

    fn stream(runs: &[&[(i32, f32)]]) -> Vec<ScoreDoc> {
        let subs: Vec<TopDocs> = runs
            .iter()
            .map(|run| {
                TopDocs::new(
                    TotalHits::exact(run.len() as u64),
                    run.iter().map(|&(d, s)| ScoreDoc::new(d, s)).collect(),
                )
            })
            .collect();
        build_stream(&subs, TotalHits::exact(0), &TopDocsKind::Scores).score_docs
    }

    fn ids(run: &[ScoreDoc]) -> Vec<i32> {
        run.iter().map(|d| d.doc).collect()
    }

    #[test]
    fn test_merge_identity() {
        let x = stream(&[&[(1, 2.0)], &[(2, 1.0)]]);
        assert_eq!(ScoreDocsMerger::merge(&[], &x, score_comparator, false).unwrap(), x);
        assert_eq!(ScoreDocsMerger::merge(&x, &[], score_comparator, false).unwrap(), x);
    }

    #[test]
    fn test_merge_length_and_grouping() {
        let source = stream(&[&[(10, 2.0), (20, 1.0)], &[(15, 3.0)]]);
        let incoming = stream(&[&[(30, 1.5)], &[(40, 4.0), (50, 0.5)]]);

        let merged = ScoreDocsMerger::merge(&source, &incoming, score_comparator, false).unwrap();
        // Both leading and trailing sentinels and one delimiter per sub-query are shared.
        assert_eq!(merged.len(), source.len() + incoming.len() - 2 - 2);
        let real = |docs: &[ScoreDoc]| docs.iter().filter(|d| !is_sentinel(d)).count();
        assert_eq!(real(&merged), real(&source) + real(&incoming));

        let runs = split_sub_queries(&merged).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(ids(runs[0]), vec![10, 30, 20]);
        assert_eq!(ids(runs[1]), vec![40, 15, 50]);
        assert!(is_start_stop(&merged[0]) && is_start_stop(&merged[merged.len() - 1]));
    }

    #[test]
    fn test_source_wins_ties_without_sort() {
        let source = stream(&[&[(1, 1.0)]]);
        let incoming = stream(&[&[(2, 1.0)]]);
        let merged = ScoreDocsMerger::merge(&source, &incoming, score_comparator, false).unwrap();
        assert_eq!(ids(split_sub_queries(&merged).unwrap()[0]), vec![1, 2]);
    }

    #[test]
    fn test_incoming_wins_ties_with_sort() {
        let source = stream(&[&[(1, 1.0)]]);
        let incoming = stream(&[&[(2, 1.0)]]);
        // Comparator reports equality; with sorting the incoming doc goes first.
        let merged =
            ScoreDocsMerger::merge(&source, &incoming, |_, _| Ordering::Equal, true).unwrap();
        assert_eq!(ids(split_sub_queries(&merged).unwrap()[0]), vec![2, 1]);
    }

    #[test]
    fn test_merge_preserves_relative_order() {
        let source = stream(&[&[(1, 5.0), (2, 3.0), (3, 1.0)]]);
        let incoming = stream(&[&[(4, 4.0), (5, 2.0)]]);
        let merged = ScoreDocsMerger::merge(&source, &incoming, score_comparator, false).unwrap();
        let run = ids(split_sub_queries(&merged).unwrap()[0]);
        assert_eq!(run, vec![1, 4, 2, 5, 3]);
    }

    #[test]
    fn test_short_array_is_rejected() {
        let bad = vec![ScoreDoc::new(1, 1.0), ScoreDoc::new(2, 1.0)];
        let good = stream(&[&[(1, 1.0)]]);
        let err = ScoreDocsMerger::merge(&bad, &good, score_comparator, false).unwrap_err();
        assert!(!err.is_user_error());
    }

    fn result(runs: &[&[(i32, f32)]], hits: u64, relation: TotalHitsRelation) -> TopDocsAndMaxScore {
        let docs = stream(runs);
        let max = docs
            .iter()
            .filter(|d| d.score > 0.0)
            .map(|d| d.score)
            .fold(0.0f32, f32::max);
        TopDocsAndMaxScore::new(TopDocs::new(TotalHits::new(hits, relation), docs), max)
    }

    #[test]
    fn test_top_docs_merge_sums_hits() {
        let merger = TopDocsMerger::new(None, false);
        let a = result(&[&[(10, 2.0), (20, 1.0)], &[]], 2, TotalHitsRelation::EqualTo);
        let b = result(&[&[], &[(15, 3.0)]], 1, TotalHitsRelation::EqualTo);

        let merged = merger.merge(&a, &b).unwrap();
        assert_eq!(merged.top_docs.total_hits, TotalHits::exact(3));
        assert_eq!(merged.max_score, 3.0);
        let runs = split_sub_queries(&merged.top_docs.score_docs).unwrap();
        assert_eq!(ids(runs[0]), vec![10, 20]);
        assert_eq!(ids(runs[1]), vec![15]);
    }

    #[test]
    fn test_top_docs_merge_relation_is_lower_bound_if_either_is() {
        let merger = TopDocsMerger::new(None, false);
        let a = result(&[&[(1, 1.0)]], 1, TotalHitsRelation::EqualTo);
        let b = result(&[&[(2, 1.0)]], 4, TotalHitsRelation::GreaterThanOrEqualTo);
        let merged = merger.merge(&a, &b).unwrap();
        assert_eq!(merged.top_docs.total_hits.value, 5);
        assert!(merged.top_docs.total_hits.is_lower_bound());
    }

    #[test]
    fn test_top_docs_merge_zero_hits_short_circuit() {
        let merger = TopDocsMerger::new(None, false);
        let a = result(&[&[(1, 1.0)]], 1, TotalHitsRelation::EqualTo);
        let empty = TopDocsAndMaxScore::new(TopDocs::empty(TopDocsKind::Scores), 0.0);
        assert_eq!(merger.merge(&a, &empty).unwrap(), a);
        assert_eq!(merger.merge(&empty, &a).unwrap(), a);
    }

    #[test]
    fn test_sorted_merge_uses_field_chain() {
        let fields = vec![SortField::new("price", SortFieldType::Int)];
        let kind = TopDocsKind::Fields {
            sort_fields: fields.clone(),
        };
        let make = |docs: &[(i32, i64)]| {
            let sub = TopDocs::with_fields(
                TotalHits::exact(docs.len() as u64),
                docs.iter()
                    .map(|&(d, p)| ScoreDoc::with_fields(d, 1.0, vec![SortValue::Int(p)]))
                    .collect(),
                fields.clone(),
            );
            TopDocsAndMaxScore::new(
                build_stream(&[sub], TotalHits::exact(docs.len() as u64), &kind),
                1.0,
            )
        };
        let merger = TopDocsMerger::new(Some(fields.clone()), false);
        let merged = merger.merge(&make(&[(1, 10), (2, 30)]), &make(&[(3, 20)])).unwrap();
        let runs = split_sub_queries(&merged.top_docs.score_docs).unwrap();
        assert_eq!(ids(runs[0]), vec![1, 3, 2]);
    }

    #[test]
    fn test_collapse_merge_requires_collapse_shape() {
        let merger = TopDocsMerger::new(None, true);
        let a = result(&[&[(1, 1.0)]], 1, TotalHitsRelation::EqualTo);
        let b = result(&[&[(2, 2.0)]], 1, TotalHitsRelation::EqualTo);
        assert!(merger.merge(&a, &b).is_err());
    }

    #[test]
    fn test_collapse_merge_carries_values() {
        let kind = TopDocsKind::Collapse {
            field: "color".into(),
            sort_fields: Vec::new(),
            collapse_values: Vec::new(),
        };
        let make = |doc: i32, score: f32, color: &str| {
            let sub = TopDocs::collapsed(
                TotalHits::exact(1),
                vec![ScoreDoc::new(doc, score)],
                "color".into(),
                Vec::new(),
                vec![CollapseValue::Str(color.into())],
            );
            TopDocsAndMaxScore::new(build_stream(&[sub], TotalHits::exact(1), &kind), score)
        };
        let merger = TopDocsMerger::new(None, true);
        let merged = merger.merge(&make(1, 1.0, "red"), &make(2, 2.0, "blue")).unwrap();
        let values = merged.top_docs.collapse_values().unwrap();
        assert_eq!(values.len(), merged.top_docs.score_docs.len());
        assert_eq!(merged.top_docs.score_docs[2].doc, 2);
        assert_eq!(values[2], CollapseValue::Str("blue".into()));
        assert_eq!(values[3], CollapseValue::Str("red".into()));
    }
}
