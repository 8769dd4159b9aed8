//! Delimited hybrid result stream.
//!
//! Layout: `START_STOP, DELIM, docs of sub-query 0, DELIM, docs of sub-query 1,
//! ..., START_STOP`. Sentinels are recognised by reserved score values that no
//! scorer produces. Their doc id is the first real doc id of the stream so that
//! downstream phases never see an out-of-range id. A stream with no real
//! document at all is empty.

use crate::error::{IrisError, Result};
use crate::hybrid::score_doc::{
    CollapseValue, DocId, ScoreDoc, SortField, SortFieldType, SortValue, TopDocs, TopDocsKind,
    TotalHits,
};

/// Score of the leading and trailing sentinel.
#[allow(clippy::excessive_precision)]
pub const MAGIC_NUMBER_START_STOP: f32 = -9549511920.4881596047;

/// Score of the sentinel that opens each sub-query's run.
#[allow(clippy::excessive_precision)]
pub const MAGIC_NUMBER_DELIMITER: f32 = -4422440593.9791198149;

/// Shortest non-empty stream: start, one delimiter, stop.
pub const MIN_STREAM_LEN: usize = 3;

pub fn is_start_stop(doc: &ScoreDoc) -> bool {
    doc.score == MAGIC_NUMBER_START_STOP
}

pub fn is_delimiter(doc: &ScoreDoc) -> bool {
    doc.score == MAGIC_NUMBER_DELIMITER
}

pub fn is_sentinel(doc: &ScoreDoc) -> bool {
    is_start_stop(doc) || is_delimiter(doc)
}

pub fn start_stop_element(doc: DocId, sort_fields: Option<&[SortField]>) -> ScoreDoc {
    sentinel(doc, MAGIC_NUMBER_START_STOP, sort_fields)
}

pub fn delimiter_element(doc: DocId, sort_fields: Option<&[SortField]>) -> ScoreDoc {
    sentinel(doc, MAGIC_NUMBER_DELIMITER, sort_fields)
}

/// Field-doc sentinels carry one placeholder per sort field so every entry of
/// the stream has the same shape.
fn sentinel(doc: DocId, score: f32, sort_fields: Option<&[SortField]>) -> ScoreDoc {
    let fields = sort_fields
        .map(|fields| {
            fields
                .iter()
                .map(|field| match field.field_type {
                    SortFieldType::Score => SortValue::Float(score as f64),
                    SortFieldType::Doc => SortValue::Int(doc as i64),
                    _ => SortValue::Null,
                })
                .collect()
        })
        .unwrap_or_default();
    ScoreDoc::with_fields(doc, score, fields)
}

/// Pack the per-subquery results of one collector into a delimited stream.
///
/// `kind` gives the shape of the output; for collapse streams the collapse
/// values of the inputs are carried along with `Sentinel` at sentinel slots.
pub fn build_stream(sub_query_docs: &[TopDocs], total_hits: TotalHits, kind: &TopDocsKind) -> TopDocs {
    let first_doc = sub_query_docs
        .iter()
        .find_map(|docs| docs.score_docs.first().map(|d| d.doc));

    let Some(sentinel_doc) = first_doc else {
        return TopDocs {
            total_hits,
            score_docs: Vec::new(),
            kind: empty_kind(kind),
        };
    };

    let sort_fields = match kind {
        TopDocsKind::Scores => None,
        TopDocsKind::Fields { sort_fields } => Some(sort_fields.as_slice()),
        TopDocsKind::Collapse { sort_fields, .. } => Some(sort_fields.as_slice()),
    };
    let collapsing = matches!(kind, TopDocsKind::Collapse { .. });

    let len = sub_query_docs.iter().map(|d| d.score_docs.len() + 1).sum::<usize>() + 2;
    let mut score_docs = Vec::with_capacity(len);
    let mut collapse_values = Vec::with_capacity(if collapsing { len } else { 0 });

    score_docs.push(start_stop_element(sentinel_doc, sort_fields));
    if collapsing {
        collapse_values.push(CollapseValue::Sentinel);
    }
    for docs in sub_query_docs {
        score_docs.push(delimiter_element(sentinel_doc, sort_fields));
        score_docs.extend(docs.score_docs.iter().cloned());
        if collapsing {
            collapse_values.push(CollapseValue::Sentinel);
            match docs.collapse_values() {
                Some(values) => collapse_values.extend(values.iter().cloned()),
                None => collapse_values
                    .extend(std::iter::repeat_n(CollapseValue::Missing, docs.score_docs.len())),
            }
        }
    }
    score_docs.push(start_stop_element(sentinel_doc, sort_fields));

    let kind = match kind {
        TopDocsKind::Collapse {
            field, sort_fields, ..
        } => {
            collapse_values.push(CollapseValue::Sentinel);
            TopDocsKind::Collapse {
                field: field.clone(),
                sort_fields: sort_fields.clone(),
                collapse_values,
            }
        }
        other => other.clone(),
    };

    TopDocs {
        total_hits,
        score_docs,
        kind,
    }
}

fn empty_kind(kind: &TopDocsKind) -> TopDocsKind {
    match kind {
        TopDocsKind::Collapse {
            field, sort_fields, ..
        } => TopDocsKind::Collapse {
            field: field.clone(),
            sort_fields: sort_fields.clone(),
            collapse_values: Vec::new(),
        },
        other => other.clone(),
    }
}

/// Reject a non-empty stream that is too short to hold the sentinels.
pub fn check_stream_len(len: usize) -> Result<()> {
    if len > 0 && len < MIN_STREAM_LEN {
        return Err(IrisError::illegal_state(format!(
            "hybrid result stream must have at least {MIN_STREAM_LEN} elements, got {len}"
        )));
    }
    Ok(())
}

/// Split a delimited stream back into one slice per sub-query.
pub fn split_sub_queries(score_docs: &[ScoreDoc]) -> Result<Vec<&[ScoreDoc]>> {
    if score_docs.is_empty() {
        return Ok(Vec::new());
    }
    check_stream_len(score_docs.len())?;

    let last = score_docs.len() - 1;
    if !is_start_stop(&score_docs[0]) || !is_start_stop(&score_docs[last]) {
        return Err(IrisError::illegal_state(
            "hybrid result stream must start and end with a start/stop sentinel",
        ));
    }
    if !is_delimiter(&score_docs[1]) {
        return Err(IrisError::illegal_state(
            "hybrid result stream must open every sub-query with a delimiter",
        ));
    }

    let body = &score_docs[1..last];
    let mut runs = Vec::new();
    let mut start = 1;
    for i in 1..body.len() {
        if is_start_stop(&body[i]) {
            return Err(IrisError::illegal_state(
                "start/stop sentinel found inside hybrid result stream",
            ));
        }
        if is_delimiter(&body[i]) {
            runs.push(&body[start..i]);
            start = i + 1;
        }
    }
    runs.push(&body[start..]);
    Ok(runs)
}
