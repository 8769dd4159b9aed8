//! SEISMIC method parameters and their field-attribute encoding.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};

pub const N_POSTINGS_FIELD: &str = "n_postings";
pub const CLUSTER_RATIO_FIELD: &str = "cluster_ratio";
pub const SUMMARY_PRUNE_RATIO_FIELD: &str = "summary_prune_ratio";
pub const APPROXIMATE_THRESHOLD_FIELD: &str = "approximate_threshold";
/// Field attribute marking a field as a clustered sparse field.
pub const SPARSE_FIELD_ATTRIBUTE: &str = "sparse_field";

/// `n_postings` value meaning "derive from the segment size".
pub const DEFAULT_N_POSTINGS: i32 = -1;
pub const DEFAULT_CLUSTER_RATIO: f32 = 0.1;
pub const DEFAULT_SUMMARY_PRUNE_RATIO: f32 = 0.4;
pub const DEFAULT_APPROXIMATE_THRESHOLD: i32 = 1_000_000;
pub const DEFAULT_POSTING_PRUNE_RATIO: f32 = 0.0005;
pub const DEFAULT_POSTING_MINIMUM_LENGTH: usize = 160;

/// Parameters of one sparse field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeismicParams {
    /// Postings kept per term; [`DEFAULT_N_POSTINGS`] derives it from `max_doc`.
    pub n_postings: i32,
    /// Clusters per kept posting.
    pub cluster_ratio: f32,
    /// Share of a cluster's summary mass that is kept.
    pub summary_prune_ratio: f32,
    /// Segments with fewer documents skip clustering.
    pub approximate_threshold: i32,
}

impl Default for SeismicParams {
    fn default() -> Self {
        SeismicParams {
            n_postings: DEFAULT_N_POSTINGS,
            cluster_ratio: DEFAULT_CLUSTER_RATIO,
            summary_prune_ratio: DEFAULT_SUMMARY_PRUNE_RATIO,
            approximate_threshold: DEFAULT_APPROXIMATE_THRESHOLD,
        }
    }
}

impl SeismicParams {
    pub fn with_n_postings(mut self, n_postings: i32) -> Self {
        self.n_postings = n_postings;
        self
    }

    pub fn with_cluster_ratio(mut self, cluster_ratio: f32) -> Self {
        self.cluster_ratio = cluster_ratio;
        self
    }

    pub fn with_summary_prune_ratio(mut self, ratio: f32) -> Self {
        self.summary_prune_ratio = ratio;
        self
    }

    pub fn with_approximate_threshold(mut self, threshold: i32) -> Self {
        self.approximate_threshold = threshold;
        self
    }

    /// Validate user-supplied method parameters and fill in defaults.
    pub fn from_parameters(parameters: &BTreeMap<String, String>) -> Result<Self> {
        validate_parameters(parameters)?;
        Self::from_attributes(parameters)
    }

    /// Read parameters back from stored field attributes.
    pub fn from_attributes(attributes: &BTreeMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(SeismicParams {
            n_postings: attribute(attributes, N_POSTINGS_FIELD)?.unwrap_or(defaults.n_postings),
            cluster_ratio: attribute(attributes, CLUSTER_RATIO_FIELD)?
                .unwrap_or(defaults.cluster_ratio),
            summary_prune_ratio: attribute(attributes, SUMMARY_PRUNE_RATIO_FIELD)?
                .unwrap_or(defaults.summary_prune_ratio),
            approximate_threshold: attribute(attributes, APPROXIMATE_THRESHOLD_FIELD)?
                .unwrap_or(defaults.approximate_threshold),
        })
    }

    /// Field attributes for a sparse field using these parameters.
    pub fn to_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (SPARSE_FIELD_ATTRIBUTE.to_string(), "true".to_string()),
            (N_POSTINGS_FIELD.to_string(), self.n_postings.to_string()),
            (CLUSTER_RATIO_FIELD.to_string(), self.cluster_ratio.to_string()),
            (SUMMARY_PRUNE_RATIO_FIELD.to_string(), self.summary_prune_ratio.to_string()),
            (APPROXIMATE_THRESHOLD_FIELD.to_string(), self.approximate_threshold.to_string()),
        ])
    }

    /// Postings kept per term in a segment of `max_doc` documents.
    pub fn n_postings_for(&self, max_doc: usize) -> usize {
        if self.n_postings == DEFAULT_N_POSTINGS {
            ((DEFAULT_POSTING_PRUNE_RATIO * max_doc as f32) as usize)
                .max(DEFAULT_POSTING_MINIMUM_LENGTH)
        } else {
            self.n_postings.max(0) as usize
        }
    }

    /// Whether a segment of `max_doc` documents is large enough to cluster.
    pub fn should_cluster(&self, max_doc: usize) -> bool {
        max_doc as i64 >= self.approximate_threshold as i64
    }
}

fn attribute<T: FromStr>(attributes: &BTreeMap<String, String>, key: &str) -> Result<Option<T>> {
    attributes
        .get(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| {
                IrisError::invalid_config(format!("field attribute [{key}] has invalid value '{value}'"))
            })
        })
        .transpose()
}

/// Check every method parameter, reporting all problems at once.
pub fn validate_parameters(parameters: &BTreeMap<String, String>) -> Result<()> {
    let mut errors = Vec::new();
    for (key, value) in parameters {
        let value = value.trim();
        match key.as_str() {
            SUMMARY_PRUNE_RATIO_FIELD => match value.parse::<f32>() {
                Ok(ratio) if ratio > 0.0 && ratio <= 1.0 => {}
                Ok(_) => errors.push(format!("Parameter [{key}] must be in (0, 1]")),
                Err(_) => errors.push(format!("Parameter [{key}] must be of f32 type")),
            },
            N_POSTINGS_FIELD => match value.parse::<i32>() {
                Ok(n) if n > 0 => {}
                Ok(_) => errors.push(format!("Parameter [{key}] must be a positive integer")),
                Err(_) => errors.push(format!("Parameter [{key}] must be of i32 type")),
            },
            CLUSTER_RATIO_FIELD => match value.parse::<f32>() {
                Ok(ratio) if ratio > 0.0 && ratio < 1.0 => {}
                Ok(_) => errors.push(format!("Parameter [{key}] must be in (0, 1)")),
                Err(_) => errors.push(format!("Parameter [{key}] must be of f32 type")),
            },
            APPROXIMATE_THRESHOLD_FIELD => match value.parse::<i32>() {
                Ok(n) if n >= 0 => {}
                Ok(_) => errors.push(format!("Parameter [{key}] must be a non-Negative integer")),
                Err(_) => errors.push(format!("Parameter [{key}] must be of i32 type")),
            },
            _ => errors.push(format!("Unknown parameter '{key}' found")),
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(IrisError::validation(errors))
    }
}

/// Whether the field attributes mark a clustered sparse field.
pub fn is_sparse_field(attributes: &BTreeMap<String, String>) -> bool {
    attributes
        .get(SPARSE_FIELD_ATTRIBUTE)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_valid_parameters() {
        let p = SeismicParams::from_parameters(&params(&[
            ("n_postings", "300"),
            ("cluster_ratio", "0.2"),
            ("summary_prune_ratio", "1"),
            ("approximate_threshold", "0"),
        ]))
        .unwrap();
        assert_eq!(p.n_postings, 300);
        assert_eq!(p.cluster_ratio, 0.2);
        assert_eq!(p.approximate_threshold, 0);

        let defaults = SeismicParams::from_parameters(&BTreeMap::new()).unwrap();
        assert_eq!(defaults, SeismicParams::default());
    }

    #[test]
    fn test_errors_are_accumulated() {
        let err = SeismicParams::from_parameters(&params(&[
            ("n_postings", "0"),
            ("cluster_ratio", "1"),
            ("summary_prune_ratio", "abc"),
            ("approximate_threshold", "-1"),
            ("k", "3"),
        ]))
        .unwrap_err();
        let IrisError::Validation(messages) = &err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(messages.len(), 5);
        assert!(messages.contains(&"Parameter [n_postings] must be a positive integer".to_string()));
        assert!(messages.contains(&"Parameter [cluster_ratio] must be in (0, 1)".to_string()));
        assert!(messages.contains(&"Parameter [summary_prune_ratio] must be of f32 type".to_string()));
        assert!(
            messages.contains(&"Parameter [approximate_threshold] must be a non-Negative integer".to_string())
        );
        assert!(messages.contains(&"Unknown parameter 'k' found".to_string()));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_attributes_round_trip() {
        let p = SeismicParams::default().with_n_postings(50).with_cluster_ratio(0.0);
        let attrs = p.to_attributes();
        assert!(is_sparse_field(&attrs));
        assert_eq!(SeismicParams::from_attributes(&attrs).unwrap(), p);
        assert!(!is_sparse_field(&BTreeMap::new()));
    }

    #[test]
    fn test_derived_n_postings() {
        let p = SeismicParams::default();
        assert_eq!(p.n_postings_for(1000), 160);
        assert_eq!(p.n_postings_for(1_000_000), 500);
        assert_eq!(p.with_n_postings(7).n_postings_for(1_000_000), 7);
    }

    #[test]
    fn test_should_cluster() {
        let p = SeismicParams::default().with_approximate_threshold(100);
        assert!(!p.should_cluster(99));
        assert!(p.should_cluster(100));
    }
}
