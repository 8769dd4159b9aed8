//! One-byte weight quantization.
//!
//! The mapping is linear over `[0, ceiling]`. It is part of the on-disk
//! format: changing it changes the ranking of existing indices.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Ceiling used for document weights at index time.
pub const INGEST_CEILING: f32 = 3.0;
/// Ceiling used for query weights.
pub const SEARCH_CEILING: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ByteQuantizer {
    ceiling: f32,
}

impl ByteQuantizer {
    pub fn new(ceiling: f32) -> Self {
        ByteQuantizer { ceiling }
    }

    pub fn ingest() -> Self {
        Self::new(INGEST_CEILING)
    }

    pub fn search() -> Self {
        Self::new(SEARCH_CEILING)
    }

    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    pub fn quantize(&self, value: f32) -> u8 {
        if value.is_nan() || value <= 0.0 || self.ceiling <= 0.0 {
            return 0;
        }
        let clamped = value.min(self.ceiling);
        (clamped / self.ceiling * 255.0).round() as u8
    }

    pub fn dequantize(&self, value: u8) -> f32 {
        value as f32 / 255.0 * self.ceiling
    }
}

impl Default for ByteQuantizer {
    fn default() -> Self {
        Self::ingest()
    }
}

#[inline]
pub fn unsigned(value: u8) -> u32 {
    value as u32
}

#[inline]
pub fn compare_unsigned(a: u8, b: u8) -> Ordering {
    a.cmp(&b)
}

#[inline]
pub fn multiply_unsigned(a: u8, b: u8) -> u32 {
    unsigned(a) * unsigned(b)
}
