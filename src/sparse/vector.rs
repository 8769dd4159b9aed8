//! Quantized sparse vectors.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};
use crate::sparse::quantization::{ByteQuantizer, multiply_unsigned};

/// `(token, weight)` pairs ordered by token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SparseVector {
    tokens: Vec<u32>,
    weights: Vec<u8>,
}

impl SparseVector {
    pub fn new(mut items: Vec<(u32, u8)>) -> Self {
        items.sort_by_key(|&(token, _)| token);
        let (tokens, weights) = items.into_iter().unzip();
        SparseVector { tokens, weights }
    }

    /// Build from token strings and raw weights. Tokens must be numeric ids.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, f32)], quantizer: &ByteQuantizer) -> Result<Self> {
        let items = pairs
            .iter()
            .map(|(token, weight)| Ok((parse_token(token.as_ref())?, quantizer.quantize(*weight))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(items))
    }

    /// Decode a forward-index doc value: `[i32 len][utf8 token][f32 weight]`
    /// repeated, big-endian.
    pub fn from_doc_value(bytes: &[u8], quantizer: &ByteQuantizer) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let mut pairs: Vec<(String, f32)> = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            let len = cursor.read_i32::<BigEndian>()?;
            let len = usize::try_from(len)
                .map_err(|_| IrisError::corrupt(format!("negative token length {len}")))?;
            let mut token = vec![0u8; len];
            cursor.read_exact(&mut token)?;
            let token = String::from_utf8(token)
                .map_err(|e| IrisError::corrupt(format!("token is not UTF-8: {e}")))?;
            let weight = cursor.read_f32::<BigEndian>()?;
            pairs.push((token, weight));
        }
        // Later duplicates win, like a map insert.
        pairs.reverse();
        let mut seen = ahash::AHashSet::new();
        pairs.retain(|(token, _)| seen.insert(token.clone()));
        Self::from_pairs(&pairs, quantizer)
    }

    /// Inverse of [`SparseVector::from_doc_value`] for raw weights.
    pub fn encode_doc_value<S: AsRef<str>>(pairs: &[(S, f32)]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (token, weight) in pairs {
            let token = token.as_ref().as_bytes();
            let len = i32::try_from(token.len())
                .map_err(|_| IrisError::invalid_argument("token too long"))?;
            out.write_i32::<BigEndian>(len)?;
            out.extend_from_slice(token);
            out.write_f32::<BigEndian>(*weight)?;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn weights(&self) -> &[u8] {
        &self.weights
    }

    pub fn items(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.tokens.iter().copied().zip(self.weights.iter().copied())
    }

    /// Dense byte array indexed by token, sized to the largest token.
    pub fn to_dense(&self) -> Vec<u8> {
        let Some(&max) = self.tokens.last() else {
            return Vec::new();
        };
        let mut dense = vec![0u8; max as usize + 1];
        for (token, weight) in self.items() {
            dense[token as usize] = weight;
        }
        dense
    }

    /// Unsigned dot product with a dense vector; tokens past its end score 0.
    pub fn dot_product(&self, dense: &[u8]) -> u32 {
        self.items()
            .take_while(|&(token, _)| (token as usize) < dense.len())
            .map(|(token, weight)| multiply_unsigned(weight, dense[token as usize]))
            .sum()
    }

    pub fn ram_bytes_used(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.tokens.capacity() * std::mem::size_of::<u32>()
            + self.weights.capacity()
    }
}

fn parse_token(token: &str) -> Result<u32> {
    token
        .trim()
        .parse::<u32>()
        .map_err(|_| IrisError::invalid_argument(format!("token '{token}' is not a numeric token id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_sorted_by_token() {
        let v = SparseVector::new(vec![(9, 1), (2, 5), (4, 3)]);
        assert_eq!(v.tokens(), &[2, 4, 9]);
        assert_eq!(v.weights(), &[5, 3, 1]);
    }

    #[test]
    fn test_doc_value_decoding() {
        let bytes = SparseVector::encode_doc_value(&[("10", 3.0_f32), ("2", 1.5)]).unwrap();
        let v = SparseVector::from_doc_value(&bytes, &ByteQuantizer::ingest()).unwrap();
        assert_eq!(v.items().collect::<Vec<_>>(), vec![(2, 128), (10, 255)]);
        assert!(SparseVector::from_doc_value(&[], &ByteQuantizer::ingest()).unwrap().is_empty());
    }

    #[test]
    fn test_doc_value_errors() {
        let q = ByteQuantizer::ingest();
        assert!(SparseVector::from_doc_value(&[0, 0, 0, 5, b'a'], &q).is_err());
        let bytes = SparseVector::encode_doc_value(&[("abc", 1.0_f32)]).unwrap();
        assert!(SparseVector::from_doc_value(&bytes, &q).unwrap_err().is_user_error());
    }

    #[test]
    fn test_dense_and_dot_product() {
        let v = SparseVector::new(vec![(1, 2), (3, 200)]);
        assert_eq!(v.to_dense(), vec![0, 2, 0, 200]);
        assert_eq!(v.dot_product(&[0, 10, 0, 200]), 20 + 40_000);
        // Token 3 lies past the dense array.
        assert_eq!(v.dot_product(&[0, 10]), 20);
        assert_eq!(SparseVector::default().dot_product(&[1, 2]), 0);
    }
}
