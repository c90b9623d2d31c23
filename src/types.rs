//! Core data types for volchunk

use crate::error::{Result, VolchunkError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Volume shape as (X, Y, Z)
pub type Shape = [usize; 3];

/// Coordinates of a block in the block grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockCoord {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

impl BlockCoord {
    /// Dataset name prefix shared by every block
    pub const KEY_PREFIX: &'static str = "block_";

    pub fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    /// Coordinates as an array, axis order (i, j, k)
    pub fn to_array(&self) -> [usize; 3] {
        [self.i, self.j, self.k]
    }

    /// Stable dataset key for this block, e.g. `block_1_0_2`
    pub fn key(&self) -> String {
        format!("{}{}_{}_{}", Self::KEY_PREFIX, self.i, self.j, self.k)
    }

    /// Parse a dataset key produced by [`BlockCoord::key`].
    ///
    /// Returns `None` if the key doesn't carry the block prefix. Keys that do
    /// carry it but are malformed are a [`VolchunkError::CorruptBlock`].
    pub fn parse_key(key: &str) -> Option<Result<Self>> {
        let rest = key.strip_prefix(Self::KEY_PREFIX)?;
        let parts: Vec<&str> = rest.split('_').collect();
        if parts.len() != 3 {
            return Some(Err(VolchunkError::CorruptBlock(format!(
                "malformed block key '{}'",
                key
            ))));
        }

        let mut coords = [0usize; 3];
        for (slot, part) in coords.iter_mut().zip(parts) {
            match part.parse::<usize>() {
                Ok(v) => *slot = v,
                Err(_) => {
                    return Some(Err(VolchunkError::CorruptBlock(format!(
                        "malformed block key '{}'",
                        key
                    ))))
                }
            }
        }

        Some(Ok(Self::new(coords[0], coords[1], coords[2])))
    }
}

impl fmt::Display for BlockCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.i, self.j, self.k)
    }
}

/// 4x4 matrix mapping voxel indices to physical space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    rows: [[f64; 4]; 4],
}

impl AffineTransform {
    pub fn new(rows: [[f64; 4]; 4]) -> Self {
        Self { rows }
    }

    pub fn identity() -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (n, row) in rows.iter_mut().enumerate() {
            row[n] = 1.0;
        }
        Self { rows }
    }

    /// Build from 16 floats in row-major order
    pub fn from_row_major(values: &[f64]) -> Result<Self> {
        if values.len() != 16 {
            return Err(VolchunkError::InvalidFormat(format!(
                "affine needs 16 values, got {}",
                values.len()
            )));
        }

        let mut rows = [[0.0; 4]; 4];
        for (n, &v) in values.iter().enumerate() {
            rows[n / 4][n % 4] = v;
        }
        Ok(Self { rows })
    }

    /// Flatten to 16 floats in row-major order
    pub fn to_row_major(&self) -> Vec<f64> {
        self.rows.iter().flatten().copied().collect()
    }

    pub fn rows(&self) -> &[[f64; 4]; 4] {
        &self.rows
    }

    pub fn row(&self, n: usize) -> [f64; 4] {
        self.rows[n]
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    IntVector(Vec<i64>),
    FloatVector(Vec<f64>),
    Text(String),
}

impl HeaderValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HeaderValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Scalar as float; integer scalars are widened
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Vector as integers; float vectors only if every element is integral
    pub fn as_int_vector(&self) -> Option<Vec<i64>> {
        match self {
            HeaderValue::IntVector(v) => Some(v.clone()),
            HeaderValue::FloatVector(v) if v.iter().all(|x| x.fract() == 0.0) => {
                Some(v.iter().map(|&x| x as i64).collect())
            }
            _ => None,
        }
    }

    /// Vector as floats; integer vectors are widened
    pub fn as_float_vector(&self) -> Option<Vec<f64>> {
        match self {
            HeaderValue::FloatVector(v) => Some(v.clone()),
            HeaderValue::IntVector(v) => Some(v.iter().map(|&x| x as f64).collect()),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Int(v) => write!(f, "{}", v),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::IntVector(v) => write!(f, "{:?}", v),
            HeaderValue::FloatVector(v) => write!(f, "{:?}", v),
            HeaderValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// Insertion-ordered attribute set.
///
/// Used both for scan header metadata and for container/dataset attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderAttributes {
    entries: Vec<(String, HeaderValue)>,
}

impl HeaderAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, value: HeaderValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: HeaderValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, HeaderValue)> for HeaderAttributes {
    fn from_iter<T: IntoIterator<Item = (String, HeaderValue)>>(iter: T) -> Self {
        let mut attrs = HeaderAttributes::new();
        for (k, v) in iter {
            attrs.insert(k, v);
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_key_roundtrip() {
        let coord = BlockCoord::new(2, 0, 11);
        assert_eq!(coord.key(), "block_2_0_11");
        assert_eq!(BlockCoord::parse_key("block_2_0_11").unwrap().unwrap(), coord);
    }

    #[test]
    fn test_block_key_rejects_malformed() {
        assert!(BlockCoord::parse_key("nii_data").is_none());
        assert!(BlockCoord::parse_key("block_1_2").unwrap().is_err());
        assert!(BlockCoord::parse_key("block_a_2_3").unwrap().is_err());
        assert!(BlockCoord::parse_key("block_-1_2_3").unwrap().is_err());
    }

    #[test]
    fn test_affine_row_major() {
        let values: Vec<f64> = (0..16).map(|v| v as f64 * 0.5).collect();
        let affine = AffineTransform::from_row_major(&values).unwrap();
        assert_eq!(affine.row(1), [2.0, 2.5, 3.0, 3.5]);
        assert_eq!(affine.to_row_major(), values);
        assert!(AffineTransform::from_row_major(&values[..15]).is_err());
    }

    #[test]
    fn test_attributes_keep_insertion_order() {
        let mut attrs = HeaderAttributes::new()
            .with("sizeof_hdr", HeaderValue::Int(348))
            .with("dim", HeaderValue::IntVector(vec![3, 4, 5, 6, 1, 1, 1, 1]))
            .with("descrip", HeaderValue::Text("ct".into()));

        attrs.insert("sizeof_hdr", HeaderValue::Int(540));
        let keys: Vec<&str> = attrs.keys().collect();
        assert_eq!(keys, vec!["sizeof_hdr", "dim", "descrip"]);
        assert_eq!(attrs.get("sizeof_hdr"), Some(&HeaderValue::Int(540)));
    }

    #[test]
    fn test_header_value_conversions() {
        assert_eq!(HeaderValue::Int(3).as_float(), Some(3.0));
        assert_eq!(
            HeaderValue::FloatVector(vec![1.0, 2.0]).as_int_vector(),
            Some(vec![1, 2])
        );
        assert_eq!(HeaderValue::FloatVector(vec![1.5]).as_int_vector(), None);
        assert_eq!(HeaderValue::Text("x".into()).as_int(), None);
    }
}
