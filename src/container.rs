//! Hierarchical container: root attributes, attribute groups and named
//! byte datasets, persisted as a single file.

use crate::error::{Result, VolchunkError};
use crate::types::{HeaderAttributes, HeaderValue};
use crate::CONTAINER_MAGIC;
use serde::{Deserialize, Serialize};

/// A named group carrying only attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub attrs: HeaderAttributes,
}

/// A named byte dataset with its own attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub data: Vec<u8>,
    pub attrs: HeaderAttributes,
}

impl Dataset {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            attrs: HeaderAttributes::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: HeaderValue) -> Self {
        self.attrs.insert(key, value);
        self
    }
}

/// In-memory container. Groups and datasets keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    attrs: HeaderAttributes,
    groups: Vec<Group>,
    datasets: Vec<Dataset>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attrs(&self) -> &HeaderAttributes {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&HeaderValue> {
        self.attrs.get(key)
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: HeaderValue) {
        self.attrs.insert(key, value);
    }

    /// Add a group; names are unique across groups and datasets
    pub fn add_group(&mut self, name: impl Into<String>, attrs: HeaderAttributes) -> Result<()> {
        let name = name.into();
        self.ensure_free(&name)?;
        self.groups.push(Group { name, attrs });
        Ok(())
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Add a dataset; names are unique across groups and datasets
    pub fn add_dataset(&mut self, dataset: Dataset) -> Result<()> {
        self.ensure_free(&dataset.name)?;
        self.datasets.push(dataset);
        Ok(())
    }

    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|d| d.name == name)
    }

    pub fn has_dataset(&self, name: &str) -> bool {
        self.dataset(name).is_some()
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Names of every top-level group and dataset
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .map(|g| g.name.as_str())
            .chain(self.datasets.iter().map(|d| d.name.as_str()))
    }

    /// Total payload bytes across datasets
    pub fn payload_bytes(&self) -> usize {
        self.datasets.iter().map(|d| d.data.len()).sum()
    }

    fn ensure_free(&self, name: &str) -> Result<()> {
        if self.keys().any(|k| k == name) {
            return Err(VolchunkError::InvalidFormat(format!(
                "container key '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// Serialize to the on-disk form: magic followed by the bincode body
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)?;
        let mut bytes = Vec::with_capacity(CONTAINER_MAGIC.len() + body.len());
        bytes.extend_from_slice(CONTAINER_MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Parse the on-disk form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = bytes.strip_prefix(CONTAINER_MAGIC.as_slice()).ok_or_else(|| {
            VolchunkError::InvalidFormat("missing container magic".to_string())
        })?;
        Ok(bincode::deserialize(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_container() -> Container {
        let mut container = Container::new();
        container.set_attr("affine_matrix", HeaderValue::FloatVector(vec![1.0; 16]));
        container
            .add_group(
                "header",
                HeaderAttributes::new().with("descrip", HeaderValue::Text("scan".into())),
            )
            .unwrap();
        container
            .add_dataset(
                Dataset::new("block_0_0_0", vec![1, 2, 3])
                    .with_attr("compressed_len", HeaderValue::Int(3)),
            )
            .unwrap();
        container
    }

    #[test]
    fn test_keys_and_lookup() {
        let container = sample_container();
        let keys: Vec<&str> = container.keys().collect();
        assert_eq!(keys, vec!["header", "block_0_0_0"]);
        assert!(container.has_dataset("block_0_0_0"));
        assert!(!container.has_dataset("header"));
        assert_eq!(container.payload_bytes(), 3);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let mut container = sample_container();
        assert!(container.add_dataset(Dataset::new("header", vec![])).is_err());
        assert!(container
            .add_group("block_0_0_0", HeaderAttributes::new())
            .is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let container = sample_container();
        let bytes = container.to_bytes().unwrap();
        assert_eq!(&bytes[..4], CONTAINER_MAGIC);
        assert_eq!(Container::from_bytes(&bytes).unwrap(), container);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = sample_container().to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Container::from_bytes(&bytes),
            Err(VolchunkError::InvalidFormat(_))
        ));
        assert!(Container::from_bytes(&[]).is_err());
    }
}
