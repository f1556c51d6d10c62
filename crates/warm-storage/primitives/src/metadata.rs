//! Bounded key/value metadata

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::MetadataLimits;

/// Metadata validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// Keys and values arrays differ in length
    #[error("Metadata array length mismatch: {keys} keys, {values} values")]
    LengthMismatch {
        /// Number of keys
        keys: usize,
        /// Number of values
        values: usize,
    },

    /// More entries than the scope allows
    #[error("Too many metadata keys: {count} exceeds {max}")]
    TooManyKeys {
        /// Entries supplied
        count: usize,
        /// Scope limit
        max: usize,
    },

    /// Key longer than allowed
    #[error("Metadata key of {length} bytes exceeds {max}")]
    KeyTooLong {
        /// Offending key length
        length: usize,
        /// Limit
        max: usize,
    },

    /// Value longer than allowed
    #[error("Metadata value for key {key:?} of {length} bytes exceeds {max}")]
    ValueTooLong {
        /// Key of the offending value
        key: String,
        /// Offending value length
        length: usize,
        /// Limit
        max: usize,
    },

    /// Key repeated within one scope
    #[error("Duplicate metadata key {0:?}")]
    DuplicateKey(String),
}

/// One metadata key/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Key, unique within its scope
    pub key: String,
    /// Value, possibly empty
    pub value: String,
}

impl MetadataEntry {
    /// Create an entry
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Pair parallel key and value arrays
    pub fn zip(keys: Vec<String>, values: Vec<String>) -> Result<Vec<Self>, MetadataError> {
        if keys.len() != values.len() {
            return Err(MetadataError::LengthMismatch { keys: keys.len(), values: values.len() });
        }
        Ok(keys.into_iter().zip(values).map(|(key, value)| Self { key, value }).collect())
    }
}

/// Scope a set of entries is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataScope {
    /// Data set level
    DataSet,
    /// Single piece
    Piece,
}

impl MetadataLimits {
    /// Maximum entries for `scope`
    pub const fn max_keys(&self, scope: MetadataScope) -> usize {
        match scope {
            MetadataScope::DataSet => self.max_keys_per_data_set,
            MetadataScope::Piece => self.max_keys_per_piece,
        }
    }

    /// Check count, lengths and key uniqueness of `entries`
    pub fn validate(
        &self,
        entries: &[MetadataEntry],
        scope: MetadataScope,
    ) -> Result<(), MetadataError> {
        let max = self.max_keys(scope);
        if entries.len() > max {
            return Err(MetadataError::TooManyKeys { count: entries.len(), max });
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            if entry.key.len() > self.max_key_length {
                return Err(MetadataError::KeyTooLong {
                    length: entry.key.len(),
                    max: self.max_key_length,
                });
            }
            if entry.value.len() > self.max_value_length {
                return Err(MetadataError::ValueTooLong {
                    key: entry.key.clone(),
                    length: entry.value.len(),
                    max: self.max_value_length,
                });
            }
            if !seen.insert(entry.key.as_str()) {
                return Err(MetadataError::DuplicateKey(entry.key.clone()));
            }
        }
        Ok(())
    }
}

/// Whether `key` is present among `entries`
pub fn has_key(entries: &[MetadataEntry], key: &str) -> bool {
    entries.iter().any(|entry| entry.key == key)
}

/// Value stored under `key`, if any
pub fn value_of<'a>(entries: &'a [MetadataEntry], key: &str) -> Option<&'a str> {
    entries.iter().find(|entry| entry.key == key).map(|entry| entry.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<MetadataEntry> {
        pairs.iter().map(|(k, v)| MetadataEntry::new(*k, *v)).collect()
    }

    #[test]
    fn test_zip_length_mismatch() {
        let err = MetadataEntry::zip(vec!["a".into(), "b".into()], vec!["1".into()]).unwrap_err();
        assert_eq!(err, MetadataError::LengthMismatch { keys: 2, values: 1 });

        let ok = MetadataEntry::zip(vec!["a".into()], vec!["1".into()]).unwrap();
        assert_eq!(ok, entries(&[("a", "1")]));
    }

    #[test]
    fn test_validate_bounds() {
        let limits = MetadataLimits::default();
        assert!(limits.validate(&entries(&[("withCDN", "")]), MetadataScope::DataSet).is_ok());

        let long_key = "k".repeat(33);
        assert_eq!(
            limits.validate(&entries(&[(&long_key, "")]), MetadataScope::DataSet),
            Err(MetadataError::KeyTooLong { length: 33, max: 32 })
        );

        let long_value = "v".repeat(129);
        assert_matches::assert_matches!(
            limits.validate(&entries(&[("label", &long_value)]), MetadataScope::Piece),
            Err(MetadataError::ValueTooLong { length: 129, max: 128, .. })
        );
    }

    #[test]
    fn test_validate_count_per_scope() {
        let limits = MetadataLimits::default();
        let six: Vec<_> = (0..6).map(|i| MetadataEntry::new(format!("k{i}"), "v")).collect();
        assert!(limits.validate(&six, MetadataScope::DataSet).is_ok());
        assert_eq!(
            limits.validate(&six, MetadataScope::Piece),
            Err(MetadataError::TooManyKeys { count: 6, max: 5 })
        );
    }

    #[test]
    fn test_duplicate_key() {
        let limits = MetadataLimits::default();
        assert_eq!(
            limits.validate(&entries(&[("a", "1"), ("b", "2"), ("a", "3")]), MetadataScope::DataSet),
            Err(MetadataError::DuplicateKey("a".to_string()))
        );
    }

    #[test]
    fn test_lookup() {
        let set = entries(&[("withCDN", ""), ("region", "eu")]);
        assert!(has_key(&set, "withCDN"));
        assert!(!has_key(&set, "withIPFS"));
        assert_eq!(value_of(&set, "region"), Some("eu"));
        assert_eq!(value_of(&set, "withCDN"), Some(""));
    }
}
