//! The stored data map carried by a leaf record.
//!
//! A leaf maps field names to ordered sequences of stored strings. The
//! sequence has length 1 unless the field allows multiple values. Stored
//! strings are always the canonical representation (ISO dates, plain
//! numbers), never the display form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field name -> ordered stored values for one record.
///
/// Keys with an empty value list are treated the same as absent keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeafData(BTreeMap<String, Vec<String>>);

impl LeafData {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored values for a field, empty slice when unset.
    pub fn values(&self, field_name: &str) -> &[String] {
        self.0.get(field_name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first stored value for a field, or `None` when unset or blank.
    pub fn first_value(&self, field_name: &str) -> Option<&str> {
        self.values(field_name)
            .first()
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Replace all values for a field. An empty list removes the key.
    pub fn set_values(&mut self, field_name: &str, values: Vec<String>) {
        if values.is_empty() {
            self.0.remove(field_name);
        } else {
            self.0.insert(field_name.to_string(), values);
        }
    }

    /// Replace the single value for a field. An empty string removes the key.
    pub fn set_value(&mut self, field_name: &str, value: &str) {
        if value.is_empty() {
            self.0.remove(field_name);
        } else {
            self.0.insert(field_name.to_string(), vec![value.to_string()]);
        }
    }

    /// Drop the stored values for a field, returning what was there.
    pub fn remove(&mut self, field_name: &str) -> Option<Vec<String>> {
        self.0.remove(field_name)
    }

    /// Move the values stored under `old_name` to `new_name`.
    /// Used by field renames, which must cascade to every leaf.
    pub fn rename_key(&mut self, old_name: &str, new_name: &str) {
        if let Some(values) = self.0.remove(old_name) {
            self.0.insert(new_name.to_string(), values);
        }
    }

    pub fn contains(&self, field_name: &str) -> bool {
        !self.values(field_name).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over (field name, values) pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Field names present in this record, in key order.
    pub fn field_names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

impl FromIterator<(String, Vec<String>)> for LeafData {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, v)| !v.is_empty()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_values() {
        let mut data = LeafData::new();
        data.set_value("Title", "A night at the opera");
        data.set_values("Genre", vec!["Comedy".into(), "Drama".into()]);

        assert_eq!(data.first_value("Title"), Some("A night at the opera"));
        assert_eq!(data.values("Genre").len(), 2);
        assert_eq!(data.first_value("Missing"), None);
    }

    #[test]
    fn empty_value_removes_key() {
        let mut data = LeafData::new();
        data.set_value("Title", "X");
        data.set_value("Title", "");
        assert!(!data.contains("Title"));
        assert!(data.is_empty());
    }

    #[test]
    fn rename_key_moves_values() {
        let mut data = LeafData::new();
        data.set_value("Year", "1987");
        data.rename_key("Year", "Released");
        assert_eq!(data.first_value("Released"), Some("1987"));
        assert!(!data.contains("Year"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut data = LeafData::new();
        data.set_values("Genre", vec!["Comedy".into()]);
        let json = serde_json::to_string(&data).expect("serialize leaf data");
        assert_eq!(json, r#"{"Genre":["Comedy"]}"#);
    }
}
