//! Sort keys: a field reference plus a direction.
//!
//! The string form is a leading `+` or `-` followed by the field name
//! (`+Title`, `-Year`); a missing sign means ascending.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One key of a multi-key sort spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field_name: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn ascending(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: true,
        }
    }

    pub fn descending(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ascending: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.ascending { '+' } else { '-' };
        write!(f, "{sign}{}", self.field_name)
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ascending, name) = match s.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => match s.strip_prefix('-') {
                Some(rest) => (false, rest),
                None => (true, s),
            },
        };
        if name.is_empty() {
            return Err(format!("empty sort key: {s:?}"));
        }
        Ok(Self {
            field_name: name.to_string(),
            ascending,
        })
    }
}

impl Serialize for SortKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SortKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
