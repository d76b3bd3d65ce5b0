//! Serializable document types.
//!
//! A `.grove` file is one JSON `Document`. Field definitions use a flat
//! key scheme where alternate formats ride alongside the base definition
//! as index-suffixed keys (`format:0`, `prefix:0`, ...), so a definition
//! and all its display variants stay one object in the file.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use grove_core::{StoredNode, UndoEntry};
use grove_model::{Field, FieldType, LeafData};

/// The persisted shape of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub template: Vec<StoredNode>,
    #[serde(default)]
    pub titleline: String,
    #[serde(default)]
    pub outputlines: Vec<String>,
    #[serde(default)]
    pub leaves: Vec<LeafData>,
    #[serde(default)]
    pub undos: Vec<UndoEntry>,
}

/// One field definition in the file's flat key scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor(pub Field);

const DEFAULT_SEPARATOR: &str = ", ";

impl Serialize for FieldDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let field = &self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &field.name)?;
        map.serialize_entry("fieldtype", field.field_type.as_str())?;
        map.serialize_entry("format", &field.format)?;
        if !field.init_value.is_empty() {
            map.serialize_entry("initvalue", &field.init_value)?;
        }
        if !field.prefix.is_empty() {
            map.serialize_entry("prefix", &field.prefix)?;
        }
        if !field.suffix.is_empty() {
            map.serialize_entry("suffix", &field.suffix)?;
        }
        if field.allow_multiples {
            map.serialize_entry("multiples", &true)?;
        }
        if field.separator != DEFAULT_SEPARATOR {
            map.serialize_entry("separator", &field.separator)?;
        }
        for (index, alt) in field.alt_formats.iter().enumerate() {
            map.serialize_entry(&format!("format:{index}"), &alt.format)?;
            if !alt.init_value.is_empty() {
                map.serialize_entry(&format!("initvalue:{index}"), &alt.init_value)?;
            }
            if !alt.prefix.is_empty() {
                map.serialize_entry(&format!("prefix:{index}"), &alt.prefix)?;
            }
            if !alt.suffix.is_empty() {
                map.serialize_entry(&format!("suffix:{index}"), &alt.suffix)?;
            }
        }
        map.end()
    }
}

/// Mutable slots gathered for the base field or one alternate.
#[derive(Debug, Default)]
struct Slots {
    format: Option<String>,
    init_value: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl Slots {
    fn set(&mut self, key: &str, value: String) -> bool {
        match key {
            "format" => self.format = Some(value),
            "initvalue" => self.init_value = Some(value),
            "prefix" => self.prefix = Some(value),
            "suffix" => self.suffix = Some(value),
            _ => return false,
        }
        true
    }

    fn apply(self, field: &mut Field) {
        if let Some(format) = self.format {
            field.format = format;
        }
        if let Some(init_value) = self.init_value {
            field.init_value = init_value;
        }
        if let Some(prefix) = self.prefix {
            field.prefix = prefix;
        }
        if let Some(suffix) = self.suffix {
            field.suffix = suffix;
        }
    }
}

impl<'de> Deserialize<'de> for FieldDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DescriptorVisitor;

        impl<'de> Visitor<'de> for DescriptorVisitor {
            type Value = FieldDescriptor;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a field definition object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut name: Option<String> = None;
                let mut type_name: Option<String> = None;
                let mut allow_multiples = false;
                let mut separator: Option<String> = None;
                let mut base = Slots::default();
                let mut alts: BTreeMap<usize, Slots> = BTreeMap::new();

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "name" => name = Some(map.next_value()?),
                        "fieldtype" => type_name = Some(map.next_value()?),
                        "multiples" => allow_multiples = map.next_value()?,
                        "separator" => separator = Some(map.next_value()?),
                        other => {
                            let value: String = map.next_value()?;
                            let consumed = match other.split_once(':') {
                                Some((slot_key, index_text)) => {
                                    match index_text.parse::<usize>() {
                                        Ok(index) => {
                                            alts.entry(index).or_default().set(slot_key, value)
                                        }
                                        Err(_) => false,
                                    }
                                }
                                None => base.set(other, value),
                            };
                            if !consumed {
                                return Err(serde::de::Error::custom(format!(
                                    "unknown field definition key \"{key}\""
                                )));
                            }
                        }
                    }
                }

                let name = name.ok_or_else(|| serde::de::Error::missing_field("name"))?;
                let type_name =
                    type_name.ok_or_else(|| serde::de::Error::missing_field("fieldtype"))?;
                let field_type: FieldType = type_name
                    .parse()
                    .map_err(serde::de::Error::custom)?;

                let mut field = Field::new(&name, field_type);
                base.apply(&mut field);
                field.allow_multiples = allow_multiples;
                if let Some(separator) = separator {
                    field.separator = separator;
                }
                // Alternate indices must be dense; a gap means a corrupt file.
                for (expected, (index, slots)) in alts.into_iter().enumerate() {
                    if index != expected {
                        return Err(serde::de::Error::custom(format!(
                            "non-contiguous alternate format index {index}"
                        )));
                    }
                    let mut alt = Field::new(&name, field_type);
                    slots.apply(&mut alt);
                    field.alt_formats.push(alt);
                }
                Ok(FieldDescriptor(field))
            }
        }

        deserializer.deserialize_map(DescriptorVisitor)
    }
}
