//! The ordered collection of field definitions for one document.

use serde::{Deserialize, Serialize};

use crate::error::{GroveError, Result};
use crate::field::Field;

/// Fields in user-defined order, keyed by unique name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Field names in definition order.
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    /// Resolve a template reference: the base field, or one of its
    /// alternate formats when an index is given.
    pub fn resolve(&self, name: &str, alt_index: Option<usize>) -> Option<&Field> {
        let field = self.get(name)?;
        match alt_index {
            Some(index) => field.alt_format(index),
            None => Some(field),
        }
    }

    /// Append a field; names must stay unique.
    pub fn add(&mut self, field: Field) -> Result<()> {
        if field.name.is_empty() {
            return Err(GroveError::Validation("field name is empty".into()));
        }
        if self.contains(&field.name) {
            return Err(GroveError::DuplicateField(field.name));
        }
        self.fields.push(field);
        Ok(())
    }

    /// Remove a field by name, returning the definition if present.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let pos = self.fields.iter().position(|field| field.name == name)?;
        Some(self.fields.remove(pos))
    }

    /// Rename a field in place, keeping its position. The caller is
    /// responsible for cascading the rename to templates and leaf data.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if new_name.is_empty() {
            return Err(GroveError::Validation("field name is empty".into()));
        }
        if old_name != new_name && self.contains(new_name) {
            return Err(GroveError::DuplicateField(new_name.to_string()));
        }
        let field = self
            .get_mut(old_name)
            .ok_or_else(|| GroveError::UnknownField(old_name.to_string()))?;
        field.name = new_name.to_string();
        for alt in &mut field.alt_formats {
            alt.name = new_name.to_string();
        }
        Ok(())
    }

    /// Replace a field with a freshly built definition at the same
    /// position. Used by type changes, which rebuild from scratch.
    pub fn replace(&mut self, name: &str, replacement: Field) -> Result<()> {
        let pos = self
            .fields
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| GroveError::UnknownField(name.to_string()))?;
        self.fields[pos] = replacement;
        Ok(())
    }

    /// Check every field's format string; called at document load.
    pub fn check_formats(&self) -> Result<()> {
        for field in &self.fields {
            field.check_format()?;
        }
        Ok(())
    }
}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;

    #[test]
    fn add_rejects_duplicates() {
        let mut fields = FieldSet::new();
        fields.add(Field::new("Title", FieldType::Text)).unwrap();
        let err = fields.add(Field::new("Title", FieldType::Number));
        assert!(matches!(err, Err(GroveError::DuplicateField(_))));
    }

    #[test]
    fn rename_keeps_position() {
        let mut fields = FieldSet::new();
        fields.add(Field::new("Title", FieldType::Text)).unwrap();
        fields.add(Field::new("Year", FieldType::Number)).unwrap();
        fields.rename("Title", "Name").unwrap();
        assert_eq!(fields.names(), vec!["Name", "Year"]);
    }

    #[test]
    fn rename_rejects_collisions() {
        let mut fields = FieldSet::new();
        fields.add(Field::new("Title", FieldType::Text)).unwrap();
        fields.add(Field::new("Year", FieldType::Number)).unwrap();
        assert!(fields.rename("Title", "Year").is_err());
        assert!(fields.rename("Missing", "X").is_err());
    }

    #[test]
    fn resolve_alt_formats() {
        let mut fields = FieldSet::new();
        let mut when = Field::new("When", FieldType::Date);
        when.add_alt_format(Field::new("When", FieldType::Date).with_format("yyyy"));
        fields.add(when).unwrap();

        assert!(fields.resolve("When", None).is_some());
        assert_eq!(
            fields.resolve("When", Some(0)).map(|f| f.format.as_str()),
            Some("yyyy")
        );
        assert!(fields.resolve("When", Some(1)).is_none());
    }
}
