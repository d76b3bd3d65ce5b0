//! Tests for grove-model types.

use std::cmp::Ordering;

use grove_model::{Field, FieldSet, FieldType, LeafData, SortKey};

fn movie_fields() -> FieldSet {
    let mut fields = FieldSet::new();
    fields.add(Field::new("Title", FieldType::Text)).unwrap();
    fields
        .add(Field::new("Genre", FieldType::AutoChoice).with_multiples())
        .unwrap();
    fields
        .add(Field::new("Year", FieldType::Number).with_format("0000"))
        .unwrap();
    fields
}

#[test]
fn field_set_preserves_definition_order() {
    let fields = movie_fields();
    assert_eq!(fields.names(), vec!["Title", "Genre", "Year"]);
}

#[test]
fn number_field_formats_and_compares() {
    let fields = movie_fields();
    let year = fields.get("Year").unwrap();

    let mut data = LeafData::new();
    data.set_value("Year", "42");
    assert_eq!(year.output_text(&data), "0042");

    assert_eq!(year.compare_values("9", "41"), Ordering::Less);
}

#[test]
fn validation_blocks_bad_values_only() {
    let fields = movie_fields();
    let year = fields.get("Year").unwrap();
    assert!(year.validate_message("1987").is_none());
    assert!(year.validate_message("soon").is_some());
    // Empty means unset and is always acceptable.
    assert!(year.validate_message("").is_none());
}

#[test]
fn field_serializes_round_trip() {
    let field = Field::new("When", FieldType::Date)
        .with_format("MMM d, yyyy")
        .with_prefix("on ");
    let json = serde_json::to_string(&field).expect("serialize field");
    let round: Field = serde_json::from_str(&json).expect("deserialize field");
    assert_eq!(round, field);
}

#[test]
fn sort_key_string_forms() {
    let keys: Vec<SortKey> = ["+Title", "-Year"]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();
    assert!(keys[0].ascending);
    assert!(!keys[1].ascending);
    let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["+Title", "-Year"]);
}

#[test]
fn format_checks_abort_on_corrupt_formats() {
    let mut fields = movie_fields();
    assert!(fields.check_formats().is_ok());
    fields
        .add(Field::new("Bad", FieldType::Date).with_format("nope"))
        .unwrap();
    assert!(fields.check_formats().is_err());
}
