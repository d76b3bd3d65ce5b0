//! Property tests for the template parser.

use grove_core::template::ParsedLine;
use grove_model::{Field, FieldSet, FieldType};
use proptest::prelude::*;

fn fields() -> FieldSet {
    let mut fields = FieldSet::new();
    fields
        .add(Field::new("Title", FieldType::Text))
        .expect("add Title");
    fields
        .add(Field::new("Genre", FieldType::AutoChoice))
        .expect("add Genre");
    fields
}

proptest! {
    /// Parsing never loses text: resolved references, unresolved
    /// references, and malformed delimiters all reproduce the input
    /// exactly.
    #[test]
    fn parse_round_trips_any_text(text in ".{0,60}") {
        let fields = fields();
        let line = ParsedLine::parse(&text, &fields);
        prop_assert_eq!(line.to_template_text(), text);
    }

    /// Interleaving known references with arbitrary literal chunks still
    /// round-trips and resolves every reference.
    #[test]
    fn references_survive_arbitrary_literals(
        chunks in prop::collection::vec("[^{*]{0,12}", 1..5)
    ) {
        let fields = fields();
        let text = chunks.join("{*Title*}");
        let line = ParsedLine::parse(&text, &fields);
        prop_assert_eq!(line.to_template_text(), text.clone());
        if chunks.len() > 1 {
            prop_assert_eq!(line.field_names(), vec!["Title".to_string()]);
        }
    }
}
