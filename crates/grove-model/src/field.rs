//! Typed field definitions.
//!
//! A field owns the formatting, validation, and ordering semantics for one
//! named slot of leaf data. Stored text is always canonical (ISO dates,
//! plain decimal numbers); the `format` string only shapes display output.
//!
//! A field may carry *alternate-format* sub-fields: siblings with the same
//! name and type but a different format/prefix/suffix, referenced
//! positionally from templates so one value can render two ways inside a
//! single view.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::format::{choice, datetime, number};
use crate::leaf::LeafData;

/// The closed set of field kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Single-line free text, case-insensitive ordering.
    Text,
    /// Multi-line free text; same semantics as Text apart from editing.
    LongText,
    /// Value restricted to a fixed `/`-delimited option list.
    Choice,
    /// Open option list that accumulates observed values; no validation.
    AutoChoice,
    /// Decimal number with digit-pattern display formatting.
    Number,
    /// Calendar date, stored as ISO `yyyy-MM-dd`.
    Date,
    /// Time of day, stored as `HH:mm:ss`.
    Time,
}

impl FieldType {
    /// Canonical type tag used in persisted documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::LongText => "longtext",
            FieldType::Choice => "choice",
            FieldType::AutoChoice => "autochoice",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Time => "time",
        }
    }

    /// The default display format for a freshly created field of this type.
    pub fn default_format(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => "",
            FieldType::Choice => "yes/no",
            FieldType::Number => "#.##",
            FieldType::Date => "MMM d, yyyy",
            FieldType::Time => "h:mm a",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "text" => Ok(FieldType::Text),
            "longtext" => Ok(FieldType::LongText),
            "choice" => Ok(FieldType::Choice),
            "autochoice" => Ok(FieldType::AutoChoice),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "time" => Ok(FieldType::Time),
            other => Err(format!("unknown field type: {other}")),
        }
    }
}

/// Separator value meaning "repeat the whole output line per value" instead
/// of joining values inline.
pub const FULL_LINE_SEPARATOR: &str = "\n";

fn default_separator() -> String {
    ", ".to_string()
}

/// One typed field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub init_value: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(default)]
    pub allow_multiples: bool,
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Alternate-format siblings, referenced positionally from templates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_formats: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            format: field_type.default_format().to_string(),
            init_value: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            allow_multiples: false,
            separator: default_separator(),
            alt_formats: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn with_multiples(mut self) -> Self {
        self.allow_multiples = true;
        self
    }

    /// True when multiple values render as repeated full lines rather than
    /// inline, separator-joined segments.
    pub fn is_full_line_separator(&self) -> bool {
        self.separator.contains(FULL_LINE_SEPARATOR)
    }

    /// Structural equality used to deduplicate alternate-format fields.
    /// Deliberately ignores `field_type` (and nested alternates).
    pub fn same_format(&self, other: &Field) -> bool {
        self.name == other.name
            && self.format == other.format
            && self.init_value == other.init_value
            && self.prefix == other.prefix
            && self.suffix == other.suffix
    }

    /// Register an alternate format, reusing a structurally equal existing
    /// entry. Returns the positional index templates use to reference it.
    pub fn add_alt_format(&mut self, alt: Field) -> usize {
        if let Some(pos) = self.alt_formats.iter().position(|f| f.same_format(&alt)) {
            return pos;
        }
        self.alt_formats.push(alt);
        self.alt_formats.len() - 1
    }

    pub fn alt_format(&self, index: usize) -> Option<&Field> {
        self.alt_formats.get(index)
    }

    /// Validate a candidate stored value. `None` means acceptable; a message
    /// names the problem. Empty text is always acceptable (it means unset).
    pub fn validate_message(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        match self.field_type {
            FieldType::Text | FieldType::LongText | FieldType::AutoChoice => None,
            FieldType::Choice => {
                let options = choice::split_options(&self.format);
                if options.iter().any(|option| option == text) {
                    None
                } else {
                    Some(format!(
                        "\"{text}\" is not one of: {}",
                        options.join(", ")
                    ))
                }
            }
            FieldType::Number => {
                if number::parse_number(text).is_some() {
                    None
                } else {
                    Some(format!("\"{text}\" is not a number"))
                }
            }
            FieldType::Date => {
                if datetime::parse_stored_date(text).is_some() {
                    None
                } else {
                    Some(format!("\"{text}\" is not a date in yyyy-MM-dd form"))
                }
            }
            FieldType::Time => {
                if datetime::parse_stored_time(text).is_some() {
                    None
                } else {
                    Some(format!("\"{text}\" is not a time in HH:mm:ss form"))
                }
            }
        }
    }

    /// True when every stored value for this field passes validation.
    pub fn is_stored_text_valid(&self, data: &LeafData) -> bool {
        data.values(&self.name)
            .iter()
            .all(|value| self.validate_message(value).is_none())
    }

    /// Check this field's format string; a bad format aborts document load.
    pub fn check_format(&self) -> crate::error::Result<()> {
        match self.field_type {
            FieldType::Number => number::check_pattern(&self.format),
            FieldType::Date => datetime::check_date_format(&self.format),
            FieldType::Time => datetime::check_time_format(&self.format),
            _ => Ok(()),
        }?;
        for alt in &self.alt_formats {
            alt.check_format()?;
        }
        Ok(())
    }

    /// Apply type-specific display formatting to one stored value.
    /// Unparseable stored text passes through unchanged.
    pub fn format_value(&self, stored: &str) -> String {
        match self.field_type {
            FieldType::Text
            | FieldType::LongText
            | FieldType::Choice
            | FieldType::AutoChoice => stored.to_string(),
            FieldType::Number => match number::parse_number(stored) {
                Some(value) => number::format_number(value, &self.format),
                None => stored.to_string(),
            },
            FieldType::Date => match datetime::parse_stored_date(stored) {
                Some(date) => datetime::format_date(date, &self.format),
                None => stored.to_string(),
            },
            FieldType::Time => match datetime::parse_stored_time(stored) {
                Some(time) => datetime::format_time(time, &self.format),
                None => stored.to_string(),
            },
        }
    }

    /// Formatted output for the first stored value, with prefix and suffix.
    /// Empty string when unset.
    pub fn output_text(&self, data: &LeafData) -> String {
        match data.first_value(&self.name) {
            Some(stored) => format!("{}{}{}", self.prefix, self.format_value(stored), self.suffix),
            None => String::new(),
        }
    }

    /// One formatted output string per stored value.
    pub fn all_output_text(&self, data: &LeafData) -> Vec<String> {
        data.values(&self.name)
            .iter()
            .filter(|stored| !stored.is_empty())
            .map(|stored| format!("{}{}{}", self.prefix, self.format_value(stored), self.suffix))
            .collect()
    }

    /// Compare two stored values using this field's ordering semantics.
    /// Comparison parses the canonical stored form and is independent of the
    /// display format; unset sorts before set.
    pub fn compare_values(&self, a: &str, b: &str) -> Ordering {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match self.field_type {
            FieldType::Number => match (number::parse_number(a), number::parse_number(b)) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => lexical(a, b),
            },
            FieldType::Date => {
                match (datetime::parse_stored_date(a), datetime::parse_stored_date(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => lexical(a, b),
                }
            }
            FieldType::Time => {
                match (datetime::parse_stored_time(a), datetime::parse_stored_time(b)) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    _ => lexical(a, b),
                }
            }
            _ => lexical(a, b),
        }
    }

    /// Compare two records by their first stored value for this field.
    pub fn compare_records(&self, a: &LeafData, b: &LeafData) -> Ordering {
        self.compare_values(
            a.first_value(&self.name).unwrap_or(""),
            b.first_value(&self.name).unwrap_or(""),
        )
    }

    /// Record a value observed on an AutoChoice field, growing the open
    /// option list. No effect on other field types.
    pub fn add_observed(&mut self, value: &str) {
        if self.field_type != FieldType::AutoChoice || value.is_empty() {
            return;
        }
        let mut options = choice::split_options(&self.format);
        if !options.iter().any(|option| option == value) {
            options.push(value.to_string());
            self.format = choice::join_options(&options);
        }
    }

    /// Current option list for Choice and AutoChoice fields.
    pub fn options(&self) -> Vec<String> {
        choice::split_options(&self.format)
    }
}

/// Case-insensitive lexical ordering for text-like fields, with a
/// case-sensitive tiebreak so unequal strings never compare equal.
fn lexical(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(pairs: &[(&str, &[&str])]) -> LeafData {
        pairs
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn type_tags_are_lowercase_and_round_trip() {
        for field_type in [
            FieldType::Text,
            FieldType::LongText,
            FieldType::Choice,
            FieldType::AutoChoice,
            FieldType::Number,
            FieldType::Date,
            FieldType::Time,
        ] {
            let tag = field_type.as_str();
            assert_eq!(tag, tag.to_lowercase());
            assert_eq!(tag.parse::<FieldType>(), Ok(field_type));
        }
    }

    #[test]
    fn output_text_applies_prefix_and_format() {
        let field = Field::new("Year", FieldType::Number)
            .with_format("0000")
            .with_prefix("(")
            .with_suffix(")");
        let data = leaf(&[("Year", &["87"])]);
        assert_eq!(field.output_text(&data), "(0087)");
        assert_eq!(field.output_text(&LeafData::new()), "");
    }

    #[test]
    fn all_output_text_formats_each_value() {
        let field = Field::new("Genre", FieldType::AutoChoice).with_multiples();
        let data = leaf(&[("Genre", &["Comedy", "Drama"])]);
        assert_eq!(field.all_output_text(&data), vec!["Comedy", "Drama"]);
    }

    #[test]
    fn choice_validation() {
        let field = Field::new("Seen", FieldType::Choice).with_format("yes/no");
        assert!(field.validate_message("yes").is_none());
        assert!(field.validate_message("maybe").is_some());
        assert!(field.validate_message("").is_none());
    }

    #[test]
    fn auto_choice_accumulates() {
        let mut field = Field::new("Genre", FieldType::AutoChoice);
        assert!(field.validate_message("anything").is_none());
        field.add_observed("Comedy");
        field.add_observed("Drama");
        field.add_observed("Comedy");
        assert_eq!(field.options(), vec!["Comedy", "Drama"]);
    }

    #[test]
    fn date_comparison_is_chronological() {
        let field = Field::new("When", FieldType::Date).with_format("MMM d, yyyy");
        assert_eq!(
            field.compare_values("2023-12-31", "2024-01-01"),
            Ordering::Less
        );
        // Display format plays no part in ordering.
        assert_eq!(field.format_value("2024-01-01"), "Jan 1, 2024");
    }

    #[test]
    fn number_comparison_is_numeric() {
        let field = Field::new("N", FieldType::Number);
        assert_eq!(field.compare_values("9", "10"), Ordering::Less);
        assert_eq!(field.compare_values("", "0"), Ordering::Less);
    }

    #[test]
    fn text_comparison_ignores_case() {
        let field = Field::new("T", FieldType::Text);
        assert_eq!(field.compare_values("apple", "Banana"), Ordering::Less);
        assert!(!field.compare_values("Apple", "apple").is_eq());
    }

    #[test]
    fn alt_format_dedupe_ignores_type() {
        let mut field = Field::new("When", FieldType::Date).with_format("MMM d, yyyy");
        let alt_year = Field::new("When", FieldType::Date).with_format("yyyy");
        let first = field.add_alt_format(alt_year.clone());
        let second = field.add_alt_format(alt_year);
        assert_eq!(first, second);
        assert_eq!(field.alt_formats.len(), 1);

        // Same shape with a different type still dedupes; equality is
        // structural over name/format/init/prefix/suffix only.
        let retyped = Field::new("When", FieldType::Text).with_format("yyyy");
        assert_eq!(field.add_alt_format(retyped), 0);
    }

    #[test]
    fn stored_validity_covers_every_value() {
        let field = Field::new("When", FieldType::Date).with_multiples();
        let good = leaf(&[("When", &["2024-01-01", "2024-02-02"])]);
        let bad = leaf(&[("When", &["2024-01-01", "yesterday"])]);
        assert!(field.is_stored_text_valid(&good));
        assert!(!field.is_stored_text_valid(&bad));
    }
}
