//! Template parsing and rendering.
//!
//! A template string mixes literal text with field references written
//! `{*FieldName*}` or `{*FieldName:N*}` (the Nth alternate format of the
//! field). Parsing binds references against the field set; names that do
//! not resolve stay literal text, so a template referencing a deleted
//! field degrades gracefully instead of failing.
//!
//! `to_template_text` is the exact inverse of `parse` for any parser
//! output.

use grove_model::{Field, FieldSet, GroveError, LeafData, Result};

const REF_OPEN: &str = "{*";
const REF_CLOSE: &str = "*}";

/// One parsed template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    FieldRef {
        name: String,
        /// Positional alternate-format index, `None` for the base field.
        alt_index: Option<usize>,
    },
}

impl Segment {
    /// The template text this segment came from.
    fn to_template_text(&self) -> String {
        match self {
            Segment::Literal(text) => text.clone(),
            Segment::FieldRef { name, alt_index } => match alt_index {
                Some(index) => format!("{REF_OPEN}{name}:{index}{REF_CLOSE}"),
                None => format!("{REF_OPEN}{name}{REF_CLOSE}"),
            },
        }
    }
}

/// A compiled template line: ordered literal and field-reference segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    segments: Vec<Segment>,
}

impl ParsedLine {
    /// Parse a raw template against the current field set.
    ///
    /// Reference syntax that does not resolve (unknown field, alternate
    /// index out of range, malformed index) is kept as literal text.
    pub fn parse(raw: &str, fields: &FieldSet) -> Self {
        let mut segments: Vec<Segment> = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;

        while let Some(open) = rest.find(REF_OPEN) {
            let after_open = &rest[open + REF_OPEN.len()..];
            let Some(close) = after_open.find(REF_CLOSE) else {
                break;
            };
            literal.push_str(&rest[..open]);
            let inner = &after_open[..close];
            let matched = &rest[open..open + REF_OPEN.len() + close + REF_CLOSE.len()];

            match resolve_reference(inner, fields) {
                Some((name, alt_index)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::FieldRef { name, alt_index });
                }
                None => literal.push_str(matched),
            }
            rest = &after_open[close + REF_CLOSE.len()..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    /// Reconstruct the raw template text. Exact inverse of [`parse`].
    ///
    /// [`parse`]: ParsedLine::parse
    pub fn to_template_text(&self) -> String {
        self.segments
            .iter()
            .map(Segment::to_template_text)
            .collect()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_fields(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::FieldRef { .. }))
    }

    /// Distinct referenced field names, in first-appearance order.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::FieldRef { name, .. } = segment
                && !names.contains(name)
            {
                names.push(name.clone());
            }
        }
        names
    }

    /// Rewrite references after a field rename. Part of the rename cascade.
    pub fn rename_field(&mut self, old_name: &str, new_name: &str) {
        for segment in &mut self.segments {
            if let Segment::FieldRef { name, .. } = segment
                && name == old_name
            {
                *name = new_name.to_string();
            }
        }
    }

    /// Render against one record.
    ///
    /// A line containing at least one field reference renders as the empty
    /// string when every reference rendered empty; a reference whose field
    /// no longer exists renders as its literal template text.
    pub fn render(&self, fields: &FieldSet, data: &LeafData) -> String {
        let mut out = String::new();
        let mut field_count = 0usize;
        let mut empty_fields = 0usize;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::FieldRef { name, alt_index } => match fields.resolve(name, *alt_index) {
                    Some(field) => {
                        field_count += 1;
                        let text = render_field(field, data);
                        if text.is_empty() {
                            empty_fields += 1;
                        }
                        out.push_str(&text);
                    }
                    None => out.push_str(&segment.to_template_text()),
                },
            }
        }
        if field_count > 0 && field_count == empty_fields {
            return String::new();
        }
        out
    }

    /// The single multi-valued field this line may fan out on, if any.
    ///
    /// A line referencing two different multi-valued fields has no defined
    /// cross-product order; that combination is rejected up front.
    pub fn multi_value_field<'a>(&self, fields: &'a FieldSet) -> Result<Option<&'a Field>> {
        let mut found: Option<&Field> = None;
        for name in self.field_names() {
            let Some(field) = fields.get(&name) else {
                continue;
            };
            if field.allow_multiples {
                if let Some(existing) = found
                    && existing.name != field.name
                {
                    return Err(GroveError::Validation(format!(
                        "line references two multi-value fields: {} and {}",
                        existing.name, field.name
                    )));
                }
                found = Some(field);
            }
        }
        Ok(found)
    }

    /// Render once per stored value of the line's multi-valued field.
    ///
    /// Each output substitutes a single value for every reference to that
    /// field; lines with no multi-valued reference (or one stored value)
    /// render exactly once. Empty renders are dropped. This is the fan-out
    /// used for rule bucketing and for full-line repeated output.
    pub fn render_multi(&self, fields: &FieldSet, data: &LeafData) -> Result<Vec<String>> {
        let multi = self.multi_value_field(fields)?;
        let values: Vec<String> = match multi {
            Some(field) => data.values(&field.name).to_vec(),
            None => Vec::new(),
        };

        if values.len() <= 1 {
            let rendered = self.render(fields, data);
            return Ok(if rendered.is_empty() {
                Vec::new()
            } else {
                vec![rendered]
            });
        }

        let field_name = multi.map(|f| f.name.clone()).unwrap_or_default();
        let mut outputs = Vec::with_capacity(values.len());
        for value in values {
            let mut narrowed = data.clone();
            narrowed.set_value(&field_name, &value);
            let rendered = self.render(fields, &narrowed);
            if !rendered.is_empty() {
                outputs.push(rendered);
            }
        }
        Ok(outputs)
    }
}

/// Resolve the text between `{*` and `*}` to a usable reference.
fn resolve_reference(inner: &str, fields: &FieldSet) -> Option<(String, Option<usize>)> {
    let (name, alt_index) = match inner.split_once(':') {
        Some((name, index_text)) => (name, Some(index_text.parse::<usize>().ok()?)),
        None => (inner, None),
    };
    fields.resolve(name, alt_index)?;
    Some((name.to_string(), alt_index))
}

/// Field output within a template: joined inline for multi-value fields
/// unless the separator asks for full-line repetition (handled by
/// `render_multi`).
fn render_field(field: &Field, data: &LeafData) -> String {
    if field.allow_multiples && !field.is_full_line_separator() {
        field.all_output_text(data).join(&field.separator)
    } else {
        field.output_text(data)
    }
}
