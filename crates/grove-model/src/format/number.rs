//! Decimal digit-pattern formatting for Number fields.
//!
//! The pattern mini-language uses four special characters:
//!
//! - `0`: a required digit, zero-padded when the value has fewer digits
//! - `#`: an optional digit, dropped when the value has fewer digits
//! - `.`: the decimal point
//! - `,`: a grouping separator in the integer part
//!
//! Any other character before the first or after the last digit position is
//! emitted verbatim. Patterns like `"0000"` render `42` as `"0042"`;
//! `"#,##0.##"` renders `1234.5` as `"1,234.5"`.

use crate::error::{GroveError, Result};

/// Parse canonical stored number text, tolerating grouping commas.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Check that a number pattern contains at least one digit position.
/// Called at document load so a corrupt format aborts early.
pub fn check_pattern(pattern: &str) -> Result<()> {
    if pattern.chars().any(|ch| ch == '0' || ch == '#') {
        Ok(())
    } else {
        Err(GroveError::Format(format!(
            "number format \"{pattern}\" has no digit positions"
        )))
    }
}

/// Split a pattern around its decimal point.
fn split_pattern(pattern: &str) -> (&str, &str) {
    match pattern.find('.') {
        Some(pos) => (&pattern[..pos], &pattern[pos + 1..]),
        None => (pattern, ""),
    }
}

/// Format a value against a digit pattern.
///
/// The fractional part is rounded to the pattern's digit count; optional
/// trailing digits that round to zero are dropped.
pub fn format_number(value: f64, pattern: &str) -> String {
    let (int_pattern, frac_pattern) = split_pattern(pattern);

    let min_int_digits = int_pattern.chars().filter(|&c| c == '0').count().max(1);
    let min_frac_digits = frac_pattern.chars().filter(|&c| c == '0').count();
    let max_frac_digits = frac_pattern
        .chars()
        .filter(|&c| c == '0' || c == '#')
        .count();
    let group_size = grouping_size(int_pattern);

    let negative = value < 0.0;
    let rounded = {
        let scale = 10f64.powi(max_frac_digits as i32);
        (value.abs() * scale).round() / scale
    };

    let fixed = format!("{rounded:.max_frac_digits$}");
    let (int_digits, frac_digits) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (fixed, String::new()),
    };

    let mut int_part = int_digits;
    while int_part.len() < min_int_digits {
        int_part.insert(0, '0');
    }
    if let Some(size) = group_size {
        int_part = group_digits(&int_part, size);
    }

    let mut frac_part = frac_digits;
    while frac_part.len() > min_frac_digits && frac_part.ends_with('0') {
        frac_part.pop();
    }

    let mut out = String::new();
    if negative && (int_part.chars().any(|c| c != '0') || !frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(&literal_prefix(int_pattern));
    out.push_str(&int_part);
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(&frac_part);
    }
    let suffix_source = if frac_pattern.is_empty() {
        int_pattern
    } else {
        frac_pattern
    };
    out.push_str(&literal_suffix(suffix_source));
    out
}

/// Grouping size: digit positions between the last `,` and the end of the
/// integer pattern. `None` when the pattern has no grouping separator.
fn grouping_size(int_pattern: &str) -> Option<usize> {
    let last_comma = int_pattern.rfind(',')?;
    let size = int_pattern[last_comma + 1..]
        .chars()
        .filter(|&c| c == '0' || c == '#')
        .count();
    (size > 0).then_some(size)
}

fn group_digits(digits: &str, size: usize) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / size);
    let chars: Vec<char> = digits.chars().collect();
    for (i, ch) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            out.push(',');
        }
        out.push(*ch);
    }
    out
}

fn literal_prefix(int_pattern: &str) -> String {
    int_pattern
        .chars()
        .take_while(|&c| c != '0' && c != '#' && c != ',')
        .collect()
}

fn literal_suffix(pattern: &str) -> String {
    pattern
        .chars()
        .rev()
        .take_while(|&c| c != '0' && c != '#' && c != ',')
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect()
}
