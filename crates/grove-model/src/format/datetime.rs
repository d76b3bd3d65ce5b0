//! Token-based display formatting for Date and Time fields.
//!
//! Stored values are always canonical ISO text (`yyyy-MM-dd` for dates,
//! `HH:mm:ss` for times); the display format is a token mini-language
//! applied on output only.
//!
//! # Token table
//!
//! Dates: `yyyy` `yy` `MMMM` `MMM` `MM` `M` `dd` `d` `EEEE` `EEE` `D`
//! (day of year) `G` (era) `QQQ` (quarter).
//! Times: `HH` `H` (0-23), `hh` `h` (1-12), `mm` `m`, `ss` `s`,
//! `S` (tenths of a second), `a` (AM/PM).
//!
//! Literal runs are escaped with single quotes; a doubled quote `''` is a
//! literal quote. Tokens that do not apply to the value kind (a time token
//! in a date format) are emitted verbatim.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::{GroveError, Result};

/// Canonical stored representation for dates.
pub const STORED_DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical stored representation for times.
pub const STORED_TIME_FORMAT: &str = "%H:%M:%S";

/// Parse canonical stored date text.
pub fn parse_stored_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), STORED_DATE_FORMAT).ok()
}

/// Parse canonical stored time text, tolerating a missing seconds part.
pub fn parse_stored_time(text: &str) -> Option<NaiveTime> {
    let trimmed = text.trim();
    NaiveTime::parse_from_str(trimmed, STORED_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormatToken {
    Literal(String),
    /// A run of the same pattern letter, e.g. `('y', 4)` for `yyyy`.
    Run(char, usize),
}

const DATE_LETTERS: &[char] = &['y', 'M', 'd', 'E', 'D', 'G', 'Q'];
const TIME_LETTERS: &[char] = &['H', 'h', 'm', 's', 'S', 'a'];

/// Scan a format string into literal and token runs.
///
/// Single quotes delimit literal text; `''` inside or outside a quoted run
/// is a single literal quote.
fn tokenize(format: &str) -> Vec<FormatToken> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = format.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if ch == '\'' {
            if chars.get(i + 1) == Some(&'\'') {
                literal.push('\'');
                i += 2;
                continue;
            }
            // Quoted literal run up to the closing quote.
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        literal.push('\'');
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                literal.push(chars[i]);
                i += 1;
            }
        } else if ch.is_ascii_alphabetic() {
            if !literal.is_empty() {
                tokens.push(FormatToken::Literal(std::mem::take(&mut literal)));
            }
            let mut count = 1;
            while chars.get(i + count) == Some(&ch) {
                count += 1;
            }
            tokens.push(FormatToken::Run(ch, count));
            i += count;
        } else {
            literal.push(ch);
            i += 1;
        }
    }
    if !literal.is_empty() {
        tokens.push(FormatToken::Literal(literal));
    }
    tokens
}

/// Check a date format string at document load time.
pub fn check_date_format(format: &str) -> Result<()> {
    check_format(format, DATE_LETTERS, "date")
}

/// Check a time format string at document load time.
pub fn check_time_format(format: &str) -> Result<()> {
    check_format(format, TIME_LETTERS, "time")
}

fn check_format(format: &str, letters: &[char], kind: &str) -> Result<()> {
    for token in tokenize(format) {
        if let FormatToken::Run(ch, count) = token
            && !letters.contains(&ch)
        {
            return Err(GroveError::Format(format!(
                "{kind} format \"{format}\" has unknown token \"{}\"",
                ch.to_string().repeat(count)
            )));
        }
    }
    Ok(())
}

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Format a date against a token format string.
pub fn format_date(date: NaiveDate, format: &str) -> String {
    let mut out = String::new();
    for token in tokenize(format) {
        match token {
            FormatToken::Literal(text) => out.push_str(&text),
            FormatToken::Run(ch, count) => render_date_run(&mut out, date, ch, count),
        }
    }
    out
}

fn render_date_run(out: &mut String, date: NaiveDate, letter: char, count: usize) {
    match letter {
        'y' => {
            if count >= 3 {
                out.push_str(&format!("{:04}", date.year()));
            } else {
                out.push_str(&format!("{:02}", date.year().rem_euclid(100)));
            }
        }
        'M' => {
            let month = date.month() as usize;
            match count {
                4.. => out.push_str(MONTH_NAMES[month - 1]),
                3 => out.push_str(&MONTH_NAMES[month - 1][..3]),
                2 => out.push_str(&format!("{month:02}")),
                _ => out.push_str(&month.to_string()),
            }
        }
        'd' => {
            if count >= 2 {
                out.push_str(&format!("{:02}", date.day()));
            } else {
                out.push_str(&date.day().to_string());
            }
        }
        'E' => {
            let name = WEEKDAY_NAMES[date.weekday().num_days_from_monday() as usize];
            if count >= 4 {
                out.push_str(name);
            } else {
                out.push_str(&name[..3]);
            }
        }
        'D' => out.push_str(&date.ordinal().to_string()),
        'G' => out.push_str(if date.year() > 0 { "AD" } else { "BC" }),
        'Q' => out.push_str(&format!("Q{}", (date.month() - 1) / 3 + 1)),
        // Time tokens in a date format fall through verbatim.
        other => out.push_str(&other.to_string().repeat(count)),
    }
}

/// Format a time against a token format string.
pub fn format_time(time: NaiveTime, format: &str) -> String {
    let mut out = String::new();
    for token in tokenize(format) {
        match token {
            FormatToken::Literal(text) => out.push_str(&text),
            FormatToken::Run(ch, count) => render_time_run(&mut out, time, ch, count),
        }
    }
    out
}

fn render_time_run(out: &mut String, time: NaiveTime, letter: char, count: usize) {
    match letter {
        'H' => push_padded(out, time.hour(), count),
        'h' => {
            let (_, hour12) = time.hour12();
            push_padded(out, hour12, count);
        }
        'm' => push_padded(out, time.minute(), count),
        's' => push_padded(out, time.second(), count),
        'S' => out.push_str(&(time.nanosecond() / 100_000_000).to_string()),
        'a' => out.push_str(if time.hour12().0 { "PM" } else { "AM" }),
        // Date tokens in a time format fall through verbatim.
        other => out.push_str(&other.to_string().repeat(count)),
    }
}

fn push_padded(out: &mut String, value: u32, count: usize) {
    if count >= 2 {
        out.push_str(&format!("{value:02}"));
    } else {
        out.push_str(&value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn date_tokens() {
        let d = date(2024, 3, 7);
        assert_eq!(format_date(d, "yyyy-MM-dd"), "2024-03-07");
        assert_eq!(format_date(d, "MMM d, yyyy"), "Mar 7, 2024");
        assert_eq!(format_date(d, "MMMM"), "March");
        assert_eq!(format_date(d, "EEEE"), "Thursday");
        assert_eq!(format_date(d, "EEE"), "Thu");
        assert_eq!(format_date(d, "yy"), "24");
        assert_eq!(format_date(d, "QQQ yyyy"), "Q1 2024");
        assert_eq!(format_date(d, "D"), "67");
    }

    #[test]
    fn quoted_literals() {
        let d = date(2024, 3, 7);
        assert_eq!(format_date(d, "'year' yyyy"), "year 2024");
        // A doubled quote is a literal quote.
        assert_eq!(format_date(d, "yyyy''s"), "2024's");
        // Token letters inside quotes stay literal.
        assert_eq!(format_date(d, "'dd' dd"), "dd 07");
    }

    #[test]
    fn time_tokens() {
        let t = time(14, 5, 9);
        assert_eq!(format_time(t, "HH:mm:ss"), "14:05:09");
        assert_eq!(format_time(t, "h:mm a"), "2:05 PM");
        assert_eq!(format_time(time(0, 30, 0), "h:mm a"), "12:30 AM");
        assert_eq!(format_time(t, "H"), "14");
    }

    #[test]
    fn stored_parsers() {
        assert_eq!(parse_stored_date("2024-03-07"), Some(date(2024, 3, 7)));
        assert_eq!(parse_stored_date("03/07/2024"), None);
        assert_eq!(parse_stored_time("14:05:09"), Some(time(14, 5, 9)));
        assert_eq!(parse_stored_time("14:05"), Some(time(14, 5, 0)));
    }

    #[test]
    fn format_checks() {
        assert!(check_date_format("MMM d, yyyy").is_ok());
        assert!(check_date_format("xyzzy").is_err());
        assert!(check_time_format("HH:mm").is_ok());
        assert!(check_time_format("HH:mm ZZ").is_err());
        // Quoted runs never count as tokens.
        assert!(check_date_format("'at' dd").is_ok());
    }
}
