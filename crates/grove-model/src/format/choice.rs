//! Option-list handling for Choice and AutoChoice fields.
//!
//! The format string is a `/`-delimited option list; `\/` escapes a literal
//! slash inside an option. Choice fields validate stored values against the
//! list; AutoChoice fields treat it as an open set that grows as values are
//! observed.

/// Split a `/`-delimited option list, honoring `\/` escapes.
/// Empty options are dropped.
pub fn split_options(format: &str) -> Vec<String> {
    let mut options = Vec::new();
    let mut current = String::new();
    let mut chars = format.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' if chars.peek() == Some(&'/') => {
                current.push('/');
                chars.next();
            }
            '/' => {
                if !current.is_empty() {
                    options.push(std::mem::take(&mut current));
                }
            }
            other => current.push(other),
        }
    }
    if !current.is_empty() {
        options.push(current);
    }
    options
}

/// Join options back into a format string, escaping literal slashes.
pub fn join_options<I, S>(options: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    options
        .into_iter()
        .map(|option| option.as_ref().replace('/', "\\/"))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_options() {
        assert_eq!(split_options("red/green/blue"), vec!["red", "green", "blue"]);
    }

    #[test]
    fn escaped_slash_stays_in_option() {
        assert_eq!(split_options("on\\/off/unknown"), vec!["on/off", "unknown"]);
    }

    #[test]
    fn empty_options_dropped() {
        assert_eq!(split_options("a//b/"), vec!["a", "b"]);
        assert!(split_options("").is_empty());
    }

    #[test]
    fn join_escapes_slashes() {
        let joined = join_options(["on/off", "unknown"]);
        assert_eq!(joined, "on\\/off/unknown");
        assert_eq!(split_options(&joined), vec!["on/off", "unknown"]);
    }
}
