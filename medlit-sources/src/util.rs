//! Small JSON and text helpers shared by the response parsers.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MARKUP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]+>").ok());

/// Non-empty trimmed string at `key`.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Non-empty trimmed string at a `/`-separated JSON pointer.
pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer that may be encoded as a number or a numeric string.
pub fn u64_field(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings of an array field, skipping blanks and non-strings.
pub fn str_array(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// First four-digit run in `text` read as a year (`"2021 Mar 4"`, `"2021-03"`).
pub fn leading_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(u8::is_ascii_digit))
        .and_then(|i| text.get(i..i + 4))
        .and_then(|y| y.parse().ok())
}

/// Drop XML/HTML tags (JATS abstracts) and collapse whitespace.
pub fn strip_markup(text: &str) -> String {
    let stripped = match MARKUP.as_ref() {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_markup_pattern_compiles() {
        assert!(MARKUP.is_some());
    }

    #[test]
    fn test_str_helpers() {
        let v = json!({"a": " x ", "b": "", "n": {"m": "deep"}, "list": ["p", " ", 3, "q"]});
        assert_eq!(str_field(&v, "a").as_deref(), Some("x"));
        assert!(str_field(&v, "b").is_none());
        assert_eq!(str_at(&v, "/n/m").as_deref(), Some("deep"));
        assert_eq!(str_array(&v, "list"), vec!["p", "q"]);
    }

    #[test]
    fn test_u64_accepts_strings() {
        let v = json!({"a": 12, "b": "34", "c": "x"});
        assert_eq!(u64_field(&v, "a"), Some(12));
        assert_eq!(u64_field(&v, "b"), Some(34));
        assert_eq!(u64_field(&v, "c"), None);
    }

    #[test]
    fn test_leading_year() {
        assert_eq!(leading_year("2021 Mar 4"), Some(2021));
        assert_eq!(leading_year("Spring 1999"), Some(1999));
        assert_eq!(leading_year("n/a"), None);
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("<jats:p>Metformin <jats:italic>lowers</jats:italic>\n glucose.</jats:p>"),
            "Metformin lowers glucose."
        );
    }
}
