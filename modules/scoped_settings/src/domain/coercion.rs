//! Conversion of stored strings into typed values
//!
//! Storage always holds strings; conversion happens at the session boundary.

/// A type a stored setting string can be converted into
pub trait SettingValue: Sized {
    /// Human-readable type name used in errors
    const TYPE_NAME: &'static str;

    /// Convert a stored string. The error is a description of why it failed.
    fn coerce(raw: &str, list_separator: char) -> Result<Self, String>;
}

impl SettingValue for String {
    const TYPE_NAME: &'static str = "string";

    fn coerce(raw: &str, _list_separator: char) -> Result<Self, String> {
        Ok(raw.to_string())
    }
}

impl SettingValue for i64 {
    const TYPE_NAME: &'static str = "integer";

    fn coerce(raw: &str, _list_separator: char) -> Result<Self, String> {
        raw.trim().parse().map_err(|e: std::num::ParseIntError| e.to_string())
    }
}

impl SettingValue for f64 {
    const TYPE_NAME: &'static str = "floating point";

    fn coerce(raw: &str, _list_separator: char) -> Result<Self, String> {
        raw.trim()
            .parse()
            .map_err(|e: std::num::ParseFloatError| e.to_string())
    }
}

impl SettingValue for bool {
    const TYPE_NAME: &'static str = "boolean";

    /// Accepts `true/1/yes/on` and `false/0/no/off`, case-insensitive
    fn coerce(raw: &str, _list_separator: char) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err("expected one of true/1/yes/on or false/0/no/off".to_string()),
        }
    }
}

impl SettingValue for Vec<String> {
    const TYPE_NAME: &'static str = "list";

    /// One pair of surrounding `[]`, `()` or `{}` is optional. An empty or
    /// whitespace-only value, brackets included (`"[ ]"`), is the empty list, so
    /// a list holding a single blank item cannot be stored.
    fn coerce(raw: &str, list_separator: char) -> Result<Self, String> {
        let mut value = raw.trim();
        for (open, close) in [('[', ']'), ('(', ')'), ('{', '}')] {
            if value.len() >= 2 && value.starts_with(open) && value.ends_with(close) {
                value = &value[1..value.len() - 1];
                break;
            }
        }
        if value.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(value
            .split(list_separator)
            .map(|item| item.trim().to_string())
            .collect())
    }
}
