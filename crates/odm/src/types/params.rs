//! Helpers for interpreting generic request parameters.
//!
//! Request parameters arrive as loosely typed JSON (query strings are all strings), so
//! these helpers accept both native JSON values and their string spellings.

use serde_json::Value as Json;

use crate::error::RequestError;

/// Splits a comma-separated list, trimming whitespace and dropping empty entries.
pub fn split_strip(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Reads a list parameter given either as a comma-separated string or a JSON array.
pub fn json_list(name: &str, value: &Json) -> Result<Vec<String>, RequestError> {
    match value {
        Json::String(s) => Ok(split_strip(s)),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(s) => Ok(s.trim().to_string()),
                other => Err(RequestError::bad_request(format!(
                    "Invalid value for {}: {}",
                    name, other
                ))),
            })
            .collect(),
        Json::Null => Ok(Vec::new()),
        other => Err(RequestError::bad_request(format!(
            "Invalid value for {}: {}",
            name, other
        ))),
    }
}

/// Interprets a boolean parameter.
///
/// Accepts JSON booleans, `0`/`1`, and the strings `true/false`, `yes/no`, `y/n`,
/// `on/off`, `1/0` in any case.
pub fn as_bool(name: &str, value: &Json) -> Result<bool, RequestError> {
    let parsed = match value {
        Json::Bool(b) => Some(*b),
        Json::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Json::String(s) => parse_bool_str(s),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RequestError::bad_request(format!("Invalid boolean value for {}: {}", name, value))
    })
}

/// Parses the string spellings accepted by [`as_bool`].
pub fn parse_bool_str(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Interprets a non-negative integer parameter.
pub fn as_u64(name: &str, value: &Json) -> Result<u64, RequestError> {
    let parsed = match value {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        RequestError::bad_request(format!(
            "Invalid value for {}: {} (expected a non-negative integer)",
            name, value
        ))
    })
}

/// Splits a field projection spec into included and excluded names.
///
/// Excluded names are prefixed with `-` in the spec.
pub fn process_fields(fields: &[String]) -> (Vec<String>, Vec<String>) {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for field in fields {
        match field.strip_prefix('-') {
            Some(name) => exclude.push(name.to_string()),
            None => include.push(field.clone()),
        }
    }
    (include, exclude)
}

/// Computes the result offset and page size.
///
/// `start` wins over `page` when both are given. Pages are one-based, so the offset of
/// page `n` is `(n - 1) * limit`; page `0` is treated as the first page.
pub fn process_limit(start: Option<u64>, page: Option<u64>, limit: u64) -> (u64, u64) {
    let offset = match (start, page) {
        (Some(start), _) => start,
        (None, Some(page)) => page.saturating_sub(1).saturating_mul(limit),
        (None, None) => 0,
    };
    (offset, limit)
}

/// Strips the descending marker from a sort spec entry.
pub fn sort_field_name(spec: &str) -> &str {
    spec.strip_prefix('-').unwrap_or(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_strip() {
        assert_eq!(split_strip(" name , title,,"), vec!["name", "title"]);
        assert!(split_strip("").is_empty());
    }

    #[test]
    fn test_process_limit_page_is_one_based() {
        assert_eq!(process_limit(None, Some(2), 20), (20, 20));
        assert_eq!(process_limit(None, Some(1), 20), (0, 20));
        assert_eq!(process_limit(None, Some(0), 20), (0, 20));
        assert_eq!(process_limit(None, None, 20), (0, 20));
    }

    #[test]
    fn test_process_limit_start_wins_over_page() {
        assert_eq!(process_limit(Some(7), Some(3), 10), (7, 10));
    }

    #[test]
    fn test_process_fields() {
        let fields = vec!["name".to_string(), "-price".to_string()];
        let (include, exclude) = process_fields(&fields);
        assert_eq!(include, vec!["name"]);
        assert_eq!(exclude, vec!["price"]);
    }

    #[test]
    fn test_as_bool_spellings() {
        assert!(as_bool("x", &json!("Yes")).unwrap());
        assert!(!as_bool("x", &json!("off")).unwrap());
        assert!(as_bool("x", &json!(1)).unwrap());
        assert!(as_bool("x", &json!("maybe")).is_err());
    }

    #[test]
    fn test_as_u64_rejects_negative() {
        assert_eq!(as_u64("_limit", &json!("20")).unwrap(), 20);
        assert!(as_u64("_limit", &json!(-1)).is_err());
        assert!(as_u64("_limit", &json!("abc")).is_err());
    }

    #[test]
    fn test_json_list() {
        assert_eq!(
            json_list("_sort", &json!("name, -price")).unwrap(),
            vec!["name", "-price"]
        );
        assert_eq!(json_list("_sort", &json!(["a"])).unwrap(), vec!["a"]);
        assert!(json_list("_sort", &json!(5)).is_err());
    }
}
