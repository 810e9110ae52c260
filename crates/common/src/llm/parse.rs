//! Defensive parsing of LLM output
//!
//! Models occasionally wrap JSON in prose or markdown fences. The
//! strategy is: strict parse first, then the longest balanced `{...}`
//! substring, then give up and let the caller keep the raw text.

use serde_json::Value;

/// Best-effort extraction of the first JSON object in a response.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // Strict parse of the whole payload
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    // Longest balanced object substring that parses
    let mut best: Option<Value> = None;
    let mut best_len = 0;

    for (start, _) in trimmed.char_indices().filter(|(_, c)| *c == '{') {
        if let Some(candidate) = balanced_object(&trimmed[start..]) {
            if candidate.len() > best_len {
                if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                    best_len = candidate.len();
                    best = Some(value);
                }
            }
        }
    }

    best
}

/// Slice of `text` covering the balanced `{...}` starting at index 0.
/// Tracks string literals so braces inside them do not count.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0_i32;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a list of floats out of chat output. Accepts comma-separated
/// values with optional brackets and surrounding prose. Returns `None`
/// when fewer than `expected` parseable numbers are present; extra
/// numbers are truncated.
pub fn parse_float_list(text: &str, expected: usize) -> Option<Vec<f32>> {
    let mut values = Vec::with_capacity(expected);

    for token in text.split(|c: char| c == ',' || c == '\n' || c.is_whitespace()) {
        let cleaned = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '-' && c != '.');
        if cleaned.is_empty() {
            continue;
        }
        if let Ok(value) = cleaned.parse::<f32>() {
            if value.is_finite() {
                values.push(value);
                if values.len() == expected {
                    return Some(values);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json() {
        let value = extract_json(r#"{"matchRate": 0.85, "strengths": ["Rust"]}"#).unwrap();
        assert_eq!(value["matchRate"], 0.85);
    }

    #[test]
    fn test_json_wrapped_in_prose() {
        let text = "Sure! Here is the evaluation:\n```json\n{\"matchRate\": 0.7}\n```\nHope that helps.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["matchRate"], 0.7);
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"prefix {"note": "uses {braces} inside", "score": 4} suffix"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], 4);
    }

    #[test]
    fn test_picks_longest_object() {
        let text = r#"{"a": 1} and the full result {"a": 1, "b": {"c": 2}}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["b"]["c"], 2);
    }

    #[test]
    fn test_no_json_returns_none() {
        assert!(extract_json("no structured data here").is_none());
        assert!(extract_json("{unbalanced").is_none());
    }

    #[test]
    fn test_float_list_with_brackets_and_prose() {
        let text = "Here you go: [0.1, -0.2, 0.3, 0.4]";
        let values = parse_float_list(text, 4).unwrap();
        assert_eq!(values, vec![0.1, -0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_float_list_too_short() {
        assert!(parse_float_list("0.1, 0.2", 4).is_none());
    }

    #[test]
    fn test_float_list_truncates_extra() {
        let values = parse_float_list("1, 2, 3, 4, 5", 3).unwrap();
        assert_eq!(values.len(), 3);
    }
}
