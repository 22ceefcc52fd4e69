//! Response sanitizing.
//!
//! Models wrap JSON in prose or markdown fences even when told not to. The
//! sanitizer cuts the text down to the outermost brace pair and removes fence
//! markers. It is a heuristic: braces are not balanced, so a stray `}` after
//! the real payload ends up inside the slice and parsing fails later.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Markdown code fence, with or without a `json` language tag.
    static ref FENCE_PATTERN: Regex = Regex::new(r"```json|```").unwrap();
}

/// Reduce a raw model response to a best-effort JSON string.
///
/// Never fails. When there is no `{ ... }` span the input is returned with
/// fences stripped and whitespace trimmed, and the parser reports the error.
pub fn sanitize_json(raw: &str) -> String {
    let candidate = match (raw.find('{'), raw.rfind('}')) {
        (Some(first), Some(last)) if first < last => &raw[first..=last],
        _ => raw,
    };
    strip_code_fences(candidate)
}

/// Remove code fence markers and surrounding whitespace.
pub fn strip_code_fences(raw: &str) -> String {
    FENCE_PATTERN.replace_all(raw, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_json_is_untouched() {
        let raw = r#"{"event_name": "Chiến dịch Điện Biên Phủ"}"#;
        assert_eq!(sanitize_json(raw), raw);
    }

    #[test]
    fn test_strips_prose_and_fences() {
        let raw = "Here is the JSON you asked for:\n```json\n{\"a\": {\"b\": 1}}\n```\nHope this helps!";
        assert_eq!(sanitize_json(raw), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_no_braces_returns_trimmed_input() {
        assert_eq!(sanitize_json("  not json at all \n"), "not json at all");
        assert_eq!(sanitize_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_trailing_brace_in_prose_is_kept() {
        // Known limitation: the last `}` wins even when it belongs to prose.
        let raw = "{\"a\": 1} and a smiley :}";
        assert_eq!(sanitize_json(raw), "{\"a\": 1} and a smiley :}");
    }

    #[test]
    fn test_strip_code_fences_only() {
        assert_eq!(strip_code_fences("```Đây là câu trả lời```"), "Đây là câu trả lời");
        assert_eq!(strip_code_fences("```json\n{\"answer\": \"x\"}\n```"), "{\"answer\": \"x\"}");
    }

    proptest! {
        #[test]
        fn prop_extracts_outer_object(
            prefix in "[^{}`]{0,40}",
            value in "[a-zA-Z0-9 .,àáạảãâèéêìíòóôơùúưỳýđ]{0,40}",
            suffix in "[^{}`]{0,40}",
            fenced in any::<bool>(),
        ) {
            let body = format!("{{\"note\": {{\"text\": \"{}\"}}}}", value);
            let wrapped = if fenced {
                format!("{}```json\n{}\n```{}", prefix, body, suffix)
            } else {
                format!("{}{}{}", prefix, body, suffix)
            };
            prop_assert_eq!(sanitize_json(&wrapped), body);
        }

        #[test]
        fn prop_never_panics(raw in ".*") {
            let _ = sanitize_json(&raw);
        }
    }
}
