//! Recovering a JSON object from a noisy model response.
//!
//! Models wrap their JSON in prose, code fences and reasoning markup, and
//! the JSON itself often carries trailing commas, comments or raw newlines
//! inside strings. [`ResilientExtractor`] bounds the payload by the first
//! `{` and the last `}`, decodes it leniently and re-encodes it strictly.
//!
//! The bounding step swallows anything between a stray inner `}` and the
//! real end of the object. That is accepted rather than repaired.
//!
//! The lenient decoder sits behind [`LenientDecoder`] so the strategy can
//! change without touching the pipeline.

use std::fmt::Write as _;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ExtractionError;

/// A decoder that accepts JSON-like text and returns a strict JSON value.
pub trait LenientDecoder: Send + Sync {
    fn decode(&self, text: &str) -> Result<Value, String>;
}

/// JSON5 decoding (comments, trailing commas, unquoted keys, single
/// quotes), preceded by escaping raw control characters inside strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json5Decoder;

impl LenientDecoder for Json5Decoder {
    fn decode(&self, text: &str) -> Result<Value, String> {
        let escaped = escape_control_chars_in_strings(text);
        json5::from_str::<Value>(&escaped).map_err(|e| e.to_string())
    }
}

/// A recovered object plus its canonical strict encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub canonical: String,
}

impl Extracted {
    /// Deserialize the recovered object into a typed record.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ExtractionError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| ExtractionError::MalformedJson(e.to_string()))
    }
}

/// Brace-bounded, lenient JSON object extraction.
#[derive(Debug, Clone, Default)]
pub struct ResilientExtractor<D = Json5Decoder> {
    decoder: D,
}

impl ResilientExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<D: LenientDecoder> ResilientExtractor<D> {
    /// Use a different lenient decoding strategy.
    pub fn with_decoder(decoder: D) -> Self {
        Self { decoder }
    }

    pub fn extract(&self, raw: &str) -> Result<Extracted, ExtractionError> {
        let slice = object_slice(raw)?;
        let mut value = self
            .decoder
            .decode(slice)
            .map_err(ExtractionError::MalformedJson)?;
        if !value.is_object() {
            return Err(ExtractionError::MalformedJson(
                "decoded value is not an object".into(),
            ));
        }
        canonicalize_numbers(&mut value);
        let canonical = serde_json::to_string(&value)
            .map_err(|e| ExtractionError::MalformedJson(e.to_string()))?;
        Ok(Extracted { value, canonical })
    }
}

/// Text from the first `{` through the last `}` of the trimmed input.
fn object_slice(raw: &str) -> Result<&str, ExtractionError> {
    let text = raw.trim();
    let start = text.find('{').ok_or(ExtractionError::NoJsonBoundary)?;
    let end = text.rfind('}').ok_or(ExtractionError::NoJsonBoundary)?;
    if end < start {
        return Err(ExtractionError::NoJsonBoundary);
    }
    // Both braces are ASCII, so these indices are char boundaries.
    text.get(start..=end).ok_or(ExtractionError::NoJsonBoundary)
}

/// Escape literal control characters that appear inside string literals.
/// Comments are copied through untouched so quotes in them do not confuse
/// the string tracking.
fn escape_control_chars_in_strings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                c if c == q => {
                    quote = None;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if (c as u32) < 0x20 => {
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(c);
                if let Some(star) = chars.next() {
                    out.push(star);
                }
                let mut prev = '\0';
                for next in chars.by_ref() {
                    out.push(next);
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Rewrite whole-valued floats (`8.0`) as integers so the canonical text is
/// stable regardless of how the decoder represents numbers.
fn canonicalize_numbers(value: &mut Value) {
    match value {
        Value::Number(n) => {
            if n.is_f64()
                && let Some(f) = n.as_f64()
                && f.fract() == 0.0
                && f.abs() < 9.0e15
            {
                *value = Value::from(f as i64);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(canonicalize_numbers),
        Value::Object(map) => map.values_mut().for_each(canonicalize_numbers),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(raw: &str) -> Result<Extracted, ExtractionError> {
        ResilientExtractor::new().extract(raw)
    }

    #[test]
    fn fenced_block_with_trailing_comma() {
        let out = extract("Sure! ```json\n{\"a\":1,}\n```").unwrap();
        assert_eq!(out.value, json!({"a": 1}));
        assert_eq!(out.canonical, r#"{"a":1}"#);
    }

    #[test]
    fn no_brace_is_boundary_error() {
        assert_eq!(
            extract("I could not summarize this.").unwrap_err(),
            ExtractionError::NoJsonBoundary
        );
        assert_eq!(extract("").unwrap_err(), ExtractionError::NoJsonBoundary);
        assert_eq!(extract("} backwards {").unwrap_err(), ExtractionError::NoJsonBoundary);
    }

    #[test]
    fn prose_around_object_is_discarded() {
        let raw = "Here is the summary you asked for:\n{\"importance\": 7, \"summary\": \"ok\"}\nLet me know!";
        let out = extract(raw).unwrap();
        assert_eq!(out.value["importance"], json!(7));
    }

    #[test]
    fn comments_and_unquoted_keys() {
        let raw = r#"{
            // the model's own note, don't parse me
            importance: 6, /* inline */
            'summary': 'single quoted',
        }"#;
        let out = extract(raw).unwrap();
        assert_eq!(out.value, json!({"importance": 6, "summary": "single quoted"}));
    }

    #[test]
    fn raw_control_characters_inside_strings() {
        let raw = "{\"summary\": \"line one\nline two\tend\"}";
        let out = extract(raw).unwrap();
        assert_eq!(out.value["summary"], json!("line one\nline two\tend"));
    }

    #[test]
    fn whole_floats_become_integers() {
        let out = extract(r#"{"importance": 8.0, "ratio": 0.5}"#).unwrap();
        assert_eq!(out.canonical, r#"{"importance":8,"ratio":0.5}"#);
    }

    #[test]
    fn malformed_inside_braces() {
        let err = extract(r#"{"a": }"#).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedJson(_)));
    }

    #[test]
    fn parse_into_typed_record() {
        #[derive(serde::Deserialize)]
        struct Rec {
            importance: u8,
        }
        let out = extract(r#"{"importance": 4}"#).unwrap();
        assert_eq!(out.parse::<Rec>().unwrap().importance, 4);
    }

    #[test]
    fn custom_decoder_is_used() {
        struct Strict;
        impl LenientDecoder for Strict {
            fn decode(&self, text: &str) -> Result<Value, String> {
                serde_json::from_str(text).map_err(|e| e.to_string())
            }
        }
        let extractor = ResilientExtractor::with_decoder(Strict);
        assert!(extractor.extract(r#"{"a":1}"#).is_ok());
        assert!(matches!(
            extractor.extract(r#"{"a":1,}"#),
            Err(ExtractionError::MalformedJson(_))
        ));
    }

    #[test]
    fn escaping_leaves_structure_alone() {
        let text = "{\n  \"a\": \"x\\\"y\n\"\n}";
        assert_eq!(
            escape_control_chars_in_strings(text),
            "{\n  \"a\": \"x\\\"y\\n\"\n}"
        );
    }
}
