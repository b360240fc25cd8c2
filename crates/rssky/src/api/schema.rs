//! Response-shape hints attached to upstream requests.
//!
//! The shapes are declared as typed structs and rendered to JSON Schema
//! with `schemars`. Models in the `gpt` family reject the
//! `response_format` parameter, so the hint is only sent to other models.

use schemars::JsonSchema;

use crate::json_schema_for;

/// Per-item summary shape.
#[derive(JsonSchema, Debug)]
pub struct SummarySchema {
    /// Importance from 0 to 10.
    pub importance: f64,
    pub summary: String,
    pub impact: String,
    /// Publication date as YYYY-MM-DD.
    pub date: String,
}

/// Digest shape.
#[derive(JsonSchema, Debug)]
pub struct DigestSchema {
    pub stories: Vec<StorySchema>,
}

#[derive(JsonSchema, Debug)]
pub struct StorySchema {
    pub title: String,
    pub importance_rating: f64,
    pub summary: String,
    pub date: String,
    pub sources: Vec<SourceSchema>,
}

#[derive(JsonSchema, Debug)]
pub struct SourceSchema {
    pub name: String,
    pub title: String,
    pub url: String,
}

/// Whether `model` accepts a `response_format` schema.
pub fn accepts_schema_hint(model: &str) -> bool {
    !model.trim().to_lowercase().starts_with("gpt")
}

pub fn summary_schema() -> serde_json::Value {
    json_schema_for::<SummarySchema>()
}

pub fn digest_schema() -> serde_json::Value {
    json_schema_for::<DigestSchema>()
}

/// Ways `value` deviates from `schema`, one line per violation.
///
/// Responses are accepted leniently, so callers only log these. An
/// invalid schema yields no violations.
pub fn schema_violations(schema: &serde_json::Value, value: &serde_json::Value) -> Vec<String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    validator
        .iter_errors(value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpt_models_get_no_hint() {
        assert!(!accepts_schema_hint("gpt-4"));
        assert!(!accepts_schema_hint("  GPT-4o-mini"));
        assert!(accepts_schema_hint("gemini-1.5-pro"));
        assert!(accepts_schema_hint("anthropic/claude-3.5-sonnet"));
        // Only a prefix counts.
        assert!(accepts_schema_hint("openai/gpt-4"));
    }

    #[test]
    fn summary_schema_requires_all_fields() {
        let schema = summary_schema();
        assert_eq!(schema["type"], "object");
        let required = schema["required"].as_array().unwrap();
        for field in ["importance", "summary", "impact", "date"] {
            assert!(required.contains(&field.into()), "{field} missing");
        }
        assert_eq!(schema["properties"]["importance"]["type"], "number");
    }

    #[test]
    fn violations_are_reported_not_fatal() {
        let schema = summary_schema();
        let good = serde_json::json!({
            "importance": 7,
            "summary": "s",
            "impact": "i",
            "date": "2023-01-01"
        });
        assert!(schema_violations(&schema, &good).is_empty());

        let bad = serde_json::json!({"importance": "high", "summary": "s"});
        let violations = schema_violations(&schema, &bad);
        assert!(!violations.is_empty());
    }

    #[test]
    fn digest_schema_is_self_contained() {
        let schema = digest_schema();
        let text = schema.to_string();
        assert!(!text.contains("$ref"), "{text}");
        assert!(schema.get("$schema").is_none());
        let story = &schema["properties"]["stories"]["items"];
        assert_eq!(story["type"], "object");
        let source = &story["properties"]["sources"]["items"];
        assert!(
            source["required"]
                .as_array()
                .unwrap()
                .contains(&"url".into())
        );
    }
}
