//! Structured Response Extractor — recovers a validated [`FeedbackReport`] from model output.
//!
//! Models asked for structured output still sometimes wrap it in prose or markdown fences.
//! Recovery order for text responses:
//! 1. the first fenced block tagged `json` (or untagged) whose body parses as JSON
//! 2. the whole text
//! 3. the first JSON object embedded anywhere in the text
//!
//! Whatever is recovered is validated against the schema. Nothing is coerced or filled in:
//! a response missing a section is an error, never a partial report.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::feedback::schema::{FeedbackReport, SchemaViolation};
use crate::llm_client::ModelOutput;

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum MalformedResponseError {
    #[error("No JSON value found in model response")]
    NoJson,

    #[error("Model response failed schema validation: {0}")]
    Schema(#[from] SchemaViolation),
}

/// Recovers a schema-conformant report from a model response, or fails explicitly.
pub fn extract_structured(output: &ModelOutput) -> Result<FeedbackReport, MalformedResponseError> {
    let value = match output {
        // Some providers hand back the JSON document as a string value.
        ModelOutput::Structured(Value::String(text)) => recover_json(text)?,
        ModelOutput::Structured(value) => value.clone(),
        ModelOutput::Text(text) => recover_json(text)?,
    };
    Ok(FeedbackReport::from_value(value)?)
}

/// Finds the first well-formed JSON value in free text.
fn recover_json(text: &str) -> Result<Value, MalformedResponseError> {
    for (tag, body) in fenced_blocks(text) {
        if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
            debug!("Recovered JSON from fenced block");
            return Ok(value);
        }
    }

    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    first_embedded_object(text).ok_or(MalformedResponseError::NoJson)
}

/// Splits out ```tag ... ``` blocks in order. Each block closes at the next fence.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let tag_len = after_open
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after_open.len());
        let (tag, after_tag) = after_open.split_at(tag_len);

        let Some(close) = after_tag.find(FENCE) else {
            break;
        };
        blocks.push((tag, &after_tag[..close]));
        rest = &after_tag[close + FENCE.len()..];
    }

    blocks
}

/// Parses the first `{...}` span that forms a complete JSON object, ignoring trailing text.
fn first_embedded_object(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .find_map(|(start, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if value.is_object() => Some(value),
                _ => None,
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::schema::fixtures::valid_report_json;
    use serde_json::json;

    fn text(s: String) -> ModelOutput {
        ModelOutput::Text(s)
    }

    #[test]
    fn test_structured_value_is_validated_directly() {
        let report = extract_structured(&ModelOutput::Structured(valid_report_json(85))).unwrap();
        assert_eq!(report.overall_score, 85);
    }

    #[test]
    fn test_structured_value_missing_section_is_rejected() {
        let mut value = valid_report_json(85);
        value.as_object_mut().unwrap().remove("ATS");
        assert!(matches!(
            extract_structured(&ModelOutput::Structured(value)),
            Err(MalformedResponseError::Schema(_))
        ));
    }

    #[test]
    fn test_structured_string_value_is_parsed_as_text() {
        let raw = format!("```json\n{}\n```", valid_report_json(60));
        let report = extract_structured(&ModelOutput::Structured(Value::String(raw))).unwrap();
        assert_eq!(report.overall_score, 60);
    }

    #[test]
    fn test_clean_json_text() {
        let report = extract_structured(&text(valid_report_json(72).to_string())).unwrap();
        assert_eq!(report.overall_score, 72);
    }

    #[test]
    fn test_fenced_block_inside_prose_returns_exact_inner_value() {
        let inner = valid_report_json(85);
        let raw = format!(
            "Sure! Here is my analysis of the resume.\n\n```json\n{}\n```\n\nLet me know if you need more.",
            serde_json::to_string_pretty(&inner).unwrap()
        );
        let report = extract_structured(&text(raw)).unwrap();
        assert_eq!(report, FeedbackReport::from_value(inner).unwrap());
    }

    #[test]
    fn test_fence_search_is_non_greedy() {
        let first = valid_report_json(40);
        let second = valid_report_json(90);
        let raw = format!(
            "First draft:\n```json\n{first}\n```\nRevised:\n```json\n{second}\n```\n"
        );
        let report = extract_structured(&text(raw)).unwrap();
        assert_eq!(report.overall_score, 40);
    }

    #[test]
    fn test_unparseable_fence_falls_through_to_next_block() {
        let raw = format!(
            "```json\n{{ not json \n```\n```json\n{}\n```",
            valid_report_json(55)
        );
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 55);
    }

    #[test]
    fn test_untagged_fence_is_accepted() {
        let raw = format!("```\n{}\n```", valid_report_json(66));
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 66);
    }

    #[test]
    fn test_uppercase_tag_is_accepted() {
        let raw = format!("```JSON\n{}\n```", valid_report_json(67));
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 67);
    }

    #[test]
    fn test_non_json_fence_is_skipped() {
        let raw = format!(
            "```python\nprint('report')\n```\nResult: {}",
            valid_report_json(33)
        );
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 33);
    }

    #[test]
    fn test_object_embedded_in_prose_without_fences() {
        let raw = format!(
            "Here is the feedback: {} Hope this helps!",
            valid_report_json(77)
        );
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 77);
    }

    #[test]
    fn test_fenced_report_missing_section_is_rejected() {
        let mut value = valid_report_json(85);
        value.as_object_mut().unwrap().remove("skills");
        let raw = format!("```json\n{value}\n```");
        match extract_structured(&text(raw)) {
            Err(MalformedResponseError::Schema(SchemaViolation::Shape(e))) => {
                assert!(e.to_string().contains("skills"));
            }
            other => panic!("expected a shape violation, got {other:?}"),
        }
    }

    #[test]
    fn test_fenced_report_with_whole_float_scores() {
        let mut value = valid_report_json(85);
        value["overallScore"] = json!(85.0);
        value["ATS"]["score"] = json!(80.0);
        let raw = format!("Here you go:\n```json\n{value}\n```");
        let report = extract_structured(&text(raw)).unwrap();
        assert_eq!(report.overall_score, 85);
        assert_eq!(report.ats.score, 80);
    }

    #[test]
    fn test_too_few_tips_in_text_is_rejected() {
        let mut value = valid_report_json(85);
        value["content"]["tips"] = json!([{ "type": "good", "tip": "Only one" }]);
        assert!(matches!(
            extract_structured(&text(value.to_string())),
            Err(MalformedResponseError::Schema(SchemaViolation::TooFewTips { .. }))
        ));
    }

    #[test]
    fn test_prose_without_json_is_rejected() {
        let raw = "I'm sorry, I can't analyze this document.".to_string();
        assert!(matches!(
            extract_structured(&text(raw)),
            Err(MalformedResponseError::NoJson)
        ));
    }

    #[test]
    fn test_unclosed_fence_falls_back_to_embedded_object() {
        let raw = format!("```json\n{}", valid_report_json(44));
        assert_eq!(extract_structured(&text(raw)).unwrap().overall_score, 44);
    }

    #[test]
    fn test_fenced_blocks_splits_tag_and_body() {
        let blocks = fenced_blocks("a ```json {\"x\":1}``` b ```\n[]\n``` c");
        assert_eq!(blocks, vec![("json", " {\"x\":1}"), ("", "\n[]\n")]);
    }
}
