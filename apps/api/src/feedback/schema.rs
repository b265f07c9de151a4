//! Feedback Schema — the closed contract every successful analysis satisfies.
//!
//! Five fixed sections (`ATS`, `toneAndStyle`, `content`, `structure`, `skills`), each with
//! an integer score in 0–100 and at least two tips. Shape is enforced by serde
//! (missing sections, wrong types, unknown tip kinds all fail deserialization);
//! ranges and counts are enforced by [`FeedbackReport::validate`].
//!
//! Scores follow JSON Schema's `integer`: `85.0` is an integer, `85.5` and `-5` are not.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use thiserror::Error;

pub const MIN_SCORE: u32 = 0;
pub const MAX_SCORE: u32 = 100;
pub const MIN_TIPS_PER_SECTION: usize = 2;

/// Section names in report order, as they appear on the wire.
pub const SECTION_NAMES: [&str; 5] = ["ATS", "toneAndStyle", "content", "structure", "skills"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipType {
    Good,
    Improve,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    #[serde(rename = "type")]
    pub tip_type: TipType,
    /// Short title for the tip.
    pub tip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSection {
    #[serde(deserialize_with = "deserialize_score")]
    pub score: u32,
    pub tips: Vec<Tip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackReport {
    #[serde(deserialize_with = "deserialize_score")]
    pub overall_score: u32,
    #[serde(rename = "ATS")]
    pub ats: FeedbackSection,
    pub tone_and_style: FeedbackSection,
    pub content: FeedbackSection,
    pub structure: FeedbackSection,
    pub skills: FeedbackSection,
}

#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("Report does not have the feedback shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("{field} score {score} is outside 0..=100")]
    ScoreOutOfRange { field: String, score: u32 },

    #[error("Section {section} has {count} tips; at least 2 are required")]
    TooFewTips { section: &'static str, count: usize },
}

impl FeedbackReport {
    /// Deserializes and validates a JSON value in one step.
    pub fn from_value(value: Value) -> Result<Self, SchemaViolation> {
        let report: FeedbackReport = serde_json::from_value(value)?;
        report.validate()?;
        Ok(report)
    }

    /// Sections paired with their wire names, in report order.
    pub fn sections(&self) -> [(&'static str, &FeedbackSection); 5] {
        [
            (SECTION_NAMES[0], &self.ats),
            (SECTION_NAMES[1], &self.tone_and_style),
            (SECTION_NAMES[2], &self.content),
            (SECTION_NAMES[3], &self.structure),
            (SECTION_NAMES[4], &self.skills),
        ]
    }

    /// Checks the constraints serde cannot express. Reports the first violation found.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        check_score("overallScore", self.overall_score)?;
        for (name, section) in self.sections() {
            check_score(name, section.score)?;
            if section.tips.len() < MIN_TIPS_PER_SECTION {
                return Err(SchemaViolation::TooFewTips {
                    section: name,
                    count: section.tips.len(),
                });
            }
        }
        Ok(())
    }
}

/// Accepts any non-negative JSON number with no fractional part. The upper bound is left to
/// [`FeedbackReport::validate`] so it reports which field is out of range.
fn deserialize_score<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Number::deserialize(deserializer)?;
    number
        .as_u64()
        .or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(f))
                .map(|f| f as u64)
        })
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            de::Error::custom(format!("score must be a non-negative integer, got {number}"))
        })
}

fn check_score(field: &str, score: u32) -> Result<(), SchemaViolation> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(())
    } else {
        Err(SchemaViolation::ScoreOutOfRange {
            field: field.to_string(),
            score,
        })
    }
}

/// JSON Schema for the report, sent to the model as its output contract.
/// Providers may treat it as advisory, so responses are still validated locally.
pub fn feedback_json_schema() -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "overallScore".to_string(),
        json!({
            "type": "integer",
            "minimum": MIN_SCORE,
            "maximum": MAX_SCORE,
            "description": "Overall resume score out of 100"
        }),
    );
    for name in SECTION_NAMES {
        properties.insert(name.to_string(), section_schema(name));
    }

    let mut required = vec!["overallScore"];
    required.extend(SECTION_NAMES);

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn section_schema(name: &str) -> Value {
    json!({
        "type": "object",
        "description": format!("{name} section; always include"),
        "properties": {
            "score": { "type": "integer", "minimum": MIN_SCORE, "maximum": MAX_SCORE },
            "tips": {
                "type": "array",
                "minItems": MIN_TIPS_PER_SECTION,
                "description": "At least 2 tips required",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string", "enum": ["good", "improve"] },
                        "tip": {
                            "type": "string",
                            "description": "A short title for the explanation"
                        },
                        "explanation": {
                            "type": "string",
                            "description": "Optional detailed explanation"
                        }
                    },
                    "required": ["type", "tip"]
                }
            }
        },
        "required": ["score", "tips"]
    })
}
