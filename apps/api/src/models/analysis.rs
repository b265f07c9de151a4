use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feedback::analyzer::{AnalysisMetadata, AnalysisOutcome};
use crate::feedback::schema::FeedbackReport;

/// Caller-supplied identifiers and job context attached to an analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOwner {
    pub user_id: String,
    pub tenant_id: String,
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
}

/// One stored analysis: the report and usage metadata, unmodified, plus identifiers.
/// This is the value handed to the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: Uuid,
    #[serde(flatten)]
    pub owner: AnalysisOwner,
    pub feedback: FeedbackReport,
    pub tokens_used: u64,
    pub processing_cost: f64,
    /// Milliseconds.
    pub processing_time: u64,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(owner: AnalysisOwner, outcome: AnalysisOutcome) -> Self {
        let AnalysisOutcome { feedback, metadata } = outcome;
        let AnalysisMetadata {
            processing_time_ms,
            tokens_used,
            processing_cost,
            model_used,
        } = metadata;

        Self {
            id: Uuid::new_v4(),
            owner,
            feedback,
            tokens_used,
            processing_cost,
            processing_time: processing_time_ms,
            model_used,
            created_at: Utc::now(),
        }
    }
}
