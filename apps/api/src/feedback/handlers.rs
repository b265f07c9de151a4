use axum::{
    extract::{multipart::Field, multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::document::ResumeDocument;
use crate::errors::AppError;
use crate::models::analysis::{AnalysisOwner, AnalysisRecord};
use crate::state::AppState;

/// Multipart field carrying the resume file.
const RESUME_FIELD: &str = "resume";

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub data: AnalysisRecord,
}

/// POST /api/v1/resume/analyze
///
/// Multipart form: `resume` (PDF, required), and optional text fields `jobTitle`,
/// `jobDescription`, `companyName`, `userId`, `tenantId`. Unknown fields are ignored.
/// A file part without a content type is taken to be a PDF.
pub async fn handle_analyze(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let mut owner = AnalysisOwner::default();
    let mut document: Option<ResumeDocument> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            RESUME_FIELD => {
                let media_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                document = Some(match media_type {
                    Some(media_type) => ResumeDocument::new(bytes, media_type),
                    None => ResumeDocument::pdf(bytes),
                });
            }
            "jobTitle" => owner.job_title = text(field).await?,
            "jobDescription" => owner.job_description = text(field).await?,
            "companyName" => owner.company_name = text(field).await?,
            "userId" => owner.user_id = text(field).await?,
            "tenantId" => owner.tenant_id = text(field).await?,
            _ => {}
        }
    }

    let document =
        document.ok_or_else(|| AppError::Validation("Resume file required".to_string()))?;
    info!(
        user_id = %owner.user_id,
        tenant_id = %owner.tenant_id,
        bytes = document.bytes.len(),
        "Analysis requested"
    );

    let outcome = state
        .analyzer
        .analyze_document(
            document,
            owner.job_title.clone(),
            owner.job_description.clone(),
        )
        .await?;

    Ok(Json(AnalyzeResponse {
        success: true,
        data: AnalysisRecord::new(owner, outcome),
    }))
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}
