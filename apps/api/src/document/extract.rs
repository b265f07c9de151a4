//! Text Extractor — converts an uploaded resume (PDF) into plain text.
//!
//! A document that parses but carries no text layer (scanned pages, images only)
//! is NOT an error: it yields an empty string, and the rest of the pipeline still
//! produces a complete report for it.

use std::panic::{self, AssertUnwindSafe};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

/// The only media type the analyzer accepts.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported media type '{0}': only application/pdf is accepted")]
    UnsupportedMediaType(String),

    #[error("Document is not a readable PDF: {0}")]
    Unreadable(String),
}

/// An uploaded resume, as handed over by the caller. Consumed once by extraction.
#[derive(Debug, Clone)]
pub struct ResumeDocument {
    pub bytes: Bytes,
    pub media_type: String,
}

impl ResumeDocument {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn pdf(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes, PDF_MEDIA_TYPE)
    }

    /// Media type without parameters, lowercased (`Application/PDF; x=y` → `application/pdf`).
    fn essence(&self) -> String {
        self.media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

/// Extracts the full, trimmed text content of a document.
///
/// Purely CPU-bound. Async callers should run it via `spawn_blocking`.
pub fn extract_text(document: &ResumeDocument) -> Result<String, ExtractionError> {
    let media_type = document.essence();
    if media_type != PDF_MEDIA_TYPE {
        return Err(ExtractionError::UnsupportedMediaType(media_type));
    }

    // pdf-extract panics on some malformed inputs instead of returning an error.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&document.bytes)
    }));

    let text = match result {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => return Err(ExtractionError::Unreadable(e.to_string())),
        Err(_) => {
            warn!(
                "PDF parser panicked on a {}-byte document",
                document.bytes.len()
            );
            return Err(ExtractionError::Unreadable(
                "parser aborted on malformed content".to_string(),
            ));
        }
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        debug!("PDF parsed but contains no text layer");
    }
    Ok(text)
}
