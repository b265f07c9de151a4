//! Analysis Orchestrator — runs the feedback pipeline for one request.
//!
//! Flow: build_feedback_prompt → model.generate (schema-constrained, under the caller's
//!       timeout) → extract_structured → metadata → (report, metadata).
//!
//! Stateless across requests and side-effect free: no retries, no persistence, and never a
//! fabricated report. Every failure is surfaced as a single [`AnalysisFailure`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::document::{extract_text, ExtractionError, ResumeDocument};
use crate::feedback::extract::{extract_structured, MalformedResponseError};
use crate::feedback::prompts::{build_feedback_prompt, FEEDBACK_SYSTEM};
use crate::feedback::schema::{feedback_json_schema, FeedbackReport};
use crate::llm_client::{GenerativeModel, LlmError, OutputSchema};

/// Tool name the model answers through.
pub const FEEDBACK_TOOL_NAME: &str = "resume_feedback";

/// Characters per estimated token.
const CHARS_PER_TOKEN: u64 = 4;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub resume_text: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub job_description: String,
}

/// Usage accounting derived locally; the provider's own token counts are not consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub processing_time_ms: u64,
    pub tokens_used: u64,
    pub processing_cost: f64,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub feedback: FeedbackReport,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error("Document extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Malformed model response: {0}")]
    MalformedResponse(#[from] MalformedResponseError),

    #[error("Model call timed out")]
    Timeout,

    #[error("Model call failed: {0}")]
    Model(#[source] LlmError),

    #[error("Extraction worker failed: {0}")]
    Worker(#[from] JoinError),
}

impl From<LlmError> for AnalysisFailure {
    fn from(e: LlmError) -> Self {
        if e.is_timeout() {
            AnalysisFailure::Timeout
        } else {
            AnalysisFailure::Model(e)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pricing
// ────────────────────────────────────────────────────────────────────────────

/// Turns an estimated token count into a cost. Implementations never return a negative value.
pub trait PricingPolicy: Send + Sync {
    fn cost(&self, tokens_used: u64) -> f64;
}

/// Free-tier usage: every analysis costs nothing.
pub struct FreeTier;

impl PricingPolicy for FreeTier {
    fn cost(&self, _tokens_used: u64) -> f64 {
        0.0
    }
}

/// Flat rate per thousand estimated tokens.
pub struct PerThousandTokens {
    pub usd_per_1k: f64,
}

impl PricingPolicy for PerThousandTokens {
    fn cost(&self, tokens_used: u64) -> f64 {
        (tokens_used as f64 / 1000.0 * self.usd_per_1k).max(0.0)
    }
}

/// ⌈characters / 4⌉. A deliberate approximation: cost estimation is defined against it.
/// Characters are Unicode scalar values, not UTF-16 code units, so a character outside the
/// Basic Multilingual Plane (most emoji) counts once where a UTF-16 length would count two.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

fn feedback_output_schema() -> OutputSchema {
    OutputSchema {
        name: FEEDBACK_TOOL_NAME.to_string(),
        description: "Structured resume feedback with an overall score and five scored sections"
            .to_string(),
        schema: feedback_json_schema(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Analyzer
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Analyzer {
    model: Arc<dyn GenerativeModel>,
    pricing: Arc<dyn PricingPolicy>,
    timeout: Option<Duration>,
}

impl Analyzer {
    pub fn new(model: Arc<dyn GenerativeModel>, pricing: Arc<dyn PricingPolicy>) -> Self {
        Self {
            model,
            pricing,
            timeout: None,
        }
    }

    /// Bounds the model call. Expiry fails the analysis with [`AnalysisFailure::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs the feedback pipeline over already-extracted resume text.
    ///
    /// Empty resume text, title, or description are valid inputs: the prompt says what is
    /// missing and the model still returns a complete, low-scoring report.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, AnalysisFailure> {
        let started = Instant::now();

        let prompt = build_feedback_prompt(
            &request.job_title,
            &request.job_description,
            &request.resume_text,
        );
        let schema = feedback_output_schema();

        let call = self.model.generate(&prompt, FEEDBACK_SYSTEM, &schema);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                warn!("Model call exceeded {}ms", limit.as_millis());
                AnalysisFailure::Timeout
            })??,
            None => call.await?,
        };
        debug!("Raw model response: {:?}", output);

        let feedback = extract_structured(&output).map_err(|e| {
            warn!("Model response rejected: {e}");
            AnalysisFailure::MalformedResponse(e)
        })?;

        let tokens_used = estimate_tokens(&request.resume_text);
        let metadata = AnalysisMetadata {
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            tokens_used,
            processing_cost: self.pricing.cost(tokens_used),
            model_used: self.model.model_name().to_string(),
        };

        info!(
            overall_score = feedback.overall_score,
            tokens_used = metadata.tokens_used,
            elapsed_ms = metadata.processing_time_ms,
            model = %metadata.model_used,
            "Resume analysis complete"
        );

        Ok(AnalysisOutcome { feedback, metadata })
    }

    /// Extracts text from an uploaded document on a blocking worker, then analyzes it.
    pub async fn analyze_document(
        &self,
        document: ResumeDocument,
        job_title: String,
        job_description: String,
    ) -> Result<AnalysisOutcome, AnalysisFailure> {
        let size = document.bytes.len();
        let resume_text = tokio::task::spawn_blocking(move || extract_text(&document)).await??;
        info!(
            "Extracted {} characters from {}-byte document",
            resume_text.chars().count(),
            size
        );

        self.analyze(&AnalysisRequest {
            resume_text,
            job_title,
            job_description,
        })
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm_client::{GenerativeModel, LlmError, ModelOutput, OutputSchema};

    pub const STUB_MODEL: &str = "stub-model";

    /// Returns the same output for every call and records the prompts it was given.
    pub struct CannedModel {
        output: ModelOutput,
        pub prompts: Mutex<Vec<String>>,
        pub schemas: Mutex<Vec<String>>,
    }

    impl CannedModel {
        pub fn new(output: ModelOutput) -> Self {
            Self {
                output,
                prompts: Mutex::new(Vec::new()),
                schemas: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for CannedModel {
        async fn generate(
            &self,
            prompt: &str,
            _system: &str,
            schema: &OutputSchema,
        ) -> Result<ModelOutput, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.schemas.lock().unwrap().push(schema.name.clone());
            Ok(self.output.clone())
        }

        fn model_name(&self) -> &str {
            STUB_MODEL
        }
    }

    /// Never answers.
    pub struct StalledModel;

    #[async_trait]
    impl GenerativeModel for StalledModel {
        async fn generate(
            &self,
            _prompt: &str,
            _system: &str,
            _schema: &OutputSchema,
        ) -> Result<ModelOutput, LlmError> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            STUB_MODEL
        }
    }

    /// Always fails with an API error.
    pub struct RejectingModel;

    #[async_trait]
    impl GenerativeModel for RejectingModel {
        async fn generate(
            &self,
            _prompt: &str,
            _system: &str,
            _schema: &OutputSchema,
        ) -> Result<ModelOutput, LlmError> {
            Err(LlmError::Api {
                status: 401,
                message: "invalid x-api-key".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            STUB_MODEL
        }
    }
}
