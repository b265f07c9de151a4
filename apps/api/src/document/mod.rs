// Document ingestion: turns uploaded resume bytes into plain text.
// File upload, temp storage, and cleanup belong to the caller.

pub mod extract;

pub use extract::{extract_text, ExtractionError, ResumeDocument};
