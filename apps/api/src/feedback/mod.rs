// Resume feedback pipeline.
// Implements: prompt building, schema-constrained model call, response recovery and
// validation, usage metadata. All model calls go through llm_client.

pub mod analyzer;
pub mod extract;
pub mod handlers;
pub mod prompts;
pub mod schema;
