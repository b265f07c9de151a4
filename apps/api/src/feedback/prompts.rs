// Resume feedback prompt templates.
// The wording is part of the output contract: it is what keeps the model producing
// complete, schema-conformant reports for weak or empty input.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// System prompt for feedback generation.
pub const FEEDBACK_SYSTEM: &str = JSON_ONLY_SYSTEM;

pub const NO_JOB_TITLE: &str = "No job title provided";
pub const NO_JOB_DESCRIPTION: &str = "No job description provided";
pub const NO_RESUME_TEXT: &str =
    "No resume text could be extracted from the uploaded document";

const FEEDBACK_INSTRUCTIONS: &str = "\
You are an expert in ATS (Applicant Tracking Systems) and resume analysis.
Analyze and rate this resume and suggest how to improve it.
The rating can be low if the resume is bad. Be thorough and detailed.
Don't be afraid to point out mistakes or areas for improvement.
If there is a lot to improve, don't hesitate to give low scores. This is to help the user improve their resume.
If a job description is provided, weight your scoring and feedback toward that job description.";

const FEEDBACK_OUTPUT_RULES: &str = "\
Provide feedback for ALL sections: overallScore (an integer from 0-100), ATS, toneAndStyle, content, structure, skills.
Each section has a score (an integer from 0-100) and a list of tips.
Even if the resume is poor, empty, not a resume, or lacks relevant information, ALWAYS provide scores (0-100) \
and at least 2-3 tips for EACH section. Never omit a section.
Each tip has a type ('good' or 'improve'), tip text that is a short title for the explanation, \
and an optional explanation.
Adapt the tips to explain why a section is weak or missing.
Return ONLY a valid JSON object with all required fields populated. No other text, markdown, or comments.";

/// Renders the feedback prompt. Pure and deterministic.
///
/// Blank inputs degrade to explicit placeholders so the model is told what is missing
/// rather than seeing an empty field.
pub fn build_feedback_prompt(job_title: &str, job_description: &str, resume_text: &str) -> String {
    let job_title = or_placeholder(job_title, NO_JOB_TITLE);
    let job_description = or_placeholder(job_description, NO_JOB_DESCRIPTION);
    let resume_text = or_placeholder(resume_text, NO_RESUME_TEXT);

    format!(
        "{FEEDBACK_INSTRUCTIONS}\n\n\
         JOB TITLE:\n{job_title}\n\n\
         JOB DESCRIPTION:\n{job_description}\n\n\
         RESUME TEXT:\n{resume_text}\n\n\
         {FEEDBACK_OUTPUT_RULES}"
    )
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        placeholder
    } else {
        trimmed
    }
}
