//! Prompts for the structuring and frame-selection calls.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing what the services are asked for
//!    (e.g. a new outline field) requires editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    live service, making prompt regressions easy to catch.
//!
//! Callers can override the structuring system prompt via
//! [`crate::config::TutorialConfig::system_prompt`].

use crate::output::OutlineStep;

/// Default system prompt for the structuring call.
pub const STRUCTURING_SYSTEM_PROMPT: &str =
    "You are a tutorial structuring expert. Always respond with valid JSON only.";

/// Build the user prompt asking for an outline of `transcript`.
pub fn structuring_prompt(transcript: &str) -> String {
    format!(
        r#"You are a tutorial creator. Convert the following video transcript into a well-structured tutorial format.

Structure it as:
1. Introduction (brief overview)
2. Multiple steps (as many as needed based on content)
   - Each step should have a title and detailed explanation
   - Steps should be logical and sequential

Transcript:
{transcript}

Return ONLY a JSON object with this structure:
{{
    "title": "Tutorial title",
    "introduction": "Introduction text",
    "steps": [
        {{"step_number": 1, "title": "Step title", "explanation": "Detailed explanation"}},
        ...
    ]
}}"#
    )
}

/// Build the text part of a frame-selection request over `candidates`
/// images, which are attached after it tagged `Frame 1..candidates`.
pub fn frame_selection_prompt(step: &OutlineStep, candidates: usize) -> String {
    format!(
        "Select the frame number (1-{n}) that best illustrates this tutorial step:\n\n\
         Step {num}: {title}\n{explanation}\n\n\
         Respond with ONLY the frame number (1-{n}) that best matches this step.",
        n = candidates,
        num = step.step_number,
        title = step.title,
        explanation = step.explanation,
    )
}

/// Caption attached after the `ordinal`-th candidate image (1-based).
pub fn frame_label(ordinal: usize) -> String {
    format!("Frame {ordinal}")
}
