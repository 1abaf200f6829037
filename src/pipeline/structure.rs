//! Transcript → tutorial outline.
//!
//! The text service is asked for a strict JSON object, but replies are
//! parsed leniently: an outer Markdown code fence is stripped, unknown
//! fields are ignored, missing fields take defaults and step numbers are
//! reassigned in reply order. Anything that still cannot produce at least
//! one step yields the fallback outline, so this stage never fails a job.

use crate::config::TutorialConfig;
use crate::output::{Outline, OutlineStep};
use crate::prompts::structuring_prompt;
use crate::services::Structurer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

/// Title used when the service gives none.
pub const FALLBACK_TITLE: &str = "Video Tutorial";
/// Title of the single step of the fallback outline.
pub const FALLBACK_STEP_TITLE: &str = "Content";

// ```json\n{...}\n``` with optional language tag, whole reply only.
static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").unwrap());

#[derive(Debug, Deserialize)]
struct RawOutline {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    introduction: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    title: String,
    #[serde(default)]
    explanation: String,
}

/// Structure `transcript` into an outline with at least one step.
pub async fn structure(structurer: &dyn Structurer, transcript: &str, config: &TutorialConfig) -> Outline {
    let reply = match structurer.complete(&structuring_prompt(transcript)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Structuring failed, using fallback outline: {}", e);
            return fallback_outline(transcript, config.intro_fallback_chars);
        }
    };

    match parse_outline(&reply) {
        Some(outline) => {
            info!("Outline '{}' with {} steps", outline.title, outline.steps.len());
            outline
        }
        None => {
            warn!(
                "Unusable structuring reply ({} chars), using fallback outline",
                reply.len()
            );
            fallback_outline(transcript, config.intro_fallback_chars)
        }
    }
}

/// Parse a structuring reply. `None` when it is not an outline with steps.
pub fn parse_outline(reply: &str) -> Option<Outline> {
    let body = strip_outer_fence(reply);
    let raw: RawOutline = match serde_json::from_str(body) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Structuring reply is not valid outline JSON: {}", e);
            return None;
        }
    };
    if raw.steps.is_empty() {
        return None;
    }

    let steps = raw
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, s)| OutlineStep {
            step_number: i + 1,
            title: s.title,
            explanation: s.explanation,
        })
        .collect();

    Some(Outline {
        title: raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string()),
        introduction: raw.introduction.unwrap_or_default(),
        steps,
    })
}

/// The outline used whenever the service cannot provide one.
pub fn fallback_outline(transcript: &str, intro_chars: usize) -> Outline {
    Outline {
        title: FALLBACK_TITLE.to_string(),
        introduction: transcript.chars().take(intro_chars).collect(),
        steps: vec![OutlineStep {
            step_number: 1,
            title: FALLBACK_STEP_TITLE.to_string(),
            explanation: transcript.to_string(),
        }],
    }
}

fn strip_outer_fence(reply: &str) -> &str {
    match RE_OUTER_FENCE.captures(reply).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => reply.trim(),
    }
}
