//! Tutorial document rendering.
//!
//! The finished tutorial is written twice into `<job>/output/`:
//! `tutorial.md` for people and `tutorial.json` (the serialized
//! [`Tutorial`]) for programs. Image links in the Markdown are relative to
//! the output directory, so the job directory can be moved or zipped as a
//! unit.

use crate::error::TutorialError;
use crate::job::{write_atomic, JobWorkspace};
use crate::output::{MatchedStep, Tutorial};
use tracing::info;

/// Append a `t=<whole seconds>s` start offset to a video URL.
pub fn jump_link(url: &str, timestamp: f64) -> String {
    let secs = timestamp.max(0.0).floor() as u64;
    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };
    let sep = if base.contains('?') { '&' } else { '?' };
    match fragment {
        Some(fragment) => format!("{base}{sep}t={secs}s#{fragment}"),
        None => format!("{base}{sep}t={secs}s"),
    }
}

/// Format seconds as `m:ss`, or `h:mm:ss` past the hour.
pub fn format_timestamp(timestamp: f64) -> String {
    let total = timestamp.max(0.0).floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Render the tutorial as Markdown.
pub fn render_markdown(tutorial: &Tutorial) -> String {
    let mut md = String::new();

    md.push_str(&format!("# {}\n\n", tutorial.title.trim()));
    md.push_str(&format!(
        "*Source: [{}]({})*\n\n",
        escape_link_text(&tutorial.video_title),
        tutorial.source_url
    ));

    if !tutorial.introduction.trim().is_empty() {
        md.push_str("## Introduction\n\n");
        md.push_str(tutorial.introduction.trim());
        md.push_str("\n\n");
    }

    for step in &tutorial.steps {
        render_step(&mut md, step, &tutorial.source_url);
    }

    md
}

fn render_step(md: &mut String, step: &MatchedStep, source_url: &str) {
    md.push_str(&format!(
        "## Step {}: {}\n\n",
        step.step.step_number,
        step.step.title.trim()
    ));
    if let Some(name) = step.frame_name() {
        md.push_str(&format!(
            "![Step {} at {}](../frames/{})\n\n",
            step.step.step_number,
            format_timestamp(step.timestamp),
            name
        ));
    }
    if !step.step.explanation.trim().is_empty() {
        md.push_str(step.step.explanation.trim());
        md.push_str("\n\n");
    }
    md.push_str(&format!(
        "*{}* · [Jump to video]({})\n\n",
        format_timestamp(step.timestamp),
        jump_link(source_url, step.timestamp)
    ));
}

fn escape_link_text(text: &str) -> String {
    text.replace('[', "\\[").replace(']', "\\]")
}

/// Write `tutorial.md` and `tutorial.json` into the job's output directory.
pub async fn write_document(workspace: &JobWorkspace, tutorial: &Tutorial) -> Result<(), TutorialError> {
    let markdown = render_markdown(tutorial);
    write_atomic(&workspace.document_path(), markdown.into_bytes()).await?;

    let json = serde_json::to_vec_pretty(tutorial)
        .map_err(|e| TutorialError::Internal(format!("tutorial serialisation: {e}")))?;
    write_atomic(&workspace.document_json_path(), json).await?;

    info!("Tutorial written to {}", workspace.document_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use crate::output::OutlineStep;
    use std::path::PathBuf;

    fn tutorial(ws: &JobWorkspace, id: JobId) -> Tutorial {
        Tutorial {
            job_id: id,
            title: "Sharpen a Knife".into(),
            introduction: "Whetstone basics.".into(),
            source_url: "https://www.youtube.com/watch?v=abc".into(),
            video_title: "Knife [HD]".into(),
            steps: vec![MatchedStep {
                step: OutlineStep {
                    step_number: 1,
                    title: "Soak the stone".into(),
                    explanation: "Ten minutes in water.".into(),
                },
                frame_path: ws.frame_path(70.0),
                timestamp: 70.0,
            }],
            document_path: ws.document_path(),
        }
    }

    #[test]
    fn jump_link_picks_separator() {
        assert_eq!(jump_link("https://youtu.be/abc", 70.9), "https://youtu.be/abc?t=70s");
        assert_eq!(
            jump_link("https://www.youtube.com/watch?v=abc", 20.0),
            "https://www.youtube.com/watch?v=abc&t=20s"
        );
        assert_eq!(
            jump_link("https://example.com/v.mp4#player", 5.5),
            "https://example.com/v.mp4?t=5s#player"
        );
    }

    #[test]
    fn timestamps_format_as_clock() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(70.4), "1:10");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }

    #[test]
    fn markdown_has_sections_and_relative_images() {
        let ws = JobWorkspace::new(std::path::Path::new("jobs"), &JobId::new());
        let md = render_markdown(&tutorial(&ws, JobId::new()));
        assert!(md.starts_with("# Sharpen a Knife\n"));
        assert!(md.contains("[Knife \\[HD\\]](https://www.youtube.com/watch?v=abc)"));
        assert!(md.contains("## Introduction\n\nWhetstone basics."));
        assert!(md.contains("## Step 1: Soak the stone"));
        assert!(md.contains("](../frames/frame_70.00.jpg)"));
        assert!(md.contains("[Jump to video](https://www.youtube.com/watch?v=abc&t=70s)"));
    }

    #[test]
    fn empty_introduction_is_omitted() {
        let ws = JobWorkspace::new(std::path::Path::new("jobs"), &JobId::new());
        let mut t = tutorial(&ws, JobId::new());
        t.introduction = "  ".into();
        assert!(!render_markdown(&t).contains("## Introduction"));
    }

    #[tokio::test]
    async fn write_document_produces_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let id = JobId::new();
        let ws = JobWorkspace::new(tmp.path(), &id);
        ws.create().await.unwrap();
        let t = tutorial(&ws, id);

        write_document(&ws, &t).await.unwrap();

        let md = std::fs::read_to_string(ws.document_path()).unwrap();
        assert!(md.contains("Soak the stone"));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(ws.document_json_path()).unwrap()).unwrap();
        assert_eq!(json["steps"][0]["step_number"], 1);
        assert_eq!(
            PathBuf::from(json["document_path"].as_str().unwrap()),
            ws.document_path()
        );
    }
}
