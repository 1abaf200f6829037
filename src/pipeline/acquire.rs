//! Video acquisition: resolve a URL and download its media into the job.
//!
//! ## Why download into the job directory?
//!
//! The media is read twice (audio extraction, frame sampling), and a job
//! resumed in the same directory should not fetch it again. Downloading to
//! `downloaded_video.<ext>` under the job root gives both stages a stable
//! path and lets acquisition skip the fetch when the file already exists.

use crate::error::TutorialError;
use crate::job::JobWorkspace;
use crate::output::VideoSource;
use crate::services::{VideoFetcher, VideoInfo};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `url` and make sure its media is in the job directory.
pub async fn acquire(
    fetcher: &dyn VideoFetcher,
    workspace: &JobWorkspace,
    url: &str,
) -> Result<VideoSource, TutorialError> {
    if !is_url(url.trim()) {
        return Err(TutorialError::InvalidUrl { url: url.to_string() });
    }

    let info = fetcher.resolve(url).await?;
    let path = workspace.video_path(&info.file_extension);

    if path.is_file() {
        info!("Reusing downloaded video: {}", path.display());
    } else {
        info!("Downloading '{}' from {}", info.title, url);
        fetcher.fetch(url, &path).await?;
        if !path.is_file() {
            return Err(TutorialError::DownloadFailed {
                url: url.to_string(),
                reason: format!("nothing was written to {}", path.display()),
            });
        }
    }

    let path = std::path::absolute(&path).map_err(|e| TutorialError::SourceUnreadable {
        path: path.clone(),
        detail: e.to_string(),
    })?;
    debug!("Video source: {}", path.display());

    Ok(VideoSource {
        path,
        title: info.title,
        url: url.to_string(),
    })
}

/// [`VideoFetcher`] backed by the `yt-dlp` command-line tool.
///
/// Handles every site yt-dlp supports (YouTube, Vimeo, …).
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: PathBuf,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ext: Option<String>,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn output(&self, cmd: &mut Command) -> Result<std::process::Output, TutorialError> {
        cmd.output().await.map_err(|e| TutorialError::ToolUnavailable {
            tool: self.binary.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl VideoFetcher for YtDlpFetcher {
    async fn resolve(&self, url: &str) -> Result<VideoInfo, TutorialError> {
        let output = self
            .output(
                Command::new(&self.binary)
                    .arg("--dump-single-json")
                    .arg("--no-playlist")
                    .arg("-f")
                    .arg("best")
                    .arg(url),
            )
            .await?;

        if !output.status.success() {
            return Err(TutorialError::ResolveFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_yt_dlp_info(&output.stdout).map_err(|reason| TutorialError::ResolveFailed {
            url: url.to_string(),
            reason,
        })
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), TutorialError> {
        let output = self
            .output(
                Command::new(&self.binary)
                    .arg("--no-playlist")
                    .arg("--no-progress")
                    .arg("-f")
                    .arg("best")
                    .arg("-o")
                    .arg(dest)
                    .arg(url),
            )
            .await?;

        if !output.status.success() {
            return Err(TutorialError::DownloadFailed {
                url: url.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn parse_yt_dlp_info(stdout: &[u8]) -> Result<VideoInfo, String> {
    let info: YtDlpInfo =
        serde_json::from_slice(stdout).map_err(|e| format!("unexpected yt-dlp output: {e}"))?;
    Ok(VideoInfo {
        title: info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled video".to_string()),
        file_extension: info
            .ext
            .filter(|e| is_plain_extension(e))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
    })
}

const DEFAULT_EXTENSION: &str = "mp4";

/// [`VideoFetcher`] for direct links to media files, streamed with reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, TutorialError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TutorialError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout_secs })
    }

    fn download_error(&self, url: &str, e: reqwest::Error) -> TutorialError {
        let reason = if e.is_timeout() {
            format!("timed out after {}s", self.timeout_secs)
        } else {
            e.to_string()
        };
        TutorialError::DownloadFailed {
            url: url.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl VideoFetcher for HttpFetcher {
    async fn resolve(&self, url: &str) -> Result<VideoInfo, TutorialError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| TutorialError::InvalidUrl { url: url.to_string() })?;
        Ok(info_from_url(&parsed))
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), TutorialError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.download_error(url, e))?;

        if !response.status().is_success() {
            return Err(TutorialError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        // Stream into a `.part` file so an interrupted download never
        // leaves something that looks like a finished video.
        let part = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&part)
            .await
            .map_err(|e| TutorialError::write_failed(&part, e))?;

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| self.download_error(url, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| TutorialError::write_failed(&part, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| TutorialError::write_failed(&part, e))?;
        drop(file);

        tokio::fs::rename(&part, dest)
            .await
            .map_err(|e| TutorialError::write_failed(dest, e))?;
        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }
}

/// Title and container extension from the last path segment of `url`.
fn info_from_url(url: &reqwest::Url) -> VideoInfo {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .to_string();

    let (stem, ext) = match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && is_plain_extension(ext) => {
            (stem.to_string(), ext.to_ascii_lowercase())
        }
        _ => (last.clone(), DEFAULT_EXTENSION.to_string()),
    };

    let title = if stem.is_empty() {
        url.host_str().unwrap_or("video").to_string()
    } else {
        stem
    };

    VideoInfo {
        title,
        file_extension: ext,
    }
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl VideoFetcher for StubFetcher {
        async fn resolve(&self, _url: &str) -> Result<VideoInfo, TutorialError> {
            Ok(VideoInfo {
                title: "Knife skills".into(),
                file_extension: "webm".into(),
            })
        }

        async fn fetch(&self, _url: &str, dest: &Path) -> Result<(), TutorialError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, b"media").await.unwrap();
            Ok(())
        }
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://youtu.be/abc"));
        assert!(is_url("http://example.com/v.mp4"));
        assert!(!is_url("/tmp/v.mp4"));
        assert!(!is_url("ftp://example.com/v.mp4"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_info_uses_file_name() {
        let url = reqwest::Url::parse("https://cdn.example.com/media/how-to-sharpen.MOV?sig=1").unwrap();
        let info = info_from_url(&url);
        assert_eq!(info.title, "how-to-sharpen");
        assert_eq!(info.file_extension, "mov");

        let url = reqwest::Url::parse("https://example.com/watch").unwrap();
        let info = info_from_url(&url);
        assert_eq!(info.title, "watch");
        assert_eq!(info.file_extension, "mp4");

        let url = reqwest::Url::parse("https://example.com/").unwrap();
        assert_eq!(info_from_url(&url).title, "example.com");
    }

    #[test]
    fn yt_dlp_info_parsing() {
        let info = parse_yt_dlp_info(br#"{"id":"x","title":"Knots","ext":"webm","formats":[]}"#).unwrap();
        assert_eq!(info.title, "Knots");
        assert_eq!(info.file_extension, "webm");

        let info = parse_yt_dlp_info(br#"{"id":"x","ext":"../../x"}"#).unwrap();
        assert_eq!(info.title, "Untitled video");
        assert_eq!(info.file_extension, "mp4");

        assert!(parse_yt_dlp_info(b"ERROR: unsupported URL").is_err());
    }

    #[tokio::test]
    async fn acquire_skips_fetch_when_file_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::new(tmp.path(), &JobId::new());
        ws.create().await.unwrap();
        let fetcher = StubFetcher {
            fetches: AtomicUsize::new(0),
        };

        let first = acquire(&fetcher, &ws, "https://example.com/v").await.unwrap();
        let second = acquire(&fetcher, &ws, "https://example.com/v").await.unwrap();

        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
        assert!(first.path.is_absolute());
        assert!(first.path.ends_with("downloaded_video.webm"));
        assert_eq!(first.path, second.path);
        assert_eq!(second.title, "Knife skills");
    }

    #[tokio::test]
    async fn acquire_rejects_non_http_input() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::new(tmp.path(), &JobId::new());
        let fetcher = StubFetcher {
            fetches: AtomicUsize::new(0),
        };
        let err = acquire(&fetcher, &ws, "not a url").await.unwrap_err();
        assert!(matches!(err, TutorialError::InvalidUrl { .. }));
    }
}
