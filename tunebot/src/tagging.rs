//! Audio post-processing.
//!
//! An [`AudioTagger`] normalizes a downloaded file in place and embeds the
//! track's title and artists as tags. [`FfmpegTagger`] shells out to ffmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tunebot_common::config::TaggingConfig;
use tunebot_common::util::tail_chars;

/// Metadata embedded into the audio file.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
}

/// Rewrites an audio file in place.
#[async_trait]
pub trait AudioTagger: Send + Sync {
    async fn tag(&self, path: &Path, metadata: &TrackMetadata) -> anyhow::Result<()>;
}

/// Tagger backed by the ffmpeg CLI.
///
/// Re-encodes to a fixed channel count and sample rate and writes ID3v2.3
/// title/artist frames, then replaces the input file.
pub struct FfmpegTagger {
    ffmpeg_path: String,
    channels: u8,
    sample_rate: u32,
}

impl FfmpegTagger {
    pub fn new(config: &TaggingConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            channels: config.channels,
            sample_rate: config.sample_rate,
        }
    }

    /// Temp output path next to the input, keeping the extension so ffmpeg
    /// picks the right muxer.
    fn staging_path(path: &Path) -> PathBuf {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("mp3");
        path.with_file_name(format!(".tagging.{ext}"))
    }

    fn build_args(&self, input: &Path, output: &Path, metadata: &TrackMetadata) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-ac".to_string(),
            self.channels.to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-metadata".to_string(),
            format!("title={}", metadata.title),
            "-metadata".to_string(),
            format!("artist={}", metadata.artist),
            "-id3v2_version".to_string(),
            "3".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl AudioTagger for FfmpegTagger {
    async fn tag(&self, path: &Path, metadata: &TrackMetadata) -> anyhow::Result<()> {
        let staging = Self::staging_path(path);
        let args = self.build_args(path, &staging, metadata);

        tracing::debug!(file = %path.display(), "Running ffmpeg tagger");

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to execute {}: {e}", self.ffmpeg_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg failed: {}", tail_chars(stderr.trim(), 500));
        }

        if !staging.exists() {
            anyhow::bail!("ffmpeg produced no output file");
        }

        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}
