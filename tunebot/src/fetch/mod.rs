//! Track fetching.
//!
//! [`TrackFetcher`] runs a [`FetchProvider`] (an external downloader process)
//! inside a private working directory, picks up the audio file it produced,
//! optionally post-processes it with an [`AudioTagger`], and returns the
//! bytes. The working directory is removed on every exit path.

pub mod spotdl;

pub use spotdl::SpotdlProvider;

use crate::search::Track;
use crate::tagging::{AudioTagger, TrackMetadata};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tunebot_common::util::{format_bytes, tail_chars};

/// Extensions accepted as downloader output.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "opus", "ogg", "flac", "wav"];

/// Longest diagnostic text kept from a failed provider run.
const MAX_DIAGNOSTIC_CHARS: usize = 1000;

/// Downloaded audio held in memory.
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub file_name: String,
    pub data: Vec<u8>,
    pub title: String,
    pub performer: String,
}

/// Fetch errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The downloader could not be started, exited non-zero, or timed out
    #[error("Downloader failed: {0}")]
    ProviderInvocationFailed(String),

    /// The downloader exited cleanly but left no audio file
    #[error("Downloader produced no audio file")]
    OutputNotFound,

    /// Tagging or reading the output failed
    #[error("Post-processing failed: {0}")]
    PostProcessingFailed(String),
}

impl FetchError {
    /// Text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderInvocationFailed(diagnostics) => {
                format!("Download failed: {diagnostics}")
            }
            Self::OutputNotFound => "Failed to find the downloaded file.".to_string(),
            Self::PostProcessingFailed(_) => {
                "An error occurred while preparing the audio file.".to_string()
            }
        }
    }
}

/// Result of one downloader run.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub diagnostics: String,
}

impl ProviderOutcome {
    /// Build an outcome from raw process output.
    ///
    /// Diagnostics prefer stderr and fall back to stdout; only the tail is kept.
    pub fn from_output(success: bool, exit_code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> Self {
        let stderr = String::from_utf8_lossy(stderr);
        let stdout = String::from_utf8_lossy(stdout);
        let text = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        Self {
            success,
            exit_code,
            diagnostics: tail_chars(text, MAX_DIAGNOSTIC_CHARS).to_string(),
        }
    }
}

/// External downloader.
///
/// Writes zero or one audio file into `dest`.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Download the track identified by `locator` into `dest`.
    async fn invoke(&self, locator: &str, dest: &Path) -> std::io::Result<ProviderOutcome>;
}

/// Runs fetches with per-operation working directories.
pub struct TrackFetcher {
    provider: Arc<dyn FetchProvider>,
    tagger: Option<Arc<dyn AudioTagger>>,
    work_root: PathBuf,
    timeout: Duration,
}

impl TrackFetcher {
    pub fn new(provider: Arc<dyn FetchProvider>, work_root: PathBuf, timeout: Duration) -> Self {
        Self {
            provider,
            tagger: None,
            work_root,
            timeout,
        }
    }

    /// Post-process every fetched file with `tagger`.
    pub fn with_tagger(mut self, tagger: Arc<dyn AudioTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Fetch `track` and return its audio.
    pub async fn fetch(&self, track: &Track) -> Result<AudioFile, FetchError> {
        let fetch_id = uuid::Uuid::new_v4();
        let start = Instant::now();

        tokio::fs::create_dir_all(&self.work_root)
            .await
            .map_err(|e| {
                FetchError::ProviderInvocationFailed(format!(
                    "cannot prepare work directory {}: {e}",
                    self.work_root.display()
                ))
            })?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("fetch-{fetch_id}-"))
            .tempdir_in(&self.work_root)
            .map_err(|e| {
                FetchError::ProviderInvocationFailed(format!("cannot create work directory: {e}"))
            })?;

        tracing::info!(
            fetch_id = %fetch_id,
            track_id = %track.id,
            provider = self.provider.name(),
            dir = %workspace.path().display(),
            "Fetching track"
        );

        let result = self.fetch_into(track, workspace.path()).await;

        let dir = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(fetch_id = %fetch_id, dir = %dir.display(), "Failed to remove work directory: {e}");
        }

        match &result {
            Ok(file) => tracing::info!(
                fetch_id = %fetch_id,
                track_id = %track.id,
                file = %file.file_name,
                size = %format_bytes(file.data.len() as u64),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Track fetched"
            ),
            Err(e) => tracing::warn!(
                fetch_id = %fetch_id,
                track_id = %track.id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Track fetch failed"
            ),
        }

        result
    }

    async fn fetch_into(&self, track: &Track, dir: &Path) -> Result<AudioFile, FetchError> {
        let invocation = self.provider.invoke(&track.external_url, dir);
        let outcome = match tokio::time::timeout(self.timeout, invocation).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                return Err(FetchError::ProviderInvocationFailed(format!(
                    "could not run {}: {e}",
                    self.provider.name()
                )))
            }
            Err(_) => {
                return Err(FetchError::ProviderInvocationFailed(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if !outcome.success {
            let diagnostics = if outcome.diagnostics.is_empty() {
                format!("exit code {}", outcome.exit_code.unwrap_or(-1))
            } else {
                outcome.diagnostics
            };
            return Err(FetchError::ProviderInvocationFailed(diagnostics));
        }

        let path = find_audio_output(dir).await?;

        if let Some(ref tagger) = self.tagger {
            let metadata = TrackMetadata {
                title: track.title.clone(),
                artist: track.artist_line(),
            };
            tagger
                .tag(&path, &metadata)
                .await
                .map_err(|e| FetchError::PostProcessingFailed(e.to_string()))?;
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::PostProcessingFailed(format!("cannot read output: {e}")))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or_else(|| format!("{}.mp3", track.id), String::from);

        Ok(AudioFile {
            file_name,
            data,
            title: track.title.clone(),
            performer: track.artist_line(),
        })
    }
}

fn is_audio_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    !hidden && AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// Locate the audio file the provider wrote into `dir`.
async fn find_audio_output(dir: &Path) -> Result<PathBuf, FetchError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|_| FetchError::OutputNotFound)?;

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && is_audio_file(&path) {
            candidates.push(path);
        }
    }
    candidates.sort();

    if candidates.len() > 1 {
        tracing::warn!(
            count = candidates.len(),
            "Downloader produced several audio files, using the first"
        );
    }

    candidates.into_iter().next().ok_or(FetchError::OutputNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// What the fake downloader does inside its directory.
    #[derive(Clone, Copy)]
    enum Script {
        Writes,
        ExitsNonZero,
        WritesNothing,
        Hangs,
    }

    struct FakeProvider {
        script: Script,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FetchProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn invoke(&self, locator: &str, dest: &Path) -> std::io::Result<ProviderOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Writes => {
                    tokio::fs::write(dest.join("Artist - Song.mp3"), locator.as_bytes()).await?;
                    Ok(ProviderOutcome::from_output(true, Some(0), b"Downloaded", b""))
                }
                Script::ExitsNonZero => {
                    tokio::fs::write(dest.join("Artist - Song.mp3.part"), b"partial").await?;
                    Ok(ProviderOutcome::from_output(
                        false,
                        Some(1),
                        b"",
                        b"LookupError: no results found for song",
                    ))
                }
                Script::WritesNothing => {
                    tokio::fs::write(dest.join("cover.jpg"), b"jpg").await?;
                    Ok(ProviderOutcome::from_output(true, Some(0), b"", b""))
                }
                Script::Hangs => {
                    tokio::fs::write(dest.join("Artist - Song.mp3"), b"slow").await?;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(ProviderOutcome::from_output(true, Some(0), b"", b""))
                }
            }
        }
    }

    struct UppercaseTagger;

    #[async_trait]
    impl AudioTagger for UppercaseTagger {
        async fn tag(&self, path: &Path, metadata: &TrackMetadata) -> anyhow::Result<()> {
            let data = tokio::fs::read(path).await?;
            let tagged = format!("{}|{}", String::from_utf8_lossy(&data).to_uppercase(), metadata.artist);
            tokio::fs::write(path, tagged).await?;
            Ok(())
        }
    }

    struct FailingTagger;

    #[async_trait]
    impl AudioTagger for FailingTagger {
        async fn tag(&self, _path: &Path, _metadata: &TrackMetadata) -> anyhow::Result<()> {
            anyhow::bail!("ffmpeg exploded")
        }
    }

    fn track(locator: &str) -> Track {
        Track {
            id: "t1".into(),
            title: "Song".into(),
            artists: vec!["Artist".into(), "Guest".into()],
            external_url: locator.into(),
            artwork_url: None,
        }
    }

    fn fetcher(provider: Arc<dyn FetchProvider>, root: &Path) -> TrackFetcher {
        TrackFetcher::new(provider, root.to_path_buf(), Duration::from_secs(5))
    }

    fn artifacts_left(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[tokio::test]
    async fn success_returns_bytes_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher(FakeProvider::new(Script::Writes), root.path());

        let file = fetcher.fetch(&track("spotify:track:1")).await.unwrap();

        assert_eq!(file.file_name, "Artist - Song.mp3");
        assert_eq!(file.data, b"spotify:track:1");
        assert_eq!(file.title, "Song");
        assert_eq!(file.performer, "Artist, Guest");
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn non_zero_exit_surfaces_diagnostics_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher(FakeProvider::new(Script::ExitsNonZero), root.path());

        let err = fetcher.fetch(&track("x")).await.unwrap_err();

        match &err {
            FetchError::ProviderInvocationFailed(d) => assert!(d.contains("no results found")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.user_message().starts_with("Download failed:"));
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn missing_output_is_distinct_error() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher(FakeProvider::new(Script::WritesNothing), root.path());

        let err = fetcher.fetch(&track("x")).await.unwrap_err();

        assert!(matches!(err, FetchError::OutputNotFound));
        assert_eq!(err.user_message(), "Failed to find the downloaded file.");
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn timeout_counts_as_invocation_failure() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = TrackFetcher::new(
            FakeProvider::new(Script::Hangs),
            root.path().to_path_buf(),
            Duration::from_millis(50),
        );

        let err = fetcher.fetch(&track("x")).await.unwrap_err();

        match err {
            FetchError::ProviderInvocationFailed(d) => assert!(d.contains("timed out")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn tagger_output_is_returned() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher(FakeProvider::new(Script::Writes), root.path())
            .with_tagger(Arc::new(UppercaseTagger));

        let file = fetcher.fetch(&track("abc")).await.unwrap();

        assert_eq!(file.data, b"ABC|Artist, Guest");
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn tagger_failure_is_post_processing_error() {
        let root = tempfile::tempdir().unwrap();
        let fetcher = fetcher(FakeProvider::new(Script::Writes), root.path())
            .with_tagger(Arc::new(FailingTagger));

        let err = fetcher.fetch(&track("abc")).await.unwrap_err();

        assert!(matches!(err, FetchError::PostProcessingFailed(_)));
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn concurrent_fetches_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new(Script::Writes);
        let fetcher = fetcher(provider.clone(), root.path());

        let first = track("first");
        let second = track("second");
        let (a, b) = tokio::join!(fetcher.fetch(&first), fetcher.fetch(&second));

        assert_eq!(a.unwrap().data, b"first");
        assert_eq!(b.unwrap().data, b"second");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(artifacts_left(root.path()), 0);
    }

    #[tokio::test]
    async fn find_audio_output_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join(".tagging.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("b.MP3"), b"").unwrap();
        std::fs::write(dir.path().join("a.flac"), b"").unwrap();

        let found = find_audio_output(dir.path()).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "a.flac");
    }

    #[test]
    fn outcome_prefers_stderr_and_keeps_tail() {
        let outcome = ProviderOutcome::from_output(false, Some(2), b"stdout text", b"  boom  ");
        assert_eq!(outcome.diagnostics, "boom");

        let outcome = ProviderOutcome::from_output(false, Some(2), b"only stdout", b"");
        assert_eq!(outcome.diagnostics, "only stdout");

        let long = "x".repeat(MAX_DIAGNOSTIC_CHARS + 10);
        let outcome = ProviderOutcome::from_output(false, None, b"", long.as_bytes());
        assert_eq!(outcome.diagnostics.len(), MAX_DIAGNOSTIC_CHARS);
    }
}
