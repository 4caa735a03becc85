//! spotDL downloader provider.

use super::{FetchProvider, ProviderOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tunebot_common::config::FetchConfig;

/// Runs `spotdl download <url>` inside the fetch directory.
pub struct SpotdlProvider {
    program: String,
    format: String,
    output_template: String,
}

impl SpotdlProvider {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            program: config.program.clone(),
            format: config.format.clone(),
            output_template: config.output_template.clone(),
        }
    }

    fn build_args(&self, locator: &str, dest: &Path) -> Vec<String> {
        vec![
            "download".to_string(),
            locator.to_string(),
            "--format".to_string(),
            self.format.clone(),
            "--output".to_string(),
            dest.join(&self.output_template).to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl FetchProvider for SpotdlProvider {
    fn name(&self) -> &'static str {
        "spotdl"
    }

    async fn invoke(&self, locator: &str, dest: &Path) -> std::io::Result<ProviderOutcome> {
        let args = self.build_args(locator, dest);

        tracing::debug!(
            program = %self.program,
            args = ?args,
            "Running downloader"
        );

        // kill_on_drop reaps the child when the fetch timeout drops this future
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(dest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(ProviderOutcome::from_output(
            output.status.success(),
            output.status.code(),
            &output.stdout,
            &output.stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_follow_spotdl_cli() {
        let provider = SpotdlProvider::new(&FetchConfig::default());
        let args = provider.build_args(
            "https://open.spotify.com/track/abc",
            Path::new("/tmp/fetch-1"),
        );

        assert_eq!(args[0], "download");
        assert_eq!(args[1], "https://open.spotify.com/track/abc");
        assert_eq!(&args[2..4], &["--format".to_string(), "mp3".to_string()]);
        assert_eq!(args[4], "--output");
        assert_eq!(args[5], "/tmp/fetch-1/{artists} - {title}.{output-ext}");
    }

    #[tokio::test]
    async fn missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SpotdlProvider::new(&FetchConfig {
            program: "/nonexistent/spotdl-tunebot-test".into(),
            ..FetchConfig::default()
        });

        let err = provider.invoke("spotify:track:1", dir.path()).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
