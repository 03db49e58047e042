use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::error::ServiceError;

use super::Transcriber;

/// Local speech recognition through the `whisper` command line tool
pub struct WhisperTranscriber {
    program: String,
    model: String,
    scratch_dir: PathBuf,
}

impl WhisperTranscriber {
    pub fn new(program: &str, model: &str, scratch_dir: PathBuf) -> Self {
        Self {
            program: program.to_string(),
            model: model.to_string(),
            scratch_dir,
        }
    }

    /// Arguments for one transcription run
    fn args(&self, audio: &Path, out_dir: &Path) -> Vec<std::ffi::OsString> {
        vec![
            audio.into(),
            "--model".into(),
            self.model.as_str().into(),
            "--output_format".into(),
            "txt".into(),
            "--output_dir".into(),
            out_dir.into(),
            "--fp16".into(),
            "False".into(),
            "--verbose".into(),
            "False".into(),
        ]
    }

    async fn run(&self, audio: &Path, out_dir: &Path) -> Result<String, ServiceError> {
        // Whisper is CPU heavy; as a child process it never blocks the runtime
        let output = Command::new(&self.program)
            .args(self.args(audio, out_dir))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ServiceError::BinaryNotFound(self.program.clone()),
                _ => ServiceError::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(stderr = %stderr, "whisper failed");
            return Err(ServiceError::ProcessFailed {
                program: self.program.clone(),
                status: output.status,
                stderr,
            });
        }

        let stem = audio
            .file_stem()
            .ok_or_else(|| ServiceError::UnexpectedResponse("input has no file name".into()))?;
        let transcript_path = out_dir.join(format!("{}.txt", stem.to_string_lossy()));
        let text = tokio::fs::read_to_string(&transcript_path).await?;

        Ok(clean_transcript(&text))
    }
}

/// Collapse whisper's line-per-segment output into one line of text
pub fn clean_transcript(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self))]
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError> {
        let out_dir = self
            .scratch_dir
            .join(format!("whisper_{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&out_dir).await?;

        let result = self.run(audio, &out_dir).await;
        let _ = tokio::fs::remove_dir_all(&out_dir).await;

        let text = result?;
        debug!(chars = text.len(), "Transcription complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clean_transcript_joins_segments() {
        assert_eq!(
            clean_transcript(" I walk alone\n tonight \n"),
            "I walk alone tonight"
        );
        assert_eq!(clean_transcript("\n\n"), "");
    }

    #[test]
    fn test_args_point_at_scratch_dir() {
        let whisper = WhisperTranscriber::new("whisper", "base", PathBuf::from("/tmp"));
        let args = whisper.args(Path::new("in.webm"), Path::new("/tmp/w1"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args[0], "in.webm");
        assert!(args.windows(2).any(|w| w[0] == "--model" && w[1] == "base"));
        assert!(args.windows(2).any(|w| w[0] == "--output_dir" && w[1] == "/tmp/w1"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let dir = tempdir().unwrap();
        let whisper = WhisperTranscriber::new(
            "memomuse-no-such-whisper-binary",
            "base",
            dir.path().to_path_buf(),
        );

        let err = whisper.transcribe(Path::new("memo.webm")).await.unwrap_err();
        assert!(matches!(err, ServiceError::BinaryNotFound(_)));

        // Scratch directory is cleaned up even on failure
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
