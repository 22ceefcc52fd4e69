//! OCR collaborator.
//!
//! Text recognition is external. The orchestrator only needs something that
//! turns image bytes into text; [`TesseractOcr`] shells out to the
//! `tesseract` binary with Vietnamese and English models.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Errors from an OCR engine.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to run OCR engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OCR engine exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("OCR engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one image into text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Runs `tesseract stdin stdout -l <languages>`.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: String,
    languages: String,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            languages: "vie+eng".to_string(),
        }
    }
}

impl TesseractOcr {
    pub fn new(program: impl Into<String>, languages: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            languages: languages.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["stdin", "stdout", "-l", &self.languages])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let mut child = self.command().spawn().map_err(|source| OcrError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Write and read concurrently so a full stdout pipe cannot stall us.
        let mut stdin = child.stdin.take();
        let input = image.to_vec();
        let writer = tokio::spawn(async move {
            if let Some(stdin) = stdin.as_mut() {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<_, io::Error>(())
        });

        let output = child.wait_with_output().await?;
        let written = writer.await.unwrap_or_else(|e| Err(io::Error::other(e)));

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        check_written(written)?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(bytes = image.len(), chars = text.chars().count(), "ocr finished");
        Ok(text)
    }
}

/// A closed pipe only means tesseract stopped reading early; any other write
/// failure leaves its output untrustworthy.
fn check_written(written: io::Result<()>) -> Result<(), OcrError> {
    match written {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(OcrError::Io(e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_languages() {
        let ocr = TesseractOcr::default();
        let cmd = ocr.command();
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["stdin", "stdout", "-l", "vie+eng"]);
        assert_eq!(cmd.as_std().get_program(), "tesseract");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let ocr = TesseractOcr::new("histnote-no-such-ocr-binary", "vie");
        let err = ocr.recognize(b"\x89PNG").await.unwrap_err();
        assert!(matches!(err, OcrError::Spawn { .. }));
        assert!(err.to_string().contains("histnote-no-such-ocr-binary"));
    }

    #[test]
    fn test_stdin_write_failures() {
        assert!(check_written(Ok(())).is_ok());
        assert!(check_written(Err(io::Error::from(io::ErrorKind::BrokenPipe))).is_ok());

        let err = check_written(Err(io::Error::new(io::ErrorKind::Interrupted, "cut short")))
            .unwrap_err();
        assert!(matches!(err, OcrError::Io(ref e) if e.kind() == io::ErrorKind::Interrupted));
        assert!(err.to_string().contains("cut short"));
    }
}
