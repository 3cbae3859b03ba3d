//! Tesseract OCR back-end.
//!
//! Runs the `tesseract` binary as a child process per call, streaming a PNG
//! on stdin and reading text from stdout. The binary path and tessdata
//! directory are construction parameters; they are handed to the child
//! process only and never written into this process's environment.

use crate::backend::{ModelError, TextRecognizer};
use image::{GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("tesseract binary not usable at {path}: {source}")]
    BinaryNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to run tesseract: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode OCR input: {0}")]
    Encode(#[from] image::ImageError),
    #[error("tesseract exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

/// Tesseract invocation settings.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: PathBuf,
    tessdata_dir: Option<PathBuf>,
    language: String,
}

impl TesseractOcr {
    /// Locate the binary and confirm it runs (`tesseract --version`).
    pub fn locate(
        binary: &Path,
        tessdata_dir: Option<&Path>,
        language: &str,
    ) -> Result<Self, OcrError> {
        let output = Command::new(binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| OcrError::BinaryNotFound {
                path: binary.display().to_string(),
                source,
            })?;

        // Older releases print the version on stderr.
        let banner = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
        let version = String::from_utf8_lossy(banner)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        tracing::info!(
            path = %binary.display(),
            version = %version,
            language,
            "tesseract located"
        );

        Ok(Self {
            binary: binary.to_path_buf(),
            tessdata_dir: tessdata_dir.map(Path::to_path_buf),
            language: language.to_string(),
        })
    }

    /// Recognize text in an image; returns the raw OCR output.
    pub fn read_text(&self, image: &GrayImage) -> Result<String, OcrError> {
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;

        let mut command = Command::new(&self.binary);
        command
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.tessdata_dir {
            command.env("TESSDATA_PREFIX", dir);
        }

        let mut child = command.spawn()?;
        // stdin is dropped before waiting so tesseract sees EOF. The child is
        // reaped even when the write fails, which happens when it exits early.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(png.get_ref()),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        written?;

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(chars = text.len(), "tesseract output");
        Ok(text)
    }
}

impl TextRecognizer for TesseractOcr {
    fn recognize(&self, image: &GrayImage) -> Result<String, ModelError> {
        Ok(self.read_text(image)?)
    }
}
