//! OCR engines for embedded images.
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

use docqa_core::config::OcrSettings;
use docqa_core::OcrEngine;

/// Runs the `tesseract` CLI with the image piped on stdin.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    cmd: String,
    lang: String,
}

impl TesseractOcr {
    pub fn new(cmd: impl Into<String>, lang: impl Into<String>) -> Self {
        Self { cmd: cmd.into(), lang: lang.into() }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.cmd)
            .args(["stdin", "stdout", "-l", &self.lang])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start '{}'", self.cmd))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).context("failed to pipe image to tesseract")?;
        }
        let output = child.wait_with_output().context("tesseract did not finish")?;
        if !output.status.success() {
            bail!("tesseract exited with {}: {}", output.status, String::from_utf8_lossy(&output.stderr).trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Recognizes nothing. Used when OCR is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn recognize(&self, _image: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

pub fn engine_from_settings(settings: &OcrSettings) -> Arc<dyn OcrEngine> {
    if settings.enabled {
        Arc::new(TesseractOcr::new(&settings.tesseract_cmd, &settings.lang))
    } else {
        Arc::new(DisabledOcr)
    }
}
