#![deny(unused_imports)]

//! Turns uploaded document bytes into text with page and image provenance.
//!
//! PDFs contribute their per-page text layer first, then the OCR output of
//! every embedded raster image. An image that cannot be decoded or read by OCR
//! contributes nothing and is counted in `ocr_failures`.

pub mod ocr;
pub mod pdf;

use std::sync::Arc;
use tracing::{info, warn};

use docqa_core::config::OcrSettings;
use docqa_core::types::{DocumentFormat, ExtractedContent, SegmentOrigin};
use docqa_core::{Error, OcrEngine, Result};

pub use ocr::{engine_from_settings, DisabledOcr, TesseractOcr};
use pdf::RasterImage;

pub struct ContentExtractor {
    ocr: Arc<dyn OcrEngine>,
    min_image_side: u32,
}

impl ContentExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, min_image_side: u32) -> Self {
        Self { ocr, min_image_side }
    }

    pub fn from_settings(settings: &OcrSettings) -> Self {
        Self::new(engine_from_settings(settings), settings.min_image_side)
    }

    /// Extract text from `bytes`. `source_name` only labels errors and logs.
    ///
    /// Blocking: OCR shells out per image. Async callers should use
    /// `spawn_blocking`.
    pub fn extract(&self, bytes: &[u8], format: DocumentFormat, source_name: &str) -> Result<ExtractedContent> {
        let content = match format {
            DocumentFormat::Pdf => self.extract_pdf(bytes, source_name)?,
            DocumentFormat::Text => extract_plain(bytes),
        };
        info!(
            source = source_name,
            chars = content.text.chars().count(),
            pages = content.page_count,
            images = content.image_count,
            ocr_failures = content.ocr_failures,
            "extracted content"
        );
        Ok(content)
    }

    fn extract_pdf(&self, bytes: &[u8], source_name: &str) -> Result<ExtractedContent> {
        let doc = pdf::load(bytes).map_err(|e| Error::extraction(source_name, e))?;
        if doc.get_pages().is_empty() {
            return Err(Error::extraction(source_name, "document has no pages"));
        }
        let mut content = ExtractedContent::default();

        let pages = pdf::page_texts(&doc, bytes);
        content.page_count = u32::try_from(pages.len()).unwrap_or(u32::MAX);
        for (i, page) in pages.iter().enumerate() {
            let page = page.trim();
            if !page.is_empty() {
                content.push_segment(SegmentOrigin::Page(ordinal(i)), page);
            }
        }

        let images = pdf::raster_images(&doc, self.min_image_side);
        content.image_count = u32::try_from(images.len()).unwrap_or(u32::MAX);
        for (i, image) in images.into_iter().enumerate() {
            let n = ordinal(i);
            let text = match image {
                RasterImage::Encoded(data) => match self.ocr.recognize(&data) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(source = source_name, image = n, error = %e, "OCR failed, continuing without image text");
                        content.ocr_failures += 1;
                        continue;
                    }
                },
                RasterImage::Unreadable(reason) => {
                    warn!(source = source_name, image = n, reason = %reason, "unreadable image skipped");
                    content.ocr_failures += 1;
                    continue;
                }
            };
            let text = text.trim();
            if !text.is_empty() {
                content.push_segment(SegmentOrigin::Image(n), text);
            }
        }
        Ok(content)
    }
}

fn ordinal(i: usize) -> u32 {
    u32::try_from(i + 1).unwrap_or(u32::MAX)
}

/// UTF-8 with lossy fallback, as a single page.
fn extract_plain(bytes: &[u8]) -> ExtractedContent {
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    };
    let mut content = ExtractedContent { page_count: 1, ..Default::default() };
    if !text.trim().is_empty() {
        content.push_segment(SegmentOrigin::Page(1), &text);
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_one_page() {
        let c = extract_plain(b"hello\nworld");
        assert_eq!(c.text, "hello\nworld");
        assert_eq!(c.segments.len(), 1);
        assert_eq!(c.page_count, 1);
    }

    #[test]
    fn invalid_utf8_decodes_lossy() {
        let c = extract_plain(&[b'a', 0xff, b'b']);
        assert_eq!(c.text, "a\u{fffd}b");
    }

    #[test]
    fn blank_text_has_no_segments() {
        let c = extract_plain(b"  \n\t");
        assert!(c.text.is_empty());
        assert!(c.segments.is_empty());
    }
}
