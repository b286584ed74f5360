//! Domain types shared by the extraction, index and answer layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use crate::error::Error;

/// Source format derived from an uploaded filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Derive the format from the filename extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, Error> {
        let ext = std::path::Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt" | "md" | "text") => Ok(Self::Text),
            Some(other) => Err(Error::extraction(filename, format!("unsupported format '.{other}'"))),
            None => Err(Error::extraction(filename, "unsupported format (no file extension)")),
        }
    }
}

/// Where a stretch of extracted text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "number")]
pub enum SegmentOrigin {
    /// Text layer of a page (1-based).
    Page(u32),
    /// OCR output of an embedded image (1-based ordinal).
    Image(u32),
}

/// A char range of `ExtractedContent::text` with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub chars: Range<usize>,
    pub origin: SegmentOrigin,
}

/// Output of content extraction: the full text plus provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub text: String,
    pub segments: Vec<Segment>,
    pub page_count: u32,
    pub image_count: u32,
    pub ocr_failures: u32,
}

impl ExtractedContent {
    /// Append a segment, inserting a single `\n` marker between segments.
    pub fn push_segment(&mut self, origin: SegmentOrigin, text: &str) {
        if !self.segments.is_empty() {
            self.text.push('\n');
        }
        let start = self.text.chars().count();
        self.text.push_str(text);
        let end = start + text.chars().count();
        self.segments.push(Segment { chars: start..end, origin });
    }

    /// Origin of the segment that contains char offset `pos`.
    ///
    /// A position on a boundary marker belongs to the following segment.
    pub fn origin_at(&self, pos: usize) -> Option<SegmentOrigin> {
        self.segments
            .iter()
            .find(|s| pos < s.chars.end || (s.chars.is_empty() && pos == s.chars.start))
            .or_else(|| self.segments.last())
            .map(|s| s.origin)
    }
}

/// Whether a chunk's text came from a page text layer or from OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkOrigin {
    Text,
    Image,
}

impl ChunkOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "image" { Self::Image } else { Self::Text }
    }
}

/// A retrievable slice of a document.
///
/// - `index`: 0-based position in the document's chunk sequence
/// - `start`: char offset of the first char in the extracted text
/// - `page`: page of the segment holding `start`; `None` for OCR text
/// - `source`: the source label (uploaded filename)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub page: Option<u32>,
    pub origin: ChunkOrigin,
    pub source: String,
}

/// A chunk returned by similarity search. Higher `score` is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

pub type RetrievalResult = Vec<RetrievedChunk>;

/// Coarse classification of a question used to pick a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    Table,
    Chart,
    Numerical,
    General,
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Table => "table",
            Self::Chart => "chart",
            Self::Numerical => "numerical",
            Self::General => "general",
        };
        f.write_str(s)
    }
}

/// A reference to a chunk that backed an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub text: String,
    pub page: Option<u32>,
    pub source_label: String,
    pub origin: ChunkOrigin,
}

impl From<&RetrievedChunk> for SourceRef {
    fn from(r: &RetrievedChunk) -> Self {
        Self {
            text: r.chunk.text.clone(),
            page: r.chunk.page,
            source_label: r.chunk.source.clone(),
            origin: r.chunk.origin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub intent: QueryIntent,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub index_path: PathBuf,
    pub chunk_count: usize,
    pub page_count: u32,
    pub image_count: u32,
    pub ocr_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a best-effort cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub document_id: String,
    pub removed: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<ArtifactFailure>,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Check that a caller-supplied document id can be used as a single path component.
///
/// Leading dots are refused: dot-prefixed names under the index root belong to
/// in-progress builds.
pub fn validate_document_id(id: &str) -> Result<(), Error> {
    let bad = id.is_empty() || id.starts_with('.') || id.contains(['/', '\\', '\0']);
    if bad {
        return Err(Error::InvalidDocumentId(id.to_string()));
    }
    Ok(())
}
