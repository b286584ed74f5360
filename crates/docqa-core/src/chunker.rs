//! Overlapping character-window splitter.
//!
//! Each chunk ends at the best natural boundary inside its window, falling back
//! to a hard cut; the next chunk restarts exactly `overlap` chars earlier. All
//! offsets are in chars, never bytes.
use std::ops::Range;

use crate::config::ChunkingSettings;
use crate::types::{Chunk, ChunkOrigin, ExtractedContent, SegmentOrigin};

/// Boundaries tried in priority order. The separator stays with the left chunk.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "? ", "! ", " "];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 200 }
    }
}

impl From<&ChunkingSettings> for TextSplitter {
    fn from(s: &ChunkingSettings) -> Self {
        Self::new(s.chunk_size, s.overlap)
    }
}

impl TextSplitter {
    /// `overlap` is clamped below `chunk_size` and `chunk_size` to at least 1;
    /// `Settings::validate` rejects such configurations earlier.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, overlap: overlap.min(chunk_size - 1) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Char ranges of every chunk. Calling again restarts from the beginning.
    pub fn spans(&self, text: &str) -> Spans {
        Spans { chars: text.chars().collect(), size: self.chunk_size, overlap: self.overlap, next_start: Some(0) }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let offsets = byte_offsets(text);
        self.spans(text).map(|r| text[offsets[r.start]..offsets[r.end]].to_string()).collect()
    }

    /// Split extracted content into annotated chunks labelled with `source`.
    pub fn split_content(&self, content: &ExtractedContent, source: &str) -> Vec<Chunk> {
        let text = content.text.as_str();
        let offsets = byte_offsets(text);
        self.spans(text)
            .enumerate()
            .map(|(index, r)| {
                let (page, origin) = match content.origin_at(r.start) {
                    Some(SegmentOrigin::Page(p)) => (Some(p), ChunkOrigin::Text),
                    Some(SegmentOrigin::Image(_)) => (None, ChunkOrigin::Image),
                    None => (None, ChunkOrigin::Text),
                };
                Chunk {
                    index,
                    text: text[offsets[r.start]..offsets[r.end]].to_string(),
                    start: r.start,
                    page,
                    origin,
                    source: source.to_string(),
                }
            })
            .collect()
    }
}

/// Iterator over chunk char ranges produced by [`TextSplitter::spans`].
#[derive(Debug, Clone)]
pub struct Spans {
    chars: Vec<char>,
    size: usize,
    overlap: usize,
    next_start: Option<usize>,
}

impl Spans {
    fn cut_point(&self, start: usize) -> usize {
        let window_end = start + self.size;
        let min_len = (self.overlap + 1).max(self.size / 2);
        for sep in SEPARATORS {
            if let Some(cut) = self.last_boundary(sep, start, window_end) {
                if cut - start >= min_len {
                    return cut;
                }
            }
        }
        window_end
    }

    /// End position (exclusive, separator included) of the last `sep` fully
    /// inside `start..window_end`.
    fn last_boundary(&self, sep: &str, start: usize, window_end: usize) -> Option<usize> {
        let sep: Vec<char> = sep.chars().collect();
        let window = &self.chars[start..window_end];
        window.windows(sep.len()).rposition(|w| w == sep.as_slice()).map(|i| start + i + sep.len())
    }
}

impl Iterator for Spans {
    type Item = Range<usize>;

    fn next(&mut self) -> Option<Range<usize>> {
        let start = self.next_start?;
        let len = self.chars.len();
        if start >= len {
            self.next_start = None;
            return None;
        }
        if len - start <= self.size {
            self.next_start = None;
            return Some(start..len);
        }
        let cut = self.cut_point(start);
        self.next_start = Some(cut - self.overlap);
        Some(start..cut)
    }
}

/// Byte offset of every char index, plus `text.len()` for the end position.
fn byte_offsets(text: &str) -> Vec<usize> {
    text.char_indices().map(|(b, _)| b).chain(std::iter::once(text.len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_boundary_prefers_rightmost() {
        let s = TextSplitter::new(10, 2).spans("a b c d e f g h");
        assert_eq!(s.last_boundary(" ", 0, 10), Some(10));
        assert_eq!(s.last_boundary("\n", 0, 10), None);
    }

    #[test]
    fn new_clamps_overlap() {
        let s = TextSplitter::new(5, 9);
        assert_eq!(s.overlap(), 4);
    }
}
