//! Text chunking module
//!
//! Splits reference documents into overlapping windows for embedding.
//! Windows snap back to the nearest sentence or line boundary when one
//! falls in the second half of the window; fragments shorter than the
//! minimum are discarded.

use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
    /// Chunks shorter than this are discarded
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 50,
        }
    }
}

/// A text chunk with its position in the document
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Index of this chunk in the document
    pub index: i32,
    /// Start character position in the original text
    pub start_pos: usize,
    /// End character position in the original text
    pub end_pos: usize,
}

/// Split text into overlapping chunks
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let total_len = chars.len();

    if total_len == 0 {
        return chunks;
    }

    let mut start = 0;
    let mut index = 0;

    while start < total_len {
        let end = (start + config.chunk_size).min(total_len);
        let window: String = chars[start..end].iter().collect();

        // Snap to a sentence/line boundary only when one lies past the
        // midpoint of the window; the final window is taken whole.
        let chunk_content = if end < total_len {
            snap_to_boundary(&window)
        } else {
            window
        };

        if chunk_content.chars().count() >= config.min_chunk_size {
            chunks.push(TextChunk {
                content: chunk_content.clone(),
                index,
                start_pos: start,
                end_pos: start + chunk_content.chars().count(),
            });
            index += 1;
        }

        let advance = if config.chunk_overlap < config.chunk_size {
            config.chunk_size - config.chunk_overlap
        } else {
            config.chunk_size / 2
        };

        start += advance.max(1);
    }

    debug!(
        input_len = total_len,
        chunk_count = chunks.len(),
        chunk_size = config.chunk_size,
        "Text chunked"
    );

    chunks
}

/// Cut a window back to the last sentence or line boundary, provided
/// that boundary lies past 50% of the window.
fn snap_to_boundary(window: &str) -> String {
    let boundaries = [". ", "! ", "? ", ".\n", "!\n", "?\n", "\n"];

    let midpoint = window.len() / 2;
    let mut best_end = 0;

    for boundary in boundaries.iter() {
        if let Some(pos) = window.rfind(boundary) {
            let candidate = pos + boundary.len();
            if candidate > midpoint && candidate > best_end {
                best_end = candidate;
            }
        }
    }

    if best_end > 0 {
        window[..best_end].to_string()
    } else {
        window.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_chunking() {
        let text = "This is a sentence about backend work. ".repeat(100);
        let config = ChunkingConfig::default();

        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);

        for chunk in &chunks {
            assert!(chunk.content.chars().count() >= config.min_chunk_size);
            assert!(chunk.content.chars().count() <= config.chunk_size);
        }
    }

    #[test]
    fn test_windows_overlap() {
        let text = "abcdefghij".repeat(50);
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 20,
            min_chunk_size: 10,
        };

        let chunks = chunk_text(&text, &config);
        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_pos, pair[0].start_pos + 80);
        }
    }

    #[test]
    fn test_snaps_to_sentence_boundary_past_midpoint() {
        // Boundary at 70% of the window: the chunk ends there.
        let mut text = "x".repeat(69);
        text.push_str(". ");
        text.push_str(&"y".repeat(60));
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 0,
            min_chunk_size: 10,
        };

        let chunks = chunk_text(&text, &config);
        assert!(chunks[0].content.ends_with(". "));
        assert_eq!(chunks[0].content.chars().count(), 71);
    }

    #[test]
    fn test_ignores_boundary_before_midpoint() {
        // Only boundary sits at 20%: the full window is kept.
        let mut text = "x".repeat(19);
        text.push_str(". ");
        text.push_str(&"y".repeat(200));
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 0,
            min_chunk_size: 10,
        };

        let chunks = chunk_text(&text, &config);
        assert_eq!(chunks[0].content.chars().count(), 100);
    }

    #[test]
    fn test_short_fragments_discarded() {
        let chunks = chunk_text("too short", &ChunkingConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_indexes_are_sequential() {
        let text = "A sentence that repeats for testing purposes. ".repeat(60);
        let chunks = chunk_text(&text, &ChunkingConfig::default());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i32);
        }
    }
}
