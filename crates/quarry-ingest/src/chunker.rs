//! Heading-aware document chunker.
//!
//! Blocks are packed greedily into chunks bounded by a token budget. A
//! heading starts a new chunk whenever the current one already holds body
//! content, so chunks stay aligned with the document's sections; inside a
//! long section the budget alone drives the cuts. Consecutive chunks share
//! a configurable token overlap taken from the previous chunk's tail.
//!
//! Given identical input and settings the output is bit-identical, chunk
//! ids included.

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::blocks::{self, Block, BlockKind};
use quarry_core::{Error, RagConfig, Result};
use quarry_store::ChunkMetadata;

/// Input format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Markdown,
    JsonBlocks,
}

/// A chunk ready for embedding: everything but the vector.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub id: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub text: String,
    pub token_estimate: u32,
    pub metadata: ChunkMetadata,
}

pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
    max_chunk_bytes: usize,
}

/// A packable span no larger than the chunk budget.
struct Unit {
    text: String,
    tokens: usize,
    /// Separator preceding this unit when joined mid-chunk.
    sep: &'static str,
    heading: Option<String>,
    section_path: Vec<String>,
    page: Option<u32>,
    /// True for the unit carrying a heading line.
    heading_start: bool,
}

/// A unit placed into the chunk under construction.
struct Piece {
    text: String,
    sep: &'static str,
    heading: Option<String>,
    section_path: Vec<String>,
    page: Option<u32>,
    /// Carried over from the previous chunk's tail.
    overlap: bool,
}

#[derive(Default)]
struct Draft {
    pieces: Vec<Piece>,
    tokens: usize,
    /// Whether the chunk was opened by a heading boundary.
    heading_initiated: bool,
}

impl Draft {
    fn has_body(&self) -> bool {
        self.pieces.iter().any(|p| !p.overlap)
    }

    fn join(&self) -> String {
        let mut text = String::new();
        for (i, piece) in self.pieces.iter().enumerate() {
            if i > 0 {
                text.push_str(piece.sep);
            }
            text.push_str(&piece.text);
        }
        text
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
            max_chunk_bytes: chunk_size * 8,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    /// Split a document into ordered chunks with metadata.
    pub fn chunk(
        &self,
        doc_id: &str,
        text: &str,
        kind: DocumentKind,
    ) -> Result<Vec<DocumentChunk>> {
        let blocks = match kind {
            DocumentKind::Markdown => blocks::scan_markdown(text),
            DocumentKind::JsonBlocks => blocks::parse_json_blocks(text)?,
        };

        let units = self.units(&blocks);
        if units.iter().map(|u| u.tokens).sum::<usize>() == 0 {
            return Err(Error::EmptyDocument);
        }

        let drafts = self.pack(units);
        Ok(self.finalize(doc_id, drafts))
    }

    // -----------------------------------------------------------
    // Unit construction
    // -----------------------------------------------------------

    /// Break blocks into units no larger than the chunk budget: oversized
    /// blocks split at sentence boundaries, oversized sentences at
    /// whitespace, and anything still exceeding the byte ceiling is
    /// truncated.
    fn units(&self, blocks: &[Block]) -> Vec<Unit> {
        // Leave room for the overlap seed so a seeded chunk still fits the
        // budget after its first body unit.
        let budget = self
            .chunk_size
            .saturating_sub(self.chunk_overlap)
            .max(self.chunk_size / 2)
            .max(1);

        let mut units = Vec::new();
        for block in blocks {
            let tokens = token_estimate(&block.text);
            let parts: Vec<String> = if tokens <= budget {
                vec![block.text.clone()]
            } else {
                split_sentence_groups(&block.text, budget)
            };

            for (i, part) in parts.into_iter().enumerate() {
                let part = self.cap_bytes(part);
                let tokens = token_estimate(&part);
                if tokens == 0 {
                    continue;
                }
                units.push(Unit {
                    tokens,
                    sep: if i == 0 { "\n\n" } else { " " },
                    heading: block.heading.clone(),
                    section_path: block.section_path.clone(),
                    page: block.page_number,
                    heading_start: i == 0 && block.kind == BlockKind::Heading,
                    text: part,
                });
            }
        }
        units
    }

    fn cap_bytes(&self, text: String) -> String {
        if text.len() <= self.max_chunk_bytes {
            return text;
        }
        let mut end = self.max_chunk_bytes;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        warn!(
            "truncating unbreakable span from {} to {} bytes",
            text.len(),
            end
        );
        text[..end].to_string()
    }

    // -----------------------------------------------------------
    // Packing
    // -----------------------------------------------------------

    fn pack(&self, units: Vec<Unit>) -> Vec<Draft> {
        let mut drafts: Vec<Draft> = Vec::new();
        let mut cur = Draft::default();

        for unit in units {
            let must_flush = cur.has_body()
                && (unit.heading_start || cur.tokens + unit.tokens > self.chunk_size);
            if must_flush {
                self.flush(&mut cur, &mut drafts);
            }

            if !cur.has_body() && unit.heading_start {
                cur.heading_initiated = true;
            }
            cur.tokens += unit.tokens;
            cur.pieces.push(Piece {
                text: unit.text,
                sep: unit.sep,
                heading: unit.heading,
                section_path: unit.section_path,
                page: unit.page,
                overlap: false,
            });
        }

        if cur.has_body() {
            let small = cur.tokens < self.min_chunk_size;
            if small && !cur.heading_initiated && !drafts.is_empty() {
                // Fold a trailing fragment of the same section into the
                // previous chunk instead of emitting a dwarf chunk. Overlap
                // pieces are already present there.
                let last = drafts.last_mut().unwrap();
                for piece in cur.pieces.into_iter().filter(|p| !p.overlap) {
                    last.tokens += token_estimate(&piece.text);
                    last.pieces.push(piece);
                }
            } else {
                drafts.push(cur);
            }
        }

        drafts
    }

    /// Emit the current draft and seed the next one with the overlap tail.
    fn flush(&self, cur: &mut Draft, drafts: &mut Vec<Draft>) {
        let finished = std::mem::take(cur);
        let seed = self.overlap_seed(&finished);
        drafts.push(finished);
        if let Some(piece) = seed {
            cur.tokens = token_estimate(&piece.text);
            cur.pieces.push(piece);
        }
    }

    /// Trailing `chunk_overlap` tokens of the finished chunk, snapped to a
    /// sentence start when one falls inside the tail. Carries the tail's
    /// heading context, not the next chunk's.
    fn overlap_seed(&self, finished: &Draft) -> Option<Piece> {
        if self.chunk_overlap == 0 {
            return None;
        }
        let text = finished.join();
        let tail = overlap_tail(&text, self.chunk_overlap)?;
        let last = finished.pieces.last()?;
        Some(Piece {
            text: tail,
            sep: "\n\n",
            heading: last.heading.clone(),
            section_path: last.section_path.clone(),
            page: last.page,
            overlap: true,
        })
    }

    // -----------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------

    fn finalize(&self, doc_id: &str, drafts: Vec<Draft>) -> Vec<DocumentChunk> {
        let total = drafts.len() as u32;
        drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                let text = draft.join();
                let first = &draft.pieces[0];
                let metadata = ChunkMetadata {
                    heading: first.heading.clone(),
                    section_path: first.section_path.clone(),
                    page_number: draft.pieces.iter().find_map(|p| p.page),
                    total_chunks: total,
                };
                let token_estimate = token_estimate(&text) as u32;
                let id = chunk_id(doc_id, index as u32, &text);
                DocumentChunk {
                    id,
                    doc_id: doc_id.to_string(),
                    chunk_index: index as u32,
                    text,
                    token_estimate,
                    metadata,
                }
            })
            .collect()
    }
}

/// Deterministic chunk id from document, position and content.
pub fn chunk_id(doc_id: &str, chunk_index: u32, text: &str) -> String {
    let content_hash = hex::encode(Sha256::digest(text.as_bytes()));
    format!("{}:{}:{}", doc_id, chunk_index, &content_hash[..12])
}

/// Token count approximation: a maximal alphanumeric run counts one, every
/// other non-whitespace character counts one.
pub fn token_estimate(text: &str) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            in_word = false;
        } else if ch.is_alphanumeric() {
            if !in_word {
                count += 1;
                in_word = true;
            }
        } else {
            count += 1;
            in_word = false;
        }
    }
    count
}

/// Byte offsets where tokens begin.
fn token_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_word = false;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            in_word = false;
        } else if ch.is_alphanumeric() {
            if !in_word {
                starts.push(i);
                in_word = true;
            }
        } else {
            starts.push(i);
            in_word = false;
        }
    }
    starts
}

/// Byte offsets where sentences begin (terminal punctuation followed by
/// whitespace, then the next non-whitespace character). Offset 0 is not
/// included.
fn sentence_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    // 0 = scanning, 1 = saw terminal punctuation, 2 = terminal then space.
    let mut state = 0u8;
    for (i, ch) in text.char_indices() {
        match state {
            1 if ch.is_whitespace() => state = 2,
            2 if !ch.is_whitespace() => {
                starts.push(i);
                state = 0;
            }
            _ => {}
        }
        if matches!(ch, '.' | '!' | '?') {
            state = 1;
        } else if !ch.is_whitespace() && state == 1 {
            state = 0;
        }
    }
    starts
}

/// Split text into sentence groups each within `max_tokens`; a single
/// sentence over the budget is split at whitespace.
fn split_sentence_groups(text: &str, max_tokens: usize) -> Vec<String> {
    let mut bounds = vec![0];
    bounds.extend(sentence_starts(text));
    bounds.push(text.len());

    let mut sentences = Vec::new();
    for pair in bounds.windows(2) {
        let sentence = text[pair[0]..pair[1]].trim();
        if sentence.is_empty() {
            continue;
        }
        if token_estimate(sentence) > max_tokens {
            sentences.extend(split_word_groups(sentence, max_tokens));
        } else {
            sentences.push(sentence.to_string());
        }
    }

    let mut groups = Vec::new();
    let mut cur = String::new();
    let mut cur_tokens = 0;
    for sentence in sentences {
        let tokens = token_estimate(&sentence);
        if cur_tokens + tokens > max_tokens && !cur.is_empty() {
            groups.push(std::mem::take(&mut cur));
            cur_tokens = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(&sentence);
        cur_tokens += tokens;
    }
    if !cur.is_empty() {
        groups.push(cur);
    }
    groups
}

fn split_word_groups(text: &str, max_tokens: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut cur = String::new();
    let mut cur_tokens = 0;
    for word in text.split_whitespace() {
        let tokens = token_estimate(word).max(1);
        if cur_tokens + tokens > max_tokens && !cur.is_empty() {
            groups.push(std::mem::take(&mut cur));
            cur_tokens = 0;
        }
        if !cur.is_empty() {
            cur.push(' ');
        }
        cur.push_str(word);
        cur_tokens += tokens;
    }
    if !cur.is_empty() {
        groups.push(cur);
    }
    groups
}

/// The trailing `overlap_tokens` of `text`, snapped to the nearest sentence
/// start inside the tail when one exists.
fn overlap_tail(text: &str, overlap_tokens: usize) -> Option<String> {
    let starts = token_starts(text);
    if starts.is_empty() {
        return None;
    }
    let candidate = if starts.len() <= overlap_tokens {
        0
    } else {
        starts[starts.len() - overlap_tokens]
    };

    let window = text.len() - candidate;
    let snapped = sentence_starts(text)
        .into_iter()
        .filter(|&s| s.abs_diff(candidate) <= window)
        .min_by_key(|&s| s.abs_diff(candidate))
        .unwrap_or(candidate);

    let tail = text[snapped..].trim();
    if tail.is_empty() {
        None
    } else {
        Some(tail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SECTIONS: &str =
        "# Intro\nRAG combines retrieval with generation.\n\n# Details\nIt reduces hallucinations.";

    fn long_section(sentences: usize) -> String {
        let mut text = String::from("# Guide\n\n");
        for i in 0..sentences {
            text.push_str(&format!(
                "Sentence number {} talks about indexing pipelines and retrieval quality. ",
                i
            ));
        }
        text
    }

    #[test]
    fn identical_runs_are_bit_identical() {
        let chunker = Chunker::new(200, 40, 50);
        let text = long_section(120);
        let a = chunker.chunk("doc.md", &text, DocumentKind::Markdown).unwrap();
        let b = chunker.chunk("doc.md", &text, DocumentKind::Markdown).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn headings_open_new_chunks() {
        let chunker = Chunker::new(200, 0, 50);
        let chunks = chunker
            .chunk("doc.md", TWO_SECTIONS, DocumentKind::Markdown)
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata.heading.as_deref(), Some("Intro"));
        assert_eq!(chunks[1].metadata.heading.as_deref(), Some("Details"));
        assert!(chunks[1].text.contains("hallucinations"));
        assert_eq!(chunks[0].metadata.total_chunks, 2);
        assert_eq!(chunks[1].metadata.total_chunks, 2);
    }

    #[test]
    fn chunk_indexes_are_contiguous_and_ids_unique() {
        let chunker = Chunker::new(200, 20, 50);
        let chunks = chunker
            .chunk("doc.md", &long_section(150), DocumentKind::Markdown)
            .unwrap();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as u32);
        }
        let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn size_bounds_hold_inside_a_section() {
        let chunker = Chunker::new(200, 0, 50);
        let chunks = chunker
            .chunk("doc.md", &long_section(200), DocumentKind::Markdown)
            .unwrap();

        assert!(chunks.len() > 2);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.token_estimate >= 50 && chunk.token_estimate <= 200,
                "chunk {} has {} tokens",
                chunk.chunk_index,
                chunk.token_estimate
            );
        }
    }

    #[test]
    fn zero_overlap_partitions_the_token_stream() {
        let chunker = Chunker::new(200, 0, 50);
        let text = long_section(200);
        let chunks = chunker.chunk("doc.md", &text, DocumentKind::Markdown).unwrap();

        let total: usize = chunks.iter().map(|c| c.token_estimate as usize).sum();
        assert_eq!(total, token_estimate(&text));
    }

    #[test]
    fn consecutive_chunks_share_an_overlap() {
        let chunker = Chunker::new(200, 40, 50);
        let chunks = chunker
            .chunk("doc.md", &long_section(200), DocumentKind::Markdown)
            .unwrap();
        assert!(chunks.len() > 1);

        let c0 = &chunks[0].text;
        let c1 = &chunks[1].text;
        let shared = (0..c0.len())
            .filter(|&i| c0.is_char_boundary(i))
            .find(|&i| c1.starts_with(&c0[i..]))
            .map(|i| c0.len() - i)
            .unwrap_or(0);
        assert!(shared > 0, "no shared overlap between chunks 0 and 1");

        let shared_tokens = token_estimate(&c0[c0.len() - shared..]);
        assert!(
            (20..=80).contains(&shared_tokens),
            "overlap of {} tokens is far from the configured 40",
            shared_tokens
        );
    }

    #[test]
    fn empty_document_is_an_error() {
        let chunker = Chunker::new(200, 0, 50);
        let err = chunker.chunk("doc.md", "   \n\n  ", DocumentKind::Markdown).unwrap_err();
        assert!(matches!(err, Error::EmptyDocument));
    }

    #[test]
    fn unbreakable_span_is_truncated_not_fatal() {
        let chunker = Chunker::new(200, 0, 50);
        let blob = "x".repeat(200 * 8 * 3);
        let chunks = chunker.chunk("doc.md", &blob, DocumentKind::Markdown).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.len() <= 200 * 8);
    }

    #[test]
    fn json_blocks_keep_heading_and_page() {
        let chunker = Chunker::new(200, 0, 50);
        let json = r#"[
            {"text": "Reactor output rose steadily.", "heading": "Results", "page_number": 4},
            {"text": "Shutdown completed without incident.", "heading": "Results", "page_number": 5}
        ]"#;
        let chunks = chunker
            .chunk("report.json", json, DocumentKind::JsonBlocks)
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.heading.as_deref(), Some("Results"));
        assert_eq!(chunks[0].metadata.page_number, Some(4));
    }

    #[test]
    fn small_tail_fragment_merges_into_previous_chunk() {
        let chunker = Chunker::new(200, 0, 50);
        // One long section followed by a trailing fragment well under the
        // minimum, not introduced by a heading.
        let mut text = long_section(55);
        text.push_str("\n\nTiny tail.");
        let chunks = chunker.chunk("doc.md", &text, DocumentKind::Markdown).unwrap();
        assert!(chunks.last().unwrap().text.contains("Tiny tail."));
        assert!(chunks.last().unwrap().token_estimate >= 50);
    }

    #[test]
    fn single_small_document_is_one_chunk() {
        let chunker = Chunker::new(200, 0, 50);
        let chunks = chunker
            .chunk("doc.md", "Just one short line.", DocumentKind::Markdown)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.total_chunks, 1);
    }
}
