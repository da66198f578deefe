//! Block segmentation of converter output.
//!
//! Markdown is scanned line-wise into headings, fenced code, tables, list
//! items and paragraphs. A heading stack attributes every block to its
//! enclosing section. Structured JSON input arrives pre-segmented and is
//! mapped onto the same block type.

use regex::Regex;
use serde::Deserialize;

use quarry_core::{Error, Result};

/// What a block is, for packing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Paragraph,
    Code,
    ListItem,
    Table,
}

/// A contiguous span of source text with its section context.
#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
    /// Nearest enclosing heading where this block starts.
    pub heading: Option<String>,
    /// Heading stack from the outermost section down to `heading`.
    pub section_path: Vec<String>,
    pub page_number: Option<u32>,
}

/// One pre-segmented block of structured converter output.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonBlock {
    text: String,
    #[serde(default)]
    heading: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
}

/// Heading stack tracking ancestor sections during the scan.
struct HeadingStack {
    entries: Vec<(u8, String)>,
}

impl HeadingStack {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn push(&mut self, level: u8, title: &str) {
        while matches!(self.entries.last(), Some((l, _)) if *l >= level) {
            self.entries.pop();
        }
        self.entries.push((level, title.to_string()));
    }

    fn path(&self) -> Vec<String> {
        self.entries.iter().map(|(_, t)| t.clone()).collect()
    }

    fn current(&self) -> Option<String> {
        self.entries.last().map(|(_, t)| t.clone())
    }
}

/// Scan Markdown text into blocks.
pub fn scan_markdown(text: &str) -> Vec<Block> {
    let heading_re = Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap();
    let list_re = Regex::new(r"^\s{0,3}(?:[-*+]|\d{1,3}[.)])\s+").unwrap();
    // Paginated converter output separates pages with `{N}` plus a dash run.
    let page_re = Regex::new(r"^\{(\d+)\}-{8,}\s*$").unwrap();

    let mut blocks = Vec::new();
    let mut stack = HeadingStack::new();
    let mut page: Option<u32> = None;

    let mut paragraph: Vec<&str> = Vec::new();
    let mut table: Vec<&str> = Vec::new();
    let mut code: Vec<&str> = Vec::new();
    let mut fence: Option<&str> = None;

    macro_rules! flush {
        ($buf:expr, $kind:expr) => {
            if !$buf.is_empty() {
                let body = $buf.join("\n").trim().to_string();
                $buf.clear();
                if !body.is_empty() {
                    blocks.push(Block {
                        kind: $kind,
                        text: body,
                        heading: stack.current(),
                        section_path: stack.path(),
                        page_number: page,
                    });
                }
            }
        };
    }

    for line in text.lines() {
        // Inside a fence everything accumulates until the closing marker.
        if let Some(open) = fence {
            code.push(line);
            if line.trim_start().starts_with(open) {
                flush!(code, BlockKind::Code);
                fence = None;
            }
            continue;
        }

        let trimmed = line.trim_start();
        if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(*m)) {
            flush!(paragraph, BlockKind::Paragraph);
            flush!(table, BlockKind::Table);
            fence = Some(marker);
            code.push(line);
            continue;
        }

        if let Some(captures) = page_re.captures(line) {
            if let Ok(n) = captures[1].parse() {
                page = Some(n);
            }
            continue;
        }

        if let Some(captures) = heading_re.captures(line) {
            flush!(paragraph, BlockKind::Paragraph);
            flush!(table, BlockKind::Table);
            let level = captures[1].len() as u8;
            let title = captures[2].to_string();
            stack.push(level, &title);
            blocks.push(Block {
                kind: BlockKind::Heading,
                text: line.trim().to_string(),
                heading: Some(title),
                section_path: stack.path(),
                page_number: page,
            });
            continue;
        }

        if trimmed.starts_with('|') {
            flush!(paragraph, BlockKind::Paragraph);
            table.push(line);
            continue;
        }
        flush!(table, BlockKind::Table);

        if line.trim().is_empty() {
            flush!(paragraph, BlockKind::Paragraph);
            continue;
        }

        if list_re.is_match(line) {
            flush!(paragraph, BlockKind::Paragraph);
            blocks.push(Block {
                kind: BlockKind::ListItem,
                text: line.trim().to_string(),
                heading: stack.current(),
                section_path: stack.path(),
                page_number: page,
            });
            continue;
        }

        // Continuation of a list item is folded into it.
        if let Some(last) = blocks.last_mut() {
            if last.kind == BlockKind::ListItem && line.starts_with("  ") {
                last.text.push(' ');
                last.text.push_str(line.trim());
                continue;
            }
        }

        paragraph.push(line);
    }

    // Unterminated fence keeps whatever accumulated.
    flush!(code, BlockKind::Code);
    flush!(paragraph, BlockKind::Paragraph);
    flush!(table, BlockKind::Table);

    blocks
}

/// Parse pre-segmented JSON blocks. Accepts either a top-level array or an
/// object with a `blocks` array.
pub fn parse_json_blocks(text: &str) -> Result<Vec<Block>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::Validation(format!("invalid JSON document: {}", e)))?;

    let raw = match &value {
        serde_json::Value::Array(items) => items.clone(),
        serde_json::Value::Object(map) => match map.get("blocks") {
            Some(serde_json::Value::Array(items)) => items.clone(),
            _ => {
                return Err(Error::Validation(
                    "JSON document must be an array of blocks or contain a 'blocks' array".into(),
                ))
            }
        },
        _ => {
            return Err(Error::Validation(
                "JSON document must be an array of blocks or contain a 'blocks' array".into(),
            ))
        }
    };

    let mut blocks = Vec::with_capacity(raw.len());
    for item in raw {
        let parsed: JsonBlock = serde_json::from_value(item)
            .map_err(|e| Error::Validation(format!("invalid block: {}", e)))?;
        if parsed.text.trim().is_empty() {
            continue;
        }
        blocks.push(Block {
            kind: BlockKind::Paragraph,
            text: parsed.text.trim().to_string(),
            section_path: parsed.heading.clone().into_iter().collect(),
            heading: parsed.heading,
            page_number: parsed.page_number,
        });
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_track_section_path() {
        let text = "# Top\n\nIntro text.\n\n## Inner\n\nDeep text.\n";
        let blocks = scan_markdown(text);

        let intro = blocks
            .iter()
            .find(|b| b.text == "Intro text.")
            .unwrap();
        assert_eq!(intro.heading.as_deref(), Some("Top"));
        assert_eq!(intro.section_path, vec!["Top"]);

        let deep = blocks.iter().find(|b| b.text == "Deep text.").unwrap();
        assert_eq!(deep.heading.as_deref(), Some("Inner"));
        assert_eq!(deep.section_path, vec!["Top", "Inner"]);
    }

    #[test]
    fn sibling_heading_replaces_stack_top() {
        let text = "## A\n\none\n\n## B\n\ntwo\n";
        let blocks = scan_markdown(text);
        let two = blocks.iter().find(|b| b.text == "two").unwrap();
        assert_eq!(two.section_path, vec!["B"]);
    }

    #[test]
    fn fenced_code_is_one_block() {
        let text = "Before.\n\n```rust\nfn main() {}\n\nstill code\n```\n\nAfter.\n";
        let blocks = scan_markdown(text);
        let code = blocks.iter().find(|b| b.kind == BlockKind::Code).unwrap();
        assert!(code.text.contains("fn main"));
        assert!(code.text.contains("still code"));
    }

    #[test]
    fn tables_and_lists_are_separate_blocks() {
        let text = "| a | b |\n|---|---|\n| 1 | 2 |\n\n- first\n- second\n";
        let blocks = scan_markdown(text);
        assert_eq!(
            blocks.iter().filter(|b| b.kind == BlockKind::Table).count(),
            1
        );
        assert_eq!(
            blocks
                .iter()
                .filter(|b| b.kind == BlockKind::ListItem)
                .count(),
            2
        );
    }

    #[test]
    fn page_markers_set_page_number() {
        let text = "{0}--------------------\n\nFirst page text.\n\n{1}--------------------\n\nSecond page text.\n";
        let blocks = scan_markdown(text);
        let first = blocks.iter().find(|b| b.text.contains("First")).unwrap();
        let second = blocks.iter().find(|b| b.text.contains("Second")).unwrap();
        assert_eq!(first.page_number, Some(0));
        assert_eq!(second.page_number, Some(1));
    }

    #[test]
    fn json_blocks_accept_array_and_wrapper() {
        let array = r#"[{"text": "alpha", "heading": "H", "page_number": 3}]"#;
        let blocks = parse_json_blocks(array).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].heading.as_deref(), Some("H"));
        assert_eq!(blocks[0].page_number, Some(3));

        let wrapped = r#"{"blocks": [{"text": "beta"}]}"#;
        let blocks = parse_json_blocks(wrapped).unwrap();
        assert_eq!(blocks[0].text, "beta");
    }

    #[test]
    fn json_blocks_reject_unknown_shape() {
        assert!(parse_json_blocks(r#""just a string""#).is_err());
        assert!(parse_json_blocks(r#"[{"text": "x", "extra": 1}]"#).is_err());
    }
}
