//! Per-page PDF text extraction.
//!
//! This module handles:
//! - Multi-strategy extraction against the primary backend (lopdf)
//! - Secondary whole-document extraction via pdf-extract
//! - Readability gating and page text cleanup
//! - PDF string decoding (UTF-8, UTF-16BE/LE, PDFDocEncoding)

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use lopdf::{Document, Object, ObjectId};

use crate::config::RagConfig;

/// One page of raw extracted text, before chapter tagging.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub book_name: String,
    /// 1-based.
    pub page_number: u32,
    pub text: String,
    pub file_path: PathBuf,
}

/// Tokens that count as readable even when shorter than three letters.
const STOP_WORDS: [&str; 21] = [
    "the", "and", "or", "to", "of", "in", "a", "is", "that", "for", "with", "on", "by", "this",
    "be", "as", "from", "are", "was", "at", "an",
];

type PageStrategy = fn(&Document, u32, ObjectId) -> Option<String>;

/// Extraction strategies in priority order. The first one whose output
/// passes the readability gate wins for a page.
const PAGE_STRATEGIES: &[(&str, PageStrategy)] = &[
    ("plain", extract_page_plain),
    ("layout", extract_page_layout),
    ("spans", extract_page_spans),
];

pub struct PdfExtractor {
    readable_ratio: f32,
    min_page_chars: usize,
    fallback_page_threshold: usize,
}

impl PdfExtractor {
    pub fn from_config(config: &RagConfig) -> Self {
        Self {
            readable_ratio: config.readable_ratio,
            min_page_chars: config.min_page_chars,
            fallback_page_threshold: config.fallback_page_threshold,
        }
    }

    /// Extract every readable page of a document, in page order.
    ///
    /// Returns `None` when the document yields no readable pages at all;
    /// the caller logs and skips it, the corpus build continues.
    pub fn extract_document(&self, path: &Path) -> Option<Vec<PageRecord>> {
        let book_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let primary = match Document::load(path) {
            Ok(doc) => self.extract_primary(&doc, &book_name, path),
            Err(e) => {
                warn!("primary backend failed to open {}: {}", path.display(), e);
                Vec::new()
            }
        };

        let pages = if primary.len() >= self.fallback_page_threshold {
            primary
        } else {
            debug!(
                "{}: only {} readable pages via primary backend, trying pdf-extract",
                book_name,
                primary.len()
            );
            let secondary = self.extract_secondary(path, &book_name);
            if secondary.len() > primary.len() {
                info!(
                    "{}: secondary backend recovered {} readable pages",
                    book_name,
                    secondary.len()
                );
                secondary
            } else {
                primary
            }
        };

        if pages.is_empty() {
            warn!("could not extract readable text from {}", path.display());
            return None;
        }

        info!("extracted {} readable pages from {}", pages.len(), book_name);
        Some(pages)
    }

    fn extract_primary(&self, doc: &Document, book_name: &str, path: &Path) -> Vec<PageRecord> {
        let mut pages = Vec::new();

        for (page_number, page_id) in doc.get_pages() {
            let mut accepted = None;
            for (name, strategy) in PAGE_STRATEGIES {
                if let Some(text) = strategy(doc, page_number, page_id) {
                    if is_readable_text(&text, self.readable_ratio) {
                        debug!("{} page {}: accepted via {}", book_name, page_number, name);
                        accepted = Some(text);
                        break;
                    }
                }
            }

            let Some(raw) = accepted else { continue };
            if let Some(record) = self.finish_page(raw, book_name, page_number, path) {
                pages.push(record);
            }
        }

        pages
    }

    fn extract_secondary(&self, path: &Path, book_name: &str) -> Vec<PageRecord> {
        // pdf-extract can panic on malformed font tables, so the call is
        // fenced the same way the rest of the pipeline treats per-document
        // failures: recover and move on.
        let extracted = match std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!("pdf-extract failed for {}: {}", path.display(), e);
                return Vec::new();
            }
            Err(_) => {
                warn!("pdf-extract panicked for {}", path.display());
                return Vec::new();
            }
        };

        extracted
            .into_iter()
            .enumerate()
            .filter(|(_, text)| is_readable_text(text, self.readable_ratio))
            .filter_map(|(i, text)| self.finish_page(text, book_name, (i + 1) as u32, path))
            .collect()
    }

    /// Clean an accepted page and apply the minimum-length gate.
    fn finish_page(
        &self,
        raw: String,
        book_name: &str,
        page_number: u32,
        path: &Path,
    ) -> Option<PageRecord> {
        let cleaned = clean_page_text(&raw);
        if cleaned.chars().count() > self.min_page_chars {
            Some(PageRecord {
                book_name: book_name.to_string(),
                page_number,
                text: cleaned,
                file_path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

/// Check whether text looks like readable English rather than garbled
/// font-encoding output.
///
/// Inspects the first 20 whitespace tokens; a token is readable if, stripped
/// of punctuation and lowercased, it is a stop word or alphabetic with more
/// than two letters. The ratio gate is strict.
pub fn is_readable_text(text: &str, min_ratio: f32) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.chars().count() < 10 {
        return false;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.is_empty() {
        return false;
    }

    let mut readable = 0usize;
    for word in words.iter().take(20) {
        let clean: String = word
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect::<String>()
            .to_lowercase();
        if clean.is_empty() {
            continue;
        }
        let alphabetic = clean.chars().all(|c| c.is_alphabetic());
        if STOP_WORDS.contains(&clean.as_str()) || (alphabetic && clean.chars().count() > 2) {
            readable += 1;
        }
    }

    readable as f32 / words.len().min(20) as f32 > min_ratio
}

/// Normalize page text while keeping line structure for heading detection:
/// trim every line, collapse runs of spaces, drop blank lines.
pub fn clean_page_text(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strategy (a): lopdf's own per-page text extraction.
fn extract_page_plain(doc: &Document, page_number: u32, _page_id: ObjectId) -> Option<String> {
    doc.extract_text(&[page_number])
        .ok()
        .filter(|text| !text.trim().is_empty())
}

/// Strategy (b): walk the page content stream, inserting breaks at text
/// positioning operators. More tolerant of malformed pages than (a).
fn extract_page_layout(doc: &Document, _page_number: u32, page_id: ObjectId) -> Option<String> {
    let content = doc.get_page_content(page_id).ok()?;
    let operations = lopdf::content::Content::decode(&content)
        .map(|c| c.operations)
        .unwrap_or_default();

    let mut text = String::new();
    for op in operations {
        match op.operator.as_str() {
            // Tj: show text string
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    if let Some(s) = decode_pdf_string(bytes) {
                        text.push_str(&s);
                    }
                }
            }
            // TJ: show text array (with kerning)
            "TJ" => {
                if let Some(Object::Array(arr)) = op.operands.first() {
                    for item in arr {
                        if let Object::String(bytes, _) = item {
                            if let Some(s) = decode_pdf_string(bytes) {
                                text.push_str(&s);
                            }
                        }
                    }
                }
            }
            // Text positioning that indicates a new line
            "Td" | "TD" | "T*" | "'" | "\"" => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            "ET" => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Strategy (c): reconstruct blocks, lines, and spans from the content
/// stream. Spans within a line are joined with single spaces, which rescues
/// pages whose show-text operators carry word fragments.
fn extract_page_spans(doc: &Document, _page_number: u32, page_id: ObjectId) -> Option<String> {
    let content = doc.get_page_content(page_id).ok()?;
    let operations = lopdf::content::Content::decode(&content).ok()?.operations;

    let mut lines: Vec<String> = Vec::new();
    let mut spans: Vec<String> = Vec::new();

    let mut flush_line = |spans: &mut Vec<String>, lines: &mut Vec<String>| {
        if !spans.is_empty() {
            lines.push(spans.join(" "));
            spans.clear();
        }
    };

    for op in operations {
        match op.operator.as_str() {
            "BT" | "ET" | "Td" | "TD" | "T*" | "'" | "\"" => {
                flush_line(&mut spans, &mut lines);
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    if let Some(s) = decode_pdf_string(bytes) {
                        let s = s.trim().to_string();
                        if !s.is_empty() {
                            spans.push(s);
                        }
                    }
                }
            }
            "TJ" => {
                if let Some(Object::Array(arr)) = op.operands.first() {
                    let mut assembled = String::new();
                    for item in arr {
                        if let Object::String(bytes, _) = item {
                            if let Some(s) = decode_pdf_string(bytes) {
                                assembled.push_str(&s);
                            }
                        }
                    }
                    let assembled = assembled.trim().to_string();
                    if !assembled.is_empty() {
                        spans.push(assembled);
                    }
                }
            }
            _ => {}
        }
    }
    flush_line(&mut spans, &mut lines);

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Decode PDF string bytes to a Rust String.
/// PDF strings can be UTF-8, UTF-16BE (with BOM 0xFEFF), UTF-16LE, or
/// PDFDocEncoding.
pub fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }

    // UTF-16BE with BOM (0xFE 0xFF)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16_chars: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|chunk| {
                if chunk.len() == 2 {
                    Some(u16::from_be_bytes([chunk[0], chunk[1]]))
                } else {
                    None
                }
            })
            .collect();
        return String::from_utf16(&utf16_chars).ok();
    }

    // UTF-16LE pattern: alternating ASCII and null bytes
    if bytes.len() >= 4 {
        let looks_like_utf16le = bytes
            .chunks(2)
            .take(4)
            .all(|chunk| chunk.len() == 2 && chunk[1] == 0 && chunk[0] < 128);
        if looks_like_utf16le {
            let utf16_chars: Vec<u16> = bytes
                .chunks(2)
                .filter_map(|chunk| {
                    if chunk.len() == 2 {
                        Some(u16::from_le_bytes([chunk[0], chunk[1]]))
                    } else {
                        None
                    }
                })
                .collect();
            if let Ok(s) = String::from_utf16(&utf16_chars) {
                let cleaned: String = s.chars().filter(|c| !c.is_control() || *c == ' ').collect();
                if !cleaned.is_empty() {
                    return Some(cleaned);
                }
            }
        }
    }

    // UTF-16BE pattern without BOM: alternating null and ASCII bytes
    if bytes.len() >= 4 {
        let looks_like_utf16be = bytes
            .chunks(2)
            .take(4)
            .all(|chunk| chunk.len() == 2 && chunk[0] == 0 && chunk[1] < 128);
        if looks_like_utf16be {
            let utf16_chars: Vec<u16> = bytes
                .chunks(2)
                .filter_map(|chunk| {
                    if chunk.len() == 2 {
                        Some(u16::from_be_bytes([chunk[0], chunk[1]]))
                    } else {
                        None
                    }
                })
                .collect();
            if let Ok(s) = String::from_utf16(&utf16_chars) {
                let cleaned: String = s.chars().filter(|c| !c.is_control() || *c == ' ').collect();
                if !cleaned.is_empty() {
                    return Some(cleaned);
                }
            }
        }
    }

    // UTF-8
    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        let cleaned: String = s.chars().filter(|c| !c.is_control() || *c == ' ').collect();
        if !cleaned.is_empty() {
            return Some(cleaned);
        }
    }

    // Latin-1 / PDFDocEncoding fallback: each byte as a codepoint
    let s: String = bytes
        .iter()
        .filter_map(|&b| {
            let c = b as char;
            if c.is_control() && c != ' ' {
                None
            } else {
                Some(c)
            }
        })
        .collect();
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readability_accepts_plain_english() {
        let text = "The intelligent investor is a realist who sells to optimists and buys from pessimists.";
        assert!(is_readable_text(text, 0.3));
    }

    #[test]
    fn test_readability_rejects_garbled_output() {
        let text = "q1 w2 e3 r4 t5 y6 u7 i8 o9 p0 a1 s2 d3 f4 g5 h6 j7 k8 l9 z0";
        assert!(!is_readable_text(text, 0.3));
    }

    #[test]
    fn test_readability_rejects_short_text() {
        assert!(!is_readable_text("abc def", 0.3));
        assert!(!is_readable_text("", 0.3));
    }

    #[test]
    fn test_readability_ratio_is_strict() {
        // 10 tokens, exactly 3 readable: ratio 0.3 must be rejected,
        // a fourth readable token tips it over.
        let at_threshold = "market value price x1 y2 z3 w4 v5 u6 t7";
        assert!(!is_readable_text(at_threshold, 0.3));

        let above_threshold = "market value price trend x1 y2 z3 w4 v5 u6";
        assert!(is_readable_text(above_threshold, 0.3));
    }

    #[test]
    fn test_readability_counts_stop_words() {
        // "a", "is", "of" are too short to qualify as words but sit in the
        // stop-word set, so they still count as readable.
        let text = "a is of x1 y2 z3 w4 v5 u6 t7 s8 q9 r0 p1 o2 n3 m4 l5 k6 j7";
        assert!(!is_readable_text(text, 0.3));
        let text = "a is of the and x1 y2 z3 w4 v5 u6 t7 s8 q9 r0 p1 o2 n3 m4 l5";
        assert!(!is_readable_text(text, 0.3));
        // 7 of 20 = 0.35
        let text = "a is of the and for was x1 y2 z3 w4 v5 u6 t7 s8 q9 r0 p1 o2 n3";
        assert!(is_readable_text(text, 0.3));
    }

    #[test]
    fn test_clean_page_text_collapses_whitespace() {
        let raw = "  The   first  line \n\n\n  second\tline  \n";
        assert_eq!(clean_page_text(raw), "The first line\nsecond line");
    }

    #[test]
    fn test_decode_utf16be_with_bom() {
        let bytes = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&bytes), Some("Hi".to_string()));
    }

    #[test]
    fn test_decode_utf16le_pattern() {
        let bytes = [b'T', 0x00, b'e', 0x00, b's', 0x00, b't', 0x00];
        assert_eq!(decode_pdf_string(&bytes), Some("Test".to_string()));
    }

    #[test]
    fn test_decode_utf8() {
        assert_eq!(
            decode_pdf_string("CHAPTER 1".as_bytes()),
            Some("CHAPTER 1".to_string())
        );
    }

    #[test]
    fn test_decode_latin1_fallback() {
        let bytes = [0xC9, b't', b'e'];
        let decoded = decode_pdf_string(&bytes).unwrap();
        assert_eq!(decoded, "Éte");
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode_pdf_string(&[]), None);
    }
}
