//! Chapter detection across page sequences.
//!
//! Headings are matched by an ordered pattern table and the current chapter
//! label is carried forward until the next match; a single forward pass,
//! later pages never change earlier labels.

use log::debug;
use regex::Regex;

use crate::error::Result;
use crate::pdf_extractor::PageRecord;

/// Label assigned to pages before the first detected heading.
pub const DEFAULT_CHAPTER_LABEL: &str = "Introduction";

/// Candidate heading lines must fall inside this length range (in chars).
const HEADING_MIN_CHARS: usize = 4;
const HEADING_MAX_CHARS: usize = 99;

const DEFAULT_PATTERNS: [&str; 3] = [
    r"(?i)^CHAPTER\s+\d+",
    r"(?i)^\d+\.\s+[A-Z][^.]*$",
    r"(?i)^PART\s+[IVX]+",
];

/// Ordered heading match rules. Conventions can be extended with extra
/// patterns without touching the traversal logic.
pub struct ChapterPatterns {
    patterns: Vec<Regex>,
}

impl ChapterPatterns {
    pub fn default_set() -> Self {
        let patterns = DEFAULT_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("built-in chapter pattern must compile"))
            .collect();
        Self { patterns }
    }

    /// Built-in patterns followed by caller-supplied ones, in order.
    pub fn with_extra(extra: &[String]) -> Result<Self> {
        let mut set = Self::default_set();
        for pattern in extra {
            set.patterns.push(Regex::new(pattern)?);
        }
        Ok(set)
    }

    fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(line))
    }
}

impl Default for ChapterPatterns {
    fn default() -> Self {
        Self::default_set()
    }
}

/// A page with its chapter label attached.
#[derive(Debug, Clone)]
pub struct TaggedPage {
    pub page: PageRecord,
    pub chapter: String,
}

/// Assign a chapter label to every page of one document.
pub fn tag_chapters(
    pages: Vec<PageRecord>,
    patterns: &ChapterPatterns,
    scan_lines: usize,
) -> Vec<TaggedPage> {
    let mut current_chapter = DEFAULT_CHAPTER_LABEL.to_string();

    pages
        .into_iter()
        .map(|page| {
            if let Some(heading) = detect_heading(&page.text, patterns, scan_lines) {
                debug!(
                    "{} page {}: chapter \"{}\"",
                    page.book_name, page.page_number, heading
                );
                current_chapter = heading;
            }
            TaggedPage {
                page,
                chapter: current_chapter.clone(),
            }
        })
        .collect()
}

/// Scan the leading lines of a page for a heading. The first line that
/// matches any pattern wins; the rest of the page is not considered.
fn detect_heading(text: &str, patterns: &ChapterPatterns, scan_lines: usize) -> Option<String> {
    for line in text.lines().take(scan_lines) {
        let line = line.trim();
        let len = line.chars().count();
        if len < HEADING_MIN_CHARS || len > HEADING_MAX_CHARS {
            continue;
        }
        if patterns.matches(line) {
            return Some(line.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn page(text: &str, page_number: u32) -> PageRecord {
        PageRecord {
            book_name: "test-book".to_string(),
            page_number,
            text: text.to_string(),
            file_path: PathBuf::from("test-book.pdf"),
        }
    }

    #[test]
    fn test_heading_updates_and_carries_forward() {
        let pages = vec![
            page("CHAPTER 1\nOn the nature of markets.", 1),
            page("More prose without any heading at all.", 2),
        ];
        let tagged = tag_chapters(pages, &ChapterPatterns::default_set(), 5);
        assert_eq!(tagged[0].chapter, "CHAPTER 1");
        assert_eq!(tagged[1].chapter, "CHAPTER 1");
    }

    #[test]
    fn test_default_label_before_first_heading() {
        let pages = vec![
            page("Front matter, no heading here.", 1),
            page("PART IV\nA new beginning.", 2),
        ];
        let tagged = tag_chapters(pages, &ChapterPatterns::default_set(), 5);
        assert_eq!(tagged[0].chapter, DEFAULT_CHAPTER_LABEL);
        assert_eq!(tagged[1].chapter, "PART IV");
    }

    #[test]
    fn test_first_matching_line_wins() {
        let pages = vec![page("CHAPTER 2\nCHAPTER 3\nbody text", 1)];
        let tagged = tag_chapters(pages, &ChapterPatterns::default_set(), 5);
        assert_eq!(tagged[0].chapter, "CHAPTER 2");
    }

    #[test]
    fn test_heading_outside_scan_window_ignored() {
        let text = "line one\nline two\nline three\nline four\nline five\nCHAPTER 9";
        let tagged = tag_chapters(vec![page(text, 1)], &ChapterPatterns::default_set(), 5);
        assert_eq!(tagged[0].chapter, DEFAULT_CHAPTER_LABEL);
    }

    #[test]
    fn test_heading_length_bounds() {
        // a line longer than 99 chars is never a heading
        let long_line = format!("CHAPTER 1 {}", "x".repeat(120));
        let tagged = tag_chapters(
            vec![page(&long_line, 1), page("1. Valuation", 2)],
            &ChapterPatterns::default_set(),
            5,
        );
        assert_eq!(tagged[0].chapter, DEFAULT_CHAPTER_LABEL);
        assert_eq!(tagged[1].chapter, "1. Valuation");
    }

    #[test]
    fn test_case_insensitive_match() {
        let tagged = tag_chapters(
            vec![page("chapter 12\nbody", 1)],
            &ChapterPatterns::default_set(),
            5,
        );
        assert_eq!(tagged[0].chapter, "chapter 12");
    }

    #[test]
    fn test_numbered_title_must_end_without_period() {
        let tagged = tag_chapters(
            vec![page("3. Margin of Safety\nbody", 1), page("4. Risk. More.", 2)],
            &ChapterPatterns::default_set(),
            5,
        );
        assert_eq!(tagged[0].chapter, "3. Margin of Safety");
        // the trailing sentence keeps the previous label
        assert_eq!(tagged[1].chapter, "3. Margin of Safety");
    }

    #[test]
    fn test_extra_patterns_extend_table() {
        let patterns = ChapterPatterns::with_extra(&[r"(?i)^BOOK\s+\w+".to_string()]).unwrap();
        let tagged = tag_chapters(vec![page("BOOK TWO\nbody", 1)], &patterns, 5);
        assert_eq!(tagged[0].chapter, "BOOK TWO");
    }

    #[test]
    fn test_invalid_extra_pattern_is_an_error() {
        assert!(ChapterPatterns::with_extra(&["[".to_string()]).is_err());
    }
}
