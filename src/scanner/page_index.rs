//! Glyph-level text index of a document
//!
//! Built once per invocation. Word tokens for the locator and positional search for
//! the matcher both read from it, so every page is interpreted a single time.

use std::ops::Range;

use crate::content::Glyph;
use crate::types::{BBox, RedactionMark, TextToken};

/// Horizontal gap, relative to glyph height, still read as the same word
const WORD_GAP_RATIO: f64 = 0.25;
/// Minimum vertical overlap, relative to the shorter glyph, for the same line
const LINE_OVERLAP_RATIO: f64 = 0.5;
const EPSILON: f64 = 1e-6;

/// Same baseline, allowing for small kerning overlaps
fn same_line(prev: &BBox, next: &BBox) -> bool {
    let min_height = prev.height().min(next.height());
    if min_height <= EPSILON {
        return (prev.y0 - next.y0).abs() <= EPSILON && next.x0 >= prev.x0 - EPSILON;
    }
    let tolerance = WORD_GAP_RATIO * prev.height().max(next.height());
    prev.vertical_overlap(next) > LINE_OVERLAP_RATIO * min_height && next.x0 >= prev.x0 - tolerance
}

/// Next glyph continues the previous one without a visual break
pub(crate) fn adjacent(prev: &BBox, next: &BBox) -> bool {
    if !same_line(prev, next) {
        return false;
    }
    let tolerance = WORD_GAP_RATIO * prev.height().max(next.height());
    next.x0 - prev.x1 <= tolerance.max(EPSILON)
}

#[derive(Debug, Clone)]
struct GlyphSpan {
    range: Range<usize>,
    bbox: BBox,
    whitespace: bool,
}

/// Text of one page with a byte-to-glyph mapping
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    page: u32,
    text: String,
    spans: Vec<GlyphSpan>,
}

impl PageIndex {
    pub fn build(page: u32, glyphs: &[Glyph]) -> Self {
        let mut index = PageIndex {
            page,
            text: String::new(),
            spans: Vec::with_capacity(glyphs.len()),
        };

        let mut previous: Option<&Glyph> = None;
        for glyph in glyphs {
            if let Some(prev) = previous {
                // A gap on the same line is a word break even without a space glyph.
                // A line change is a break too, unless the line ends in punctuation such
                // as a hyphen or `@`, so wrapped values can still be found.
                let after_space = index.text.ends_with(char::is_whitespace);
                if !after_space && !glyph.is_whitespace() {
                    if !same_line(&prev.bbox, &glyph.bbox) {
                        if index.text.ends_with(char::is_alphanumeric) {
                            index.text.push('\n');
                        }
                    } else if !adjacent(&prev.bbox, &glyph.bbox) {
                        index.text.push(' ');
                    }
                }
            }
            let start = index.text.len();
            index.text.push_str(&glyph.text);
            index.spans.push(GlyphSpan {
                range: start..index.text.len(),
                bbox: glyph.bbox,
                whitespace: glyph.is_whitespace(),
            });
            previous = Some(glyph);
        }
        index
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn glyph_count(&self) -> usize {
        self.spans.len()
    }

    /// Whitespace-delimited words, also split where glyphs stop touching
    pub fn words(&self) -> Vec<TextToken> {
        let mut words = Vec::new();
        let mut current: Option<(Range<usize>, BBox)> = None;
        let mut last_bbox: Option<BBox> = None;

        for span in &self.spans {
            let continues = last_bbox.map_or(false, |prev| adjacent(&prev, &span.bbox));
            if span.whitespace || !continues {
                if let Some((range, bbox)) = current.take() {
                    self.push_word(&mut words, range, bbox);
                }
            }
            if !span.whitespace && !span.range.is_empty() {
                current = Some(match current.take() {
                    Some((range, bbox)) => (range.start..span.range.end, bbox.union(&span.bbox)),
                    None => (span.range.clone(), span.bbox),
                });
            }
            last_bbox = Some(span.bbox);
        }
        if let Some((range, bbox)) = current {
            self.push_word(&mut words, range, bbox);
        }
        words
    }

    fn push_word(&self, words: &mut Vec<TextToken>, range: Range<usize>, bbox: BBox) {
        let text: String = self.text[range].split_whitespace().collect();
        if !text.is_empty() {
            words.push(TextToken {
                text,
                bbox,
                page: self.page,
            });
        }
    }

    /// One mark per line segment of every exact, case-sensitive occurrence of `needle`.
    pub fn find(&self, needle: &str) -> Vec<RedactionMark> {
        if needle.is_empty() {
            return Vec::new();
        }

        let mut marks = Vec::new();
        for (start, matched) in self.text.match_indices(needle) {
            let end = start + matched.len();
            let mut segment: Option<BBox> = None;
            let mut last: Option<BBox> = None;

            // spans are in text order
            let first = self.spans.partition_point(|s| s.range.end <= start);
            for span in self.spans[first..]
                .iter()
                .take_while(|s| s.range.start < end)
                .filter(|s| !s.range.is_empty())
            {
                let breaks = last.map_or(false, |prev| !same_line(&prev, &span.bbox));
                if breaks {
                    if let Some(bbox) = segment.take() {
                        marks.push(RedactionMark { page: self.page, bbox });
                    }
                }
                segment = Some(segment.map_or(span.bbox, |b| b.union(&span.bbox)));
                last = Some(span.bbox);
            }
            if let Some(bbox) = segment {
                marks.push(RedactionMark { page: self.page, bbox });
            }
        }
        marks
    }
}

/// Per-page glyph text for the whole document
#[derive(Debug, Clone, Default)]
pub struct DocumentIndex {
    pages: Vec<PageIndex>,
}

impl DocumentIndex {
    pub fn new(pages: Vec<PageIndex>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[PageIndex] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All word tokens ordered by page, then extraction order
    pub fn tokens(&self) -> Vec<TextToken> {
        self.pages.iter().flat_map(PageIndex::words).collect()
    }

    pub fn find(&self, needle: &str) -> Vec<RedactionMark> {
        self.pages.iter().flat_map(|page| page.find(needle)).collect()
    }
}
