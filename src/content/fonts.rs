//! Font metrics needed to place glyphs and decode text

use std::collections::HashMap;
use std::ops::Range;

use lopdf::{Dictionary, Document, Object};
use tracing::debug;

use super::cmap::ToUnicodeMap;
use super::matrix::number;
use super::{resolve, resolve_dict, stream_bytes};

/// Glyph width used when a font declares none, in 1/1000 em
pub const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
const DEFAULT_CID_WIDTH: f64 = 1000.0;
const DEFAULT_ASCENT: f64 = 800.0;
const DEFAULT_DESCENT: f64 = -200.0;

/// One character code inside a shown string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharCode {
    pub code: u32,
    /// Byte span of the code in the source string
    pub bytes: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct FontMetrics {
    widths: HashMap<u32, f64>,
    default_width: f64,
    code_bytes: usize,
    ascent: f64,
    descent: f64,
    to_unicode: Option<ToUnicodeMap>,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self::fallback()
    }
}

impl FontMetrics {
    /// Metrics for an unknown or missing font: single-byte, 500/1000 em advance.
    pub fn fallback() -> Self {
        Self {
            widths: HashMap::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            code_bytes: 1,
            ascent: DEFAULT_ASCENT,
            descent: DEFAULT_DESCENT,
            to_unicode: None,
        }
    }

    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or(&b"Type1"[..]);

        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_stream().ok())
            .map(|stream| ToUnicodeMap::parse(&stream_bytes(stream)));

        let mut metrics = if subtype == b"Type0" {
            Self::composite(doc, font, to_unicode.as_ref())
        } else {
            Self::simple(doc, font, subtype == b"Type3")
        };
        metrics.to_unicode = to_unicode.filter(|cmap| !cmap.is_empty());

        debug!(
            "Font {:?}: {} widths, {} byte codes, cmap {}",
            String::from_utf8_lossy(
                font.get(b"BaseFont").ok().and_then(|o| o.as_name().ok()).unwrap_or(&b"?"[..])
            ),
            metrics.widths.len(),
            metrics.code_bytes,
            metrics.to_unicode.is_some()
        );
        metrics
    }

    fn simple(doc: &Document, font: &Dictionary, type3: bool) -> Self {
        let mut metrics = Self::fallback();
        let descriptor = font.get(b"FontDescriptor").ok().and_then(|o| resolve_dict(doc, o));

        // Type3 widths are in glyph space; scale them into 1/1000 em.
        let scale = if type3 {
            font.get(b"FontMatrix")
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|a| a.first())
                .and_then(number)
                .map(|a| a * 1000.0)
                .unwrap_or(1.0)
        } else {
            1.0
        };

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(number)
            .unwrap_or(0.0) as u32;
        if let Some(widths) = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
        {
            for (offset, width) in widths.iter().enumerate() {
                if let Some(w) = resolve(doc, width).and_then(number) {
                    metrics.widths.insert(first_char + offset as u32, w * scale);
                }
            }
        }

        if let Some(missing) = descriptor
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|o| resolve(doc, o))
            .and_then(number)
            .filter(|w| *w > 0.0)
        {
            metrics.default_width = missing * scale;
        }

        if !type3 {
            metrics.apply_descriptor(doc, descriptor);
        }
        metrics
    }

    fn composite(doc: &Document, font: &Dictionary, to_unicode: Option<&ToUnicodeMap>) -> Self {
        let mut metrics = Self::fallback();
        metrics.code_bytes = Self::composite_code_bytes(doc, font, to_unicode);
        metrics.default_width = DEFAULT_CID_WIDTH;

        let Some(descendant) = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .and_then(|a| a.first())
            .and_then(|o| resolve_dict(doc, o))
        else {
            return metrics;
        };

        if let Some(dw) = descendant.get(b"DW").ok().and_then(|o| resolve(doc, o)).and_then(number) {
            metrics.default_width = dw;
        }
        if let Some(w) = descendant
            .get(b"W")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
        {
            metrics.read_cid_widths(doc, w);
        }

        let descriptor = descendant.get(b"FontDescriptor").ok().and_then(|o| resolve_dict(doc, o));
        metrics.apply_descriptor(doc, descriptor);
        metrics
    }

    /// Predefined CMaps such as `Identity-H` use two-byte codes. An embedded CMap
    /// declares its width in the codespace range; without `/Encoding` the ToUnicode
    /// codespace is the best remaining hint.
    fn composite_code_bytes(doc: &Document, font: &Dictionary, to_unicode: Option<&ToUnicodeMap>) -> usize {
        let declared = match font.get(b"Encoding").ok().and_then(|o| resolve(doc, o)) {
            Some(Object::Stream(cmap)) => ToUnicodeMap::parse(&stream_bytes(cmap)).code_bytes(),
            Some(Object::Name(_)) => Some(2),
            _ => to_unicode.and_then(ToUnicodeMap::code_bytes),
        };
        declared.unwrap_or(2)
    }

    /// `/W` entries are either `c [w1 w2 ...]` or `c_first c_last w`.
    fn read_cid_widths(&mut self, doc: &Document, w: &[Object]) {
        let mut i = 0;
        while i < w.len() {
            let Some(first) = resolve(doc, &w[i]).and_then(number) else {
                break;
            };
            let first = first as u32;
            match w.get(i + 1).and_then(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, width) in list.iter().enumerate() {
                        if let Some(width) = resolve(doc, width).and_then(number) {
                            self.widths.insert(first + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(width)) = (
                        number(last),
                        w.get(i + 2).and_then(|o| resolve(doc, o)).and_then(number),
                    ) else {
                        break;
                    };
                    let last = last as u32;
                    if last >= first && last - first <= 0xFFFF {
                        for cid in first..=last {
                            self.widths.insert(cid, width);
                        }
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    fn apply_descriptor(&mut self, doc: &Document, descriptor: Option<&Dictionary>) {
        let Some(descriptor) = descriptor else {
            return;
        };
        let value = |key: &[u8]| {
            descriptor
                .get(key)
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(number)
        };
        if let (Some(ascent), Some(descent)) = (value(b"Ascent"), value(b"Descent")) {
            // Some producers write garbage here; keep defaults unless the box is sane.
            if ascent > 0.0 && descent <= 0.0 && ascent - descent >= 100.0 {
                self.ascent = ascent;
                self.descent = descent;
            }
        }
    }

    /// Splits a shown string into character codes.
    pub fn codes(&self, bytes: &[u8]) -> Vec<CharCode> {
        bytes
            .chunks(self.code_bytes)
            .enumerate()
            .map(|(index, chunk)| {
                let start = index * self.code_bytes;
                CharCode {
                    code: chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32),
                    bytes: start..start + chunk.len(),
                }
            })
            .collect()
    }

    /// Horizontal advance in em
    pub fn width(&self, code: u32) -> f64 {
        self.widths.get(&code).copied().unwrap_or(self.default_width) / 1000.0
    }

    /// Top of the glyph box in em
    pub fn ascent(&self) -> f64 {
        self.ascent / 1000.0
    }

    /// Bottom of the glyph box in em, usually negative
    pub fn descent(&self) -> f64 {
        self.descent / 1000.0
    }

    pub fn decode(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.lookup(code)) {
            return text.to_string();
        }
        if self.code_bytes == 1 {
            // Latin-1
            char::from(code as u8).to_string()
        } else {
            char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER).to_string()
        }
    }

    /// Word spacing applies only to the single-byte code 32.
    pub fn is_word_space(&self, code: &CharCode) -> bool {
        self.code_bytes == 1 && code.code == 32
    }
}
