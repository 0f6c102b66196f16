//! Core data model shared by every pipeline stage

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// PDF magic bytes every accepted payload starts with
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// PDF bytes owned by whichever stage currently holds them.
///
/// Stages consume a `Document` and hand back a new one; the buffer is zeroed
/// when dropped so intermediate plaintext does not linger in freed memory.
pub struct Document {
    bytes: Zeroizing<Vec<u8>>,
}

impl Document {
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(data),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_pdf_signature(&self) -> bool {
        self.bytes.starts_with(PDF_SIGNATURE)
    }

    /// Releases the bytes to the caller without wiping them.
    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut *self.bytes)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").field("len", &self.bytes.len()).finish()
    }
}

/// Axis-aligned rectangle in page user space (origin bottom-left, y up)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    /// Builds a rectangle from any two opposite corners.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn contains(&self, other: &BBox) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1 && other.y0 >= self.y0 && other.y1 <= self.y1
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Length of the vertical overlap with `other`, zero when disjoint
    pub fn vertical_overlap(&self, other: &BBox) -> f64 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }
}

/// A whitespace-delimited word with its position on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    pub bbox: BBox,
    /// Zero-based page index
    pub page: u32,
}

/// Encoded raster of the first page, handed to the classifier and then dropped
pub struct RasterImage {
    pub data: Zeroizing<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
}

impl RasterImage {
    pub fn jpeg(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: Zeroizing::new(data),
            width,
            height,
            mime_type: "image/jpeg",
        }
    }

    /// The raster always depicts page 0 of its source document.
    pub fn page(&self) -> u32 {
        0
    }
}

impl fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterImage")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// A value the classifier suspects is sensitive. It carries no position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PiiCandidate(pub String);

impl PiiCandidate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PiiCandidate {
    fn from(value: &str) -> Self {
        PiiCandidate(value.to_string())
    }
}

/// Ordered so that matching and marks are deterministic
pub type CandidateSet = BTreeSet<PiiCandidate>;

/// Splits a classifier text blob into whitespace-delimited candidates.
pub fn candidates_from_text(text: &str) -> CandidateSet {
    text.split_whitespace().map(PiiCandidate::from).collect()
}

/// A region committed for removal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionMark {
    /// Zero-based page index
    pub page: u32,
    pub bbox: BBox,
}
