//! Content stream decoding with inline images
//!
//! lopdf's content decoder stops at the first byte it cannot parse and reports what it
//! read so far as success. The binary payload of an inline image is the usual culprit.
//! Here every `BI … ID <data> EI` run is cut out before decoding and carried through
//! as a single opaque `BI` operation, comments are dropped, and each decoded run is
//! checked against the operators actually present so a short read is an error.

use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};

use crate::error::{Error, Result};

/// Operator of an opaque inline image; its one operand holds the raw `BI … EI` bytes.
pub const INLINE_IMAGE: &str = "BI";

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b'\0' | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    b"()<>[]{}/%".contains(&c)
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn is_operand_keyword(token: &[u8]) -> bool {
    matches!(token, b"true" | b"false" | b"null")
        || token
            .first()
            .map_or(false, |&c| c.is_ascii_digit() || matches!(c, b'+' | b'-' | b'.'))
}

/// Decodes a content stream, keeping inline images intact.
pub fn decode_operations(data: &[u8]) -> Result<Vec<Operation>> {
    let mut scanner = Scanner {
        data,
        pos: 0,
        segment: Vec::new(),
        operators: 0,
        operations: Vec::new(),
    };
    scanner.run()?;
    Ok(scanner.operations)
}

/// Encodes operations back into content bytes, writing inline images verbatim.
pub fn encode_operations(operations: Vec<Operation>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut run = Vec::new();
    for operation in operations {
        if operation.operator != INLINE_IMAGE {
            run.push(operation);
            continue;
        }
        flush_encoded(&mut run, &mut out)?;
        if let Some(Object::String(raw, _)) = operation.operands.first() {
            out.extend_from_slice(raw);
            out.push(b'\n');
        }
    }
    flush_encoded(&mut run, &mut out)?;
    Ok(out)
}

fn flush_encoded(run: &mut Vec<Operation>, out: &mut Vec<u8>) -> Result<()> {
    if run.is_empty() {
        return Ok(());
    }
    let encoded = Content {
        operations: std::mem::take(run),
    }
    .encode()
    .map_err(|e| Error::InternalError(format!("content encoding: {}", e)))?;
    out.extend_from_slice(&encoded);
    Ok(())
}

struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
    /// Bytes of the current run with comments removed
    segment: Vec<u8>,
    /// Operator keywords seen in the current run
    operators: usize,
    operations: Vec<Operation>,
}

impl Scanner<'_> {
    fn run(&mut self) -> Result<()> {
        let data = self.data;
        while self.pos < data.len() {
            let c = data[self.pos];
            match c {
                _ if is_whitespace(c) => {
                    self.segment.push(if c == b'\r' || c == b'\n' { c } else { b' ' });
                    self.pos += 1;
                }
                b'%' => {
                    self.skip_comment();
                    self.segment.push(b'\n');
                }
                b'(' => {
                    let end = self.literal_string_end(self.pos)?;
                    self.segment.extend_from_slice(&self.data[self.pos..end]);
                    self.pos = end;
                }
                b'<' if self.data.get(self.pos + 1) == Some(&b'<') => {
                    self.segment.extend_from_slice(b"<<");
                    self.pos += 2;
                }
                b'<' => {
                    let end = self.hex_string_end(self.pos)?;
                    self.segment.extend_from_slice(&self.data[self.pos..end]);
                    self.pos = end;
                }
                b'>' if self.data.get(self.pos + 1) == Some(&b'>') => {
                    self.segment.extend_from_slice(b">>");
                    self.pos += 2;
                }
                b'/' => {
                    let end = self.regular_end(self.pos + 1);
                    self.segment.extend_from_slice(&self.data[self.pos..end]);
                    self.pos = end;
                }
                _ if is_regular(c) => {
                    let start = self.pos;
                    let end = self.regular_end(start);
                    let token = &data[start..end];
                    if token == b"BI" {
                        self.flush()?;
                        self.inline_image(start)?;
                        continue;
                    }
                    if !is_operand_keyword(token) {
                        self.operators += 1;
                    }
                    self.segment.extend_from_slice(token);
                    self.pos = end;
                }
                _ => {
                    self.segment.push(c);
                    self.pos += 1;
                }
            }
        }
        self.flush()
    }

    /// Decodes the pending run and checks nothing was silently dropped.
    fn flush(&mut self) -> Result<()> {
        let segment = std::mem::take(&mut self.segment);
        let expected = std::mem::take(&mut self.operators);
        if expected == 0 {
            return Ok(());
        }
        let decoded = Content::decode(&segment)
            .map_err(|e| Error::MalformedDocument(format!("Unreadable content stream: {}", e)))?;
        if decoded.operations.len() != expected {
            return Err(Error::MalformedDocument(format!(
                "Content stream only partially readable: {} of {} operators decoded",
                decoded.operations.len(),
                expected
            )));
        }
        self.operations.extend(decoded.operations);
        Ok(())
    }

    fn skip_comment(&mut self) {
        while self.pos < self.data.len() && !matches!(self.data[self.pos], b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn regular_end(&self, from: usize) -> usize {
        let mut end = from;
        while end < self.data.len() && is_regular(self.data[end]) {
            end += 1;
        }
        end
    }

    fn literal_string_end(&self, start: usize) -> Result<usize> {
        let mut depth = 0usize;
        let mut i = start;
        while i < self.data.len() {
            match self.data[i] {
                b'\\' => i += 1,
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        Err(Error::MalformedDocument("Unterminated string in content stream".into()))
    }

    fn hex_string_end(&self, start: usize) -> Result<usize> {
        self.data[start..]
            .iter()
            .position(|&c| c == b'>')
            .map(|offset| start + offset + 1)
            .ok_or_else(|| Error::MalformedDocument("Unterminated hex string in content stream".into()))
    }

    /// Consumes `BI <dict> ID <data> EI` starting at `start` as one operation.
    fn inline_image(&mut self, start: usize) -> Result<()> {
        let unterminated = || Error::MalformedDocument("Unterminated inline image".into());
        let data = self.data;

        let mut i = start + 2;
        let mut declared_len: Option<usize> = None;
        let mut previous_key: Option<&[u8]> = None;
        let data_start = loop {
            while i < self.data.len() && is_whitespace(self.data[i]) {
                i += 1;
            }
            if i >= self.data.len() {
                return Err(unterminated());
            }
            let token_start = i;
            i = match self.data[i] {
                b'(' => self.literal_string_end(i)?,
                b'<' if self.data.get(i + 1) == Some(&b'<') => i + 2,
                b'<' => self.hex_string_end(i)?,
                b'/' => self.regular_end(i + 1),
                c if is_regular(c) => self.regular_end(i),
                _ => i + 1,
            };
            let token = &data[token_start..i];
            if token == b"ID" {
                // exactly one whitespace byte separates ID from the data
                break i + 1;
            }
            if let Some(key) = previous_key.take() {
                if matches!(key, b"/L" | b"/Length") {
                    declared_len = std::str::from_utf8(token).ok().and_then(|t| t.parse().ok());
                }
            }
            if token.starts_with(b"/") {
                previous_key = Some(token);
            }
        };

        let end = match declared_len {
            Some(len) => {
                let mut j = data_start.saturating_add(len);
                while j < self.data.len() && is_whitespace(self.data[j]) {
                    j += 1;
                }
                if self.data.get(j..j + 2) == Some(&b"EI"[..]) {
                    j + 2
                } else {
                    self.find_end_marker(data_start).ok_or_else(unterminated)?
                }
            }
            None => self.find_end_marker(data_start).ok_or_else(unterminated)?,
        };

        let raw = self.data[start..end].to_vec();
        self.operations.push(Operation::new(
            INLINE_IMAGE,
            vec![Object::String(raw, StringFormat::Literal)],
        ));
        self.pos = end;
        Ok(())
    }

    /// Offset just past the first `EI` that stands alone as a token.
    fn find_end_marker(&self, from: usize) -> Option<usize> {
        let data = self.data;
        (from.min(data.len())..data.len().saturating_sub(1)).find_map(|j| {
            let before = j == from || is_whitespace(data[j - 1]);
            let after = data.get(j + 2).map_or(true, |&c| is_whitespace(c) || is_delimiter(c));
            (data[j] == b'E' && data[j + 1] == b'I' && before && after).then_some(j + 2)
        })
    }
}
