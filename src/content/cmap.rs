//! ToUnicode CMap parsing
//!
//! Only the `bfchar` and `bfrange` sections are read; that is all a ToUnicode map
//! needs to turn character codes into text.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

/// Largest range expanded from a single `bfrange` entry
const MAX_RANGE_SPAN: u32 = 0xFFFF;

lazy_static! {
    static ref BFCHAR_SECTION: Regex = Regex::new(r"(?s)beginbfchar(.*?)endbfchar").unwrap();
    static ref BFRANGE_SECTION: Regex = Regex::new(r"(?s)beginbfrange(.*?)endbfrange").unwrap();
    static ref CODESPACE_SECTION: Regex =
        Regex::new(r"(?s)begincodespacerange(.*?)endcodespacerange").unwrap();
    static ref BFCHAR_ENTRY: Regex =
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap();
    static ref BFRANGE_ENTRY: Regex = Regex::new(
        r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[([^\]]*)\])"
    )
    .unwrap();
    static ref HEX_STRING: Regex = Regex::new(r"<([0-9A-Fa-f]*)>").unwrap();
}

/// Code to Unicode mapping from a font's `/ToUnicode` stream
#[derive(Debug, Clone, Default)]
pub struct ToUnicodeMap {
    map: HashMap<u32, String>,
    code_bytes: Option<usize>,
}

impl ToUnicodeMap {
    pub fn parse(data: &[u8]) -> Self {
        let source = String::from_utf8_lossy(data);
        let mut cmap = ToUnicodeMap::default();

        if let Some(section) = CODESPACE_SECTION.captures(&source) {
            cmap.code_bytes = HEX_STRING
                .captures(&section[1])
                .map(|c| c[1].len().div_ceil(2))
                .filter(|len| (1..=4).contains(len));
        }

        for section in BFCHAR_SECTION.captures_iter(&source) {
            for entry in BFCHAR_ENTRY.captures_iter(&section[1]) {
                if let Some(code) = parse_code(&entry[1]) {
                    cmap.map.insert(code, utf16_hex(&entry[2]));
                }
            }
        }

        for section in BFRANGE_SECTION.captures_iter(&source) {
            for entry in BFRANGE_ENTRY.captures_iter(&section[1]) {
                let (Some(lo), Some(hi)) = (parse_code(&entry[1]), parse_code(&entry[2])) else {
                    continue;
                };
                if hi < lo || hi - lo > MAX_RANGE_SPAN {
                    continue;
                }
                if let Some(base) = entry.get(3) {
                    let units = utf16_units(base.as_str());
                    for (offset, code) in (lo..=hi).enumerate() {
                        cmap.map.insert(code, offset_last_unit(&units, offset as u32));
                    }
                } else if let Some(list) = entry.get(4) {
                    for (code, target) in (lo..=hi).zip(HEX_STRING.captures_iter(list.as_str())) {
                        cmap.map.insert(code, utf16_hex(&target[1]));
                    }
                }
            }
        }

        cmap
    }

    pub fn lookup(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    /// Code width declared by the codespace range, if any
    pub fn code_bytes(&self) -> Option<usize> {
        self.code_bytes
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn parse_code(hex: &str) -> Option<u32> {
    if hex.is_empty() || hex.len() > 8 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}

fn utf16_units(hex: &str) -> Vec<u16> {
    hex.as_bytes()
        .chunks(4)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .filter_map(|chunk| u16::from_str_radix(chunk, 16).ok())
        .collect()
}

fn utf16_hex(hex: &str) -> String {
    String::from_utf16_lossy(&utf16_units(hex))
}

fn offset_last_unit(units: &[u16], offset: u32) -> String {
    let mut units = units.to_vec();
    if let Some(last) = units.last_mut() {
        *last = last.wrapping_add(offset as u16);
    }
    String::from_utf16_lossy(&units)
}
