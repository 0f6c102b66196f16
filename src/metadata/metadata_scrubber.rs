//! Metadata Scrubber Implementation
//!
//! The Info dictionary is replaced by one holding only the standard fields, each set to an
//! empty string. XMP `/Metadata` streams and `/PieceInfo` private data are unlinked from the
//! catalog and every page, then pruned with everything else that became unreachable.

use lopdf::{Dictionary, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::content::load_pdf;
use crate::error::{Error, Result};
use crate::types::Document;

/// Info fields kept, emptied, in the output
pub const INFO_FIELDS: [&str; 8] = [
    "Title",
    "Author",
    "Subject",
    "Keywords",
    "Creator",
    "Producer",
    "CreationDate",
    "ModDate",
];

const PRIVATE_KEYS: [&[u8]; 2] = [b"Metadata", b"PieceInfo"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubSummary {
    /// Standard fields that carried a value
    pub fields_cleared: usize,
    /// Non-standard Info keys dropped
    pub keys_removed: usize,
    /// `/Metadata` and `/PieceInfo` entries unlinked
    pub streams_unlinked: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataScrubber;

impl MetadataScrubber {
    pub fn new() -> Self {
        Self
    }

    pub fn scrub(&self, document: Document) -> Result<Document> {
        self.scrub_with_summary(document).map(|(document, _)| document)
    }

    /// Scrubs unconditionally. A document that is already scrubbed is returned as is.
    #[instrument(skip_all, fields(bytes = document.len()))]
    pub fn scrub_with_summary(&self, document: Document) -> Result<(Document, ScrubSummary)> {
        let mut pdf = load_pdf(document.as_bytes())?;
        if is_scrubbed(&pdf) {
            info!("🧽 Metadata already empty");
            return Ok((document, ScrubSummary::default()));
        }

        let mut summary = ScrubSummary::default();
        replace_info(&mut pdf, &mut summary)?;

        let mut holders: Vec<ObjectId> = pdf.get_pages().into_values().collect();
        if let Some(catalog_id) = catalog_id(&pdf) {
            holders.push(catalog_id);
        }
        for id in holders {
            if let Ok(dict) = pdf.get_object_mut(id).and_then(Object::as_dict_mut) {
                for key in PRIVATE_KEYS {
                    if dict.remove(key).is_some() {
                        summary.streams_unlinked += 1;
                    }
                }
            }
        }

        let pruned = pdf.prune_objects();
        debug!("Pruned {} unreferenced objects", pruned.len());

        let mut output = Vec::new();
        pdf.save_to(&mut output)
            .map_err(|e| Error::MetadataWriteFailure(e.to_string()))?;

        info!(
            "🧽 Cleared {} Info fields, dropped {} keys, unlinked {} metadata streams",
            summary.fields_cleared, summary.keys_removed, summary.streams_unlinked
        );
        Ok((Document::from_bytes(output), summary))
    }
}

fn empty_string() -> Object {
    Object::String(Vec::new(), StringFormat::Literal)
}

fn catalog_id(pdf: &lopdf::Document) -> Option<ObjectId> {
    pdf.trailer.get(b"Root").and_then(Object::as_reference).ok()
}

fn info_dict<'a>(pdf: &'a lopdf::Document) -> Option<&'a Dictionary> {
    match pdf.trailer.get(b"Info").ok()? {
        Object::Reference(id) => pdf.get_object(*id).and_then(Object::as_dict).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn is_empty_info(dict: &Dictionary) -> bool {
    dict.len() == INFO_FIELDS.len()
        && INFO_FIELDS.iter().all(|field| {
            matches!(dict.get(field.as_bytes()), Ok(Object::String(bytes, _)) if bytes.is_empty())
        })
}

fn is_scrubbed(pdf: &lopdf::Document) -> bool {
    if !info_dict(pdf).map_or(false, is_empty_info) {
        return false;
    }
    let mut holders: Vec<ObjectId> = pdf.get_pages().into_values().collect();
    holders.extend(catalog_id(pdf));
    holders.into_iter().all(|id| {
        pdf.get_object(id)
            .and_then(Object::as_dict)
            .map_or(true, |dict| PRIVATE_KEYS.iter().all(|key| !dict.has(key)))
    })
}

fn replace_info(pdf: &mut lopdf::Document, summary: &mut ScrubSummary) -> Result<()> {
    if let Some(old) = info_dict(pdf) {
        for (key, value) in old.iter() {
            let standard = INFO_FIELDS.iter().any(|field| field.as_bytes() == key.as_slice());
            match value {
                _ if !standard => summary.keys_removed += 1,
                Object::String(bytes, _) if bytes.is_empty() => {}
                _ => summary.fields_cleared += 1,
            }
        }
    }

    let mut emptied = Dictionary::new();
    for field in INFO_FIELDS {
        emptied.set(field, empty_string());
    }

    match pdf.trailer.get(b"Info") {
        Ok(Object::Reference(id)) if pdf.objects.contains_key(id) => {
            let id = *id;
            pdf.objects.insert(id, Object::Dictionary(emptied));
        }
        Ok(Object::Reference(_)) | Ok(Object::Dictionary(_)) | Err(_) => {
            let id = pdf.add_object(emptied);
            pdf.trailer.set("Info", id);
        }
        Ok(_) => {
            return Err(Error::MetadataWriteFailure(
                "trailer /Info is neither a dictionary nor a reference".to_string(),
            ))
        }
    }
    Ok(())
}
