//! Page content streams and inherited resources

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::debug;

use super::fonts::FontMetrics;
use super::matrix::Matrix;
use super::{resolve, resolve_dict, stream_bytes};

/// Marks the `q` stream placed in front of a redacted page body
pub const GUARD_KEY: &[u8] = b"RedactionGuard";
/// Marks the stream carrying the black fills of a redacted page
pub const OVERLAY_KEY: &[u8] = b"RedactionOverlay";

const MAX_TREE_DEPTH: usize = 64;

/// What a stream in a page's `/Contents` is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStreamRole {
    Body,
    Guard,
    Overlay,
}

#[derive(Debug, Clone)]
pub struct ContentStreamPart {
    pub id: Option<ObjectId>,
    pub role: ContentStreamRole,
    pub data: Vec<u8>,
}

/// Every stream of a page's `/Contents`, in paint order
pub fn page_content_streams(doc: &Document, page_id: ObjectId) -> Vec<ContentStreamPart> {
    let Some(page) = doc.get_object(page_id).ok().and_then(|o| o.as_dict().ok()) else {
        return Vec::new();
    };
    let Ok(contents) = page.get(b"Contents") else {
        return Vec::new();
    };

    let entries: Vec<&Object> = match resolve(doc, contents) {
        Some(Object::Array(items)) => items.iter().collect(),
        Some(_) => vec![contents],
        None => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.as_reference().ok();
            let stream = resolve(doc, entry)?.as_stream().ok()?;
            let flagged = |key: &[u8]| {
                stream
                    .dict
                    .get(key)
                    .ok()
                    .and_then(|o| o.as_bool().ok())
                    .unwrap_or(false)
            };
            let role = if flagged(GUARD_KEY) {
                ContentStreamRole::Guard
            } else if flagged(OVERLAY_KEY) {
                ContentStreamRole::Overlay
            } else {
                ContentStreamRole::Body
            };
            Some(ContentStreamPart {
                id,
                role,
                data: stream_bytes(stream),
            })
        })
        .collect()
}

/// Concatenated content of a page, as a viewer would paint it
pub fn page_content(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let mut content = Vec::new();
    for part in page_content_streams(doc, page_id) {
        content.extend_from_slice(&part.data);
        content.push(b'\n');
    }
    content
}

/// The `/Resources` that apply to a page, walking up `/Parent` when needed
pub fn inherited_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Some(resources) = node.get(b"Resources").ok().and_then(|o| resolve_dict(doc, o)) {
            return Some(resources);
        }
        node = node.get(b"Parent").ok().and_then(|o| resolve_dict(doc, o))?;
    }
    None
}

/// Form XObjects nested deeper than this are not entered
pub const MAX_FORM_DEPTH: usize = 8;

/// A Form XObject a page can paint with `Do`
#[derive(Debug)]
pub struct FormXObject {
    pub id: ObjectId,
    /// Form space to user space, applied before the CTM in effect at `Do`
    pub matrix: Matrix,
    pub data: Vec<u8>,
    /// The form's own `/Resources`, or those of the painting page when absent
    pub resources: PageResources,
}

/// Fonts, image XObject names and forms a page's content can reference
#[derive(Debug, Default, Clone)]
pub struct PageResources {
    fonts: HashMap<Vec<u8>, Arc<FontMetrics>>,
    images: HashSet<Vec<u8>>,
    forms: HashMap<Vec<u8>, Arc<FormXObject>>,
}

impl PageResources {
    pub fn load(doc: &Document, page_id: ObjectId) -> Self {
        let Some(dict) = inherited_resources(doc, page_id) else {
            return PageResources::default();
        };
        let resources = Self::from_dict(doc, dict, &mut Vec::new());
        debug!(
            "Page {:?}: {} fonts, {} images, {} forms",
            page_id,
            resources.fonts.len(),
            resources.images.len(),
            resources.forms.len()
        );
        resources
    }

    /// `chain` holds the forms being loaded above this dictionary; a form already on
    /// it is self-referencing and skipped.
    fn from_dict(doc: &Document, dict: &Dictionary, chain: &mut Vec<ObjectId>) -> Self {
        let mut resources = PageResources::default();

        if let Some(fonts) = dict.get(b"Font").ok().and_then(|o| resolve_dict(doc, o)) {
            for (name, font) in fonts.iter() {
                if let Some(font) = resolve_dict(doc, font) {
                    resources
                        .fonts
                        .insert(name.clone(), Arc::new(FontMetrics::from_dict(doc, font)));
                }
            }
        }

        let Some(xobjects) = dict.get(b"XObject").ok().and_then(|o| resolve_dict(doc, o)) else {
            return resources;
        };
        let subtype = |xobject: &Object| {
            resolve(doc, xobject)
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|o| o.as_name().ok())
                .map(<[u8]>::to_vec)
        };

        for (name, xobject) in xobjects.iter() {
            if subtype(xobject).as_deref() == Some(&b"Image"[..]) {
                resources.images.insert(name.clone());
            }
        }

        for (name, xobject) in xobjects.iter() {
            if subtype(xobject).as_deref() != Some(&b"Form"[..]) {
                continue;
            }
            let Ok(id) = xobject.as_reference() else {
                continue;
            };
            if chain.contains(&id) || chain.len() >= MAX_FORM_DEPTH {
                debug!("Not entering form {:?}: nested too deep or self-referencing", id);
                continue;
            }
            let Some(stream) = resolve(doc, xobject).and_then(|o| o.as_stream().ok()) else {
                continue;
            };

            chain.push(id);
            let nested = match stream.dict.get(b"Resources").ok().and_then(|o| resolve_dict(doc, o)) {
                Some(own) => Self::from_dict(doc, own, chain),
                None => PageResources {
                    fonts: resources.fonts.clone(),
                    images: resources.images.clone(),
                    forms: HashMap::new(),
                },
            };
            chain.pop();

            let matrix = stream
                .dict
                .get(b"Matrix")
                .ok()
                .and_then(|o| resolve(doc, o))
                .and_then(|o| o.as_array().ok())
                .and_then(|items| Matrix::from_operands(items))
                .unwrap_or_default();

            resources.forms.insert(
                name.clone(),
                Arc::new(FormXObject {
                    id,
                    matrix,
                    data: stream_bytes(stream),
                    resources: nested,
                }),
            );
        }

        resources
    }

    pub fn font(&self, name: &[u8]) -> Option<Arc<FontMetrics>> {
        self.fonts.get(name).cloned()
    }

    pub fn is_image(&self, name: &[u8]) -> bool {
        self.images.contains(name)
    }

    pub fn form(&self, name: &[u8]) -> Option<Arc<FormXObject>> {
        self.forms.get(name).cloned()
    }
}
