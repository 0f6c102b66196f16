//! Redaction Applier Implementation
//!
//! Marks are first committed as `/Redact` annotations, then applied: every glyph whose
//! center falls inside a pending redaction is cut out of its string operand, image
//! XObject placements fully inside one are dropped, and a black fill is drawn on top.
//! The page is rewritten as `[guard, body, overlay]`; the old content streams become
//! unreferenced and are pruned, so no copy of the removed bytes survives in the file.
//!
//! Text or images drawn through a Form XObject are removed from a copy of the form.
//! The page gets its own `/Resources` pointing at the copy, so other pages painting
//! the same form are left untouched.

use std::collections::{BTreeMap, HashMap, HashSet};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::content::matrix::number;
use crate::content::streams::{inherited_resources, GUARD_KEY, OVERLAY_KEY};
use crate::content::{
    encode_operations, interpret, load_pdf, page_content_streams, resolve, resolve_dict,
    ContentStreamRole, Glyph, ImagePlacement, PageContent, PageResources, MAX_FORM_DEPTH,
};
use crate::error::{Error, Result};
use crate::types::{BBox, Document, RedactionMark};

/// Overlay rectangles closer than this are the same rectangle
const RECT_TOLERANCE: f64 = 0.01;

/// What one application removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSummary {
    pub pages_rewritten: usize,
    pub glyphs_removed: usize,
    pub images_removed: usize,
    pub fills_added: usize,
    /// Form XObjects copied with content removed
    pub forms_rewritten: usize,
}

impl RedactionSummary {
    pub fn changed(&self) -> bool {
        self.pages_rewritten > 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RedactionApplier;

impl RedactionApplier {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, document: Document, marks: &[RedactionMark]) -> Result<Document> {
        self.apply_with_summary(document, marks).map(|(document, _)| document)
    }

    /// Applies `marks` and reports what changed. When nothing under the marks is
    /// left to remove and every fill is already present, the input is returned as is.
    #[instrument(skip_all, fields(marks = marks.len()))]
    pub fn apply_with_summary(
        &self,
        document: Document,
        marks: &[RedactionMark],
    ) -> Result<(Document, RedactionSummary)> {
        let mut summary = RedactionSummary::default();
        if marks.is_empty() {
            info!("🖍️ No marks, document passes through");
            return Ok((document, summary));
        }

        let mut pdf = load_pdf(document.as_bytes())?;
        let page_ids: Vec<ObjectId> = pdf.get_pages().into_values().collect();

        let mut per_page: BTreeMap<usize, Vec<BBox>> = BTreeMap::new();
        for mark in marks {
            match page_ids.get(mark.page as usize) {
                Some(_) => per_page.entry(mark.page as usize).or_default().push(mark.bbox),
                None => warn!("⚠️ Mark on page {} ignored, document has {} pages", mark.page, page_ids.len()),
            }
        }

        // Every page is scanned for pending redactions, including ones already in the input.
        for (position, page_id) in page_ids.iter().enumerate() {
            let committed = per_page.get(&position).map_or(0, Vec::len);
            if let Some(rects) = per_page.get(&position) {
                commit_annotations(&mut pdf, *page_id, rects)?;
            }
            let pending = take_pending_redactions(&mut pdf, *page_id)?;
            if pending.is_empty() {
                continue;
            }
            let inherited = pending.len() > committed;
            if self.redact_page(&mut pdf, *page_id, &pending, inherited, &mut summary)? {
                summary.pages_rewritten += 1;
            }
        }

        if !summary.changed() {
            info!("🖍️ Marks already applied, document unchanged");
            return Ok((document, summary));
        }

        let pruned = pdf.prune_objects();
        debug!("Pruned {} unreferenced objects", pruned.len());

        let mut output = Vec::new();
        pdf.save_to(&mut output)
            .map_err(|e| Error::RedactionWriteFailure(e.to_string()))?;

        info!(
            "🖍️ Redacted {} glyphs and {} images on {} pages",
            summary.glyphs_removed, summary.images_removed, summary.pages_rewritten
        );
        Ok((Document::from_bytes(output), summary))
    }

    /// Returns whether the page was rewritten.
    fn redact_page(
        &self,
        pdf: &mut lopdf::Document,
        page_id: ObjectId,
        pending: &[BBox],
        inherited: bool,
        summary: &mut RedactionSummary,
    ) -> Result<bool> {
        let parts = page_content_streams(pdf, page_id);
        let mut body = Vec::new();
        let mut existing_fills = Vec::new();
        for part in &parts {
            match part.role {
                ContentStreamRole::Body => {
                    body.extend_from_slice(&part.data);
                    body.push(b'\n');
                }
                ContentStreamRole::Overlay => existing_fills.extend(overlay_rects(&part.data)),
                ContentStreamRole::Guard => {}
            }
        }

        let resources = PageResources::load(pdf, page_id);
        let content = interpret(&body, &resources).map_err(|e| {
            Error::RedactionWriteFailure(format!("page content cannot be rewritten: {}", e))
        })?;
        let PageContent {
            operations,
            glyphs,
            images,
            forms,
        } = content;

        let doomed_glyphs: Vec<&Glyph> = glyphs
            .iter()
            .filter(|glyph| {
                let (x, y) = glyph.bbox.center();
                pending.iter().any(|rect| rect.contains_point(x, y))
            })
            .collect();
        let doomed_images: Vec<&ImagePlacement> = images
            .iter()
            .filter(|image| pending.iter().any(|rect| rect.contains(&image.bbox)))
            .collect();

        let rewritten = rewrite(&operations, None, &doomed_glyphs, &doomed_images);
        let mut glyphs_removed = rewritten.glyphs_removed;
        let mut images_removed = rewritten.images_removed;

        let mut form_content: HashMap<ObjectId, Vec<u8>> = HashMap::new();
        for (id, form_operations) in &forms {
            let form = rewrite(form_operations, Some(*id), &doomed_glyphs, &doomed_images);
            if form.glyphs_removed == 0 && form.images_removed == 0 {
                continue;
            }
            glyphs_removed += form.glyphs_removed;
            images_removed += form.images_removed;
            let encoded = encode_operations(form.operations)
                .map_err(|e| Error::RedactionWriteFailure(format!("form {:?}: {}", id, e)))?;
            form_content.insert(*id, encoded);
        }

        let mut fills = existing_fills.clone();
        for rect in pending.iter().map(rounded) {
            if !fills.iter().any(|f| same_rect(f, &rect)) {
                fills.push(rect);
            }
        }
        let fills_added = fills.len() - existing_fills.len();

        if glyphs_removed == 0 && images_removed == 0 && fills_added == 0 && !inherited {
            return Ok(false);
        }

        let body = encode_operations(rewritten.operations)
            .map_err(|e| Error::RedactionWriteFailure(e.to_string()))?;

        let guard_id = pdf.add_object(Stream::new(dictionary! { GUARD_KEY => true }, b"q\n".to_vec()));
        let body_id = pdf.add_object(Stream::new(dictionary! {}, body));
        let overlay_id = pdf.add_object(Stream::new(dictionary! { OVERLAY_KEY => true }, overlay(&fills)));

        page_dict_mut(pdf, page_id)?.set(
            "Contents",
            vec![
                Object::Reference(guard_id),
                Object::Reference(body_id),
                Object::Reference(overlay_id),
            ],
        );

        if !form_content.is_empty() {
            let page_resources = inherited_resources(pdf, page_id).cloned().unwrap_or_default();
            let mut copies = HashMap::new();
            if let Some(rewired) = rewire_resources(pdf, &page_resources, &form_content, &mut copies, 0)? {
                page_dict_mut(pdf, page_id)?.set("Resources", rewired);
            }
            summary.forms_rewritten += form_content.len();
        }

        debug!(
            "Page {:?}: removed {} glyphs, {} images, {} new fills, {} forms copied",
            page_id,
            glyphs_removed,
            images_removed,
            fills_added,
            form_content.len()
        );
        summary.glyphs_removed += glyphs_removed;
        summary.images_removed += images_removed;
        summary.fills_added += fills_added;
        Ok(true)
    }
}

/// Returns a copy of `resources` whose XObjects lead to rewritten form copies, or
/// `None` when no form below it changed. `copies` maps an original form to its copy.
fn rewire_resources(
    pdf: &mut lopdf::Document,
    resources: &Dictionary,
    replaced: &HashMap<ObjectId, Vec<u8>>,
    copies: &mut HashMap<ObjectId, Option<ObjectId>>,
    depth: usize,
) -> Result<Option<Dictionary>> {
    let Some(mut xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve_dict(pdf, o))
        .cloned()
    else {
        return Ok(None);
    };

    let entries: Vec<(Vec<u8>, ObjectId)> = xobjects
        .iter()
        .filter_map(|(name, o)| o.as_reference().ok().map(|id| (name.clone(), id)))
        .collect();
    let mut changed = false;
    for (name, id) in entries {
        if let Some(copy) = rewire_form(pdf, id, replaced, copies, depth)? {
            xobjects.set(name, Object::Reference(copy));
            changed = true;
        }
    }
    if !changed {
        return Ok(None);
    }

    let mut rewired = resources.clone();
    rewired.set("XObject", Object::Dictionary(xobjects));
    Ok(Some(rewired))
}

/// Copies form `id` when its own content or a nested form changed.
fn rewire_form(
    pdf: &mut lopdf::Document,
    id: ObjectId,
    replaced: &HashMap<ObjectId, Vec<u8>>,
    copies: &mut HashMap<ObjectId, Option<ObjectId>>,
    depth: usize,
) -> Result<Option<ObjectId>> {
    if let Some(known) = copies.get(&id) {
        return Ok(*known);
    }
    if depth >= MAX_FORM_DEPTH {
        return Ok(None);
    }
    let original = match pdf.get_object(id) {
        Ok(Object::Stream(stream)) => stream.clone(),
        _ => return Ok(None),
    };
    let is_form = original
        .dict
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        == Some(&b"Form"[..]);
    if !is_form {
        return Ok(None);
    }

    // placeholder while descending so a self-referencing form terminates
    copies.insert(id, None);
    let nested = match original
        .dict
        .get(b"Resources")
        .ok()
        .and_then(|o| resolve_dict(pdf, o))
        .cloned()
    {
        Some(resources) => rewire_resources(pdf, &resources, replaced, copies, depth + 1)?,
        None => None,
    };
    let content = replaced.get(&id);
    if nested.is_none() && content.is_none() {
        return Ok(None);
    }

    let mut dict = original.dict.clone();
    if let Some(resources) = nested {
        dict.set("Resources", resources);
    }
    let copy = match content {
        Some(bytes) => {
            dict.remove(b"Filter");
            dict.remove(b"DecodeParms");
            Stream::new(dict, bytes.clone())
        }
        None => {
            let mut copy = original;
            copy.dict = dict;
            copy
        }
    };
    let copy_id = pdf.add_object(copy);
    copies.insert(id, Some(copy_id));
    debug!("Form {:?} copied to {:?}", id, copy_id);
    Ok(Some(copy_id))
}

fn page_dict_mut(pdf: &mut lopdf::Document, page_id: ObjectId) -> Result<&mut Dictionary> {
    pdf.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| Error::RedactionWriteFailure(format!("page {:?}: {}", page_id, e)))
}

fn redact_annotation(rect: &BBox) -> Dictionary {
    dictionary! {
        "Type" => "Annot",
        "Subtype" => "Redact",
        "Rect" => vec![
            Object::Real(rect.x0 as f32),
            Object::Real(rect.y0 as f32),
            Object::Real(rect.x1 as f32),
            Object::Real(rect.y1 as f32),
        ],
        "IC" => vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    }
}

/// Adds one `/Redact` annotation per mark to the page.
fn commit_annotations(pdf: &mut lopdf::Document, page_id: ObjectId, rects: &[BBox]) -> Result<()> {
    let mut annotations: Vec<Object> = rects
        .iter()
        .map(|rect| Object::Dictionary(redact_annotation(rect)))
        .collect();

    let existing = page_dict_mut(pdf, page_id)?.get(b"Annots").ok().cloned();
    match existing {
        Some(Object::Reference(id)) => {
            if let Ok(Object::Array(items)) = pdf.get_object_mut(id) {
                items.append(&mut annotations);
                return Ok(());
            }
            page_dict_mut(pdf, page_id)?.set("Annots", annotations);
        }
        Some(Object::Array(mut items)) => {
            items.append(&mut annotations);
            page_dict_mut(pdf, page_id)?.set("Annots", items);
        }
        _ => page_dict_mut(pdf, page_id)?.set("Annots", annotations),
    }
    Ok(())
}

/// Removes every `/Redact` annotation from the page and returns their rectangles.
fn take_pending_redactions(pdf: &mut lopdf::Document, page_id: ObjectId) -> Result<Vec<BBox>> {
    let existing = page_dict_mut(pdf, page_id)?.get(b"Annots").ok().cloned();
    let (array_id, items) = match existing {
        Some(Object::Reference(id)) => match pdf.get_object(id) {
            Ok(Object::Array(items)) => (Some(id), items.clone()),
            _ => return Ok(Vec::new()),
        },
        Some(Object::Array(items)) => (None, items),
        _ => return Ok(Vec::new()),
    };

    let mut rects = Vec::new();
    let mut kept = Vec::new();
    for item in items {
        let dict = resolve_dict(pdf, &item);
        let is_redact = dict
            .and_then(|d| d.get(b"Subtype").ok())
            .and_then(|o| o.as_name().ok())
            == Some(&b"Redact"[..]);
        if !is_redact {
            kept.push(item);
            continue;
        }
        if let Some(rect) = dict.and_then(|d| annotation_rect(pdf, d)) {
            rects.push(rect);
        }
    }

    if rects.is_empty() {
        return Ok(rects);
    }
    match array_id {
        Some(id) => {
            if let Ok(object) = pdf.get_object_mut(id) {
                *object = Object::Array(kept);
            }
        }
        None if kept.is_empty() => {
            page_dict_mut(pdf, page_id)?.remove(b"Annots");
        }
        None => page_dict_mut(pdf, page_id)?.set("Annots", kept),
    }
    Ok(rects)
}

fn annotation_rect(pdf: &lopdf::Document, annotation: &Dictionary) -> Option<BBox> {
    let values: Vec<f64> = resolve(pdf, annotation.get(b"Rect").ok()?)?
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| resolve(pdf, o).and_then(number))
        .collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => Some(BBox::new(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

struct Rewrite {
    operations: Vec<Operation>,
    glyphs_removed: usize,
    images_removed: usize,
}

/// Drops doomed glyphs and images drawn by `source` (the page body when `None`) from
/// its operation list. Stray `Q` operators are removed and unclosed `q` are closed so
/// the content cannot escape the guard.
fn rewrite(
    source_operations: &[Operation],
    source: Option<ObjectId>,
    glyphs: &[&Glyph],
    images: &[&ImagePlacement],
) -> Rewrite {
    let mut doomed: BTreeMap<usize, Vec<&Glyph>> = BTreeMap::new();
    for glyph in glyphs.iter().copied().filter(|g| g.form == source) {
        doomed.entry(glyph.op_index).or_default().push(glyph);
    }
    // a form painted twice yields the same glyph once per placement
    for shown in doomed.values_mut() {
        shown.sort_by_key(|g| (g.element, g.bytes.start));
        shown.dedup_by_key(|g| (g.element, g.bytes.start));
    }
    let doomed_images: HashSet<usize> = images
        .iter()
        .filter(|image| image.form == source)
        .map(|image| image.op_index)
        .collect();

    let glyphs_removed = doomed.values().map(Vec::len).sum();
    let mut operations = Vec::with_capacity(source_operations.len());
    let mut depth = 0usize;

    for (index, op) in source_operations.iter().enumerate() {
        match op.operator.as_str() {
            "q" => depth += 1,
            "Q" if depth == 0 => continue,
            "Q" => depth -= 1,
            _ => {}
        }
        if doomed_images.contains(&index) {
            continue;
        }
        match doomed.get(&index) {
            Some(glyphs) => operations.extend(rewrite_show(op, glyphs)),
            None => operations.push(op.clone()),
        }
    }
    operations.extend((0..depth).map(|_| Operation::new("Q", vec![])));

    Rewrite {
        operations,
        glyphs_removed,
        images_removed: doomed_images.len(),
    }
}

/// Replaces a text-showing operator with the equivalent `TJ` minus the doomed glyphs.
fn rewrite_show(op: &Operation, glyphs: &[&Glyph]) -> Vec<Operation> {
    let mut prefix = Vec::new();
    let shown: Vec<Object> = match op.operator.as_str() {
        "TJ" => match op.operands.first() {
            Some(Object::Array(items)) => items.clone(),
            _ => return vec![op.clone()],
        },
        "Tj" => op.operands.first().cloned().into_iter().collect(),
        "'" => {
            prefix.push(Operation::new("T*", vec![]));
            op.operands.first().cloned().into_iter().collect()
        }
        "\"" => {
            if op.operands.len() < 3 {
                return vec![op.clone()];
            }
            prefix.push(Operation::new("Tw", vec![op.operands[0].clone()]));
            prefix.push(Operation::new("Tc", vec![op.operands[1].clone()]));
            prefix.push(Operation::new("T*", vec![]));
            vec![op.operands[2].clone()]
        }
        _ => return vec![op.clone()],
    };

    let mut array = Vec::with_capacity(shown.len() + glyphs.len());
    for (element, item) in shown.into_iter().enumerate() {
        match item {
            Object::String(bytes, format) => {
                let mut removed: Vec<&Glyph> = glyphs.iter().copied().filter(|g| g.element == element).collect();
                if removed.is_empty() {
                    array.push(Object::String(bytes, format));
                    continue;
                }
                removed.sort_by_key(|g| g.bytes.start);
                split_string(&bytes, format, &removed, &mut array);
            }
            other => array.push(other),
        }
    }

    prefix.push(Operation::new("TJ", vec![Object::Array(array)]));
    prefix
}

/// Pushes the kept runs of `bytes` and a kerning adjustment for each removed glyph.
fn split_string(bytes: &[u8], format: StringFormat, removed: &[&Glyph], out: &mut Vec<Object>) {
    let mut cursor = 0;
    let mut pending_shift = 0.0f64;

    let flush_shift = |shift: &mut f64, out: &mut Vec<Object>| {
        if *shift != 0.0 {
            out.push(Object::Real(*shift as f32));
            *shift = 0.0;
        }
    };

    for glyph in removed {
        let start = glyph.bytes.start.min(bytes.len());
        let end = glyph.bytes.end.min(bytes.len());
        if start > cursor {
            flush_shift(&mut pending_shift, out);
            out.push(Object::String(bytes[cursor..start].to_vec(), format));
        }
        // A TJ number n moves the pen by -n/1000 * Tfs * Th; the glyph moved it by
        // displacement * Th.
        if glyph.font_size.abs() > f64::EPSILON {
            pending_shift -= 1000.0 * glyph.displacement / glyph.font_size;
        }
        cursor = cursor.max(end);
    }
    flush_shift(&mut pending_shift, out);
    if cursor < bytes.len() {
        out.push(Object::String(bytes[cursor..].to_vec(), format));
    }
}

fn rounded(rect: &BBox) -> BBox {
    let round = |v: f64| (v * 1000.0).round() / 1000.0;
    BBox::new(round(rect.x0), round(rect.y0), round(rect.x1), round(rect.y1))
}

fn same_rect(a: &BBox, b: &BBox) -> bool {
    (a.x0 - b.x0).abs() <= RECT_TOLERANCE
        && (a.y0 - b.y0).abs() <= RECT_TOLERANCE
        && (a.x1 - b.x1).abs() <= RECT_TOLERANCE
        && (a.y1 - b.y1).abs() <= RECT_TOLERANCE
}

/// Closes the guard's `q`, then fills every rectangle in black in default user space.
fn overlay(fills: &[BBox]) -> Vec<u8> {
    let mut out = String::from("Q\nq\n0 g\n");
    for rect in fills {
        out.push_str(&format!(
            "{:.3} {:.3} {:.3} {:.3} re\n",
            rect.x0,
            rect.y0,
            rect.width(),
            rect.height()
        ));
    }
    out.push_str("f\nQ\n");
    out.into_bytes()
}

fn overlay_rects(data: &[u8]) -> Vec<BBox> {
    let Ok(content) = Content::decode(data) else {
        return Vec::new();
    };
    content
        .operations
        .iter()
        .filter(|op| op.operator == "re")
        .filter_map(|op| {
            let values: Vec<f64> = op.operands.iter().filter_map(number).collect();
            match values.as_slice() {
                [x, y, w, h] => Some(BBox::new(*x, *y, x + w, y + h)),
                _ => None,
            }
        })
        .collect()
}
