//! Content stream interpreter
//!
//! Walks a decoded operator list, tracking the graphics and text state far enough to
//! know the page-space box, decoded text and source position of every glyph drawn,
//! plus where images are painted. Form XObjects are entered with their own matrix and
//! resources. Nothing is rendered.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use lopdf::content::Operation;
use lopdf::{Object, ObjectId};

use super::fonts::FontMetrics;
use super::matrix::{number, Matrix};
use super::parser::{decode_operations, INLINE_IMAGE};
use super::streams::{FormXObject, PageResources};
use crate::error::Result;
use crate::types::BBox;

/// A glyph as painted on the page
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    pub bbox: BBox,
    /// Form XObject whose stream holds the glyph; `None` for the page's own content
    pub form: Option<ObjectId>,
    /// Index of the showing operator in that stream's operation list
    pub op_index: usize,
    /// String element inside a `TJ` array; always 0 for `Tj`, `'` and `"`
    pub element: usize,
    /// Bytes of the character code within that string
    pub bytes: Range<usize>,
    /// Advance in unscaled text space, including character and word spacing
    pub displacement: f64,
    pub font_size: f64,
}

impl Glyph {
    pub fn is_whitespace(&self) -> bool {
        !self.text.is_empty() && self.text.chars().all(char::is_whitespace)
    }
}

/// An image XObject painted by `Do`, or an inline image
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub form: Option<ObjectId>,
    pub op_index: usize,
    /// Resource name; empty for inline images
    pub name: Vec<u8>,
    /// The unit square under the CTM at the time of painting
    pub bbox: BBox,
}

/// Result of interpreting one page
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub operations: Vec<Operation>,
    pub glyphs: Vec<Glyph>,
    pub images: Vec<ImagePlacement>,
    /// Decoded operations of every form painted on the page
    pub forms: BTreeMap<ObjectId, Vec<Operation>>,
}

impl PageContent {
    /// Text of all glyphs in paint order
    pub fn text(&self) -> String {
        self.glyphs.iter().map(|g| g.text.as_str()).collect()
    }
}

/// Decodes and interprets raw content bytes. Content that cannot be read in full,
/// including that of a painted form, is a `MalformedDocument` error.
pub fn interpret(content: &[u8], resources: &PageResources) -> Result<PageContent> {
    interpret_operations(decode_operations(content)?, resources)
}

pub fn interpret_operations(operations: Vec<Operation>, resources: &PageResources) -> Result<PageContent> {
    let mut interpreter = Interpreter::new(resources, None);
    for (index, operation) in operations.iter().enumerate() {
        interpreter.step(index, operation)?;
    }
    Ok(PageContent {
        operations,
        glyphs: interpreter.glyphs,
        images: interpreter.images,
        forms: interpreter.forms,
    })
}

#[derive(Debug, Clone)]
struct TextState {
    font: Arc<FontMetrics>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scale: f64,
    leading: f64,
    rise: f64,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextState,
}

struct Interpreter<'r> {
    resources: &'r PageResources,
    form: Option<ObjectId>,
    fallback: Arc<FontMetrics>,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    glyphs: Vec<Glyph>,
    images: Vec<ImagePlacement>,
    forms: BTreeMap<ObjectId, Vec<Operation>>,
}

impl<'r> Interpreter<'r> {
    fn new(resources: &'r PageResources, form: Option<ObjectId>) -> Self {
        let fallback = Arc::new(FontMetrics::fallback());
        Self {
            resources,
            form,
            state: GraphicsState {
                ctm: Matrix::IDENTITY,
                text: TextState {
                    font: Arc::clone(&fallback),
                    font_size: 0.0,
                    char_spacing: 0.0,
                    word_spacing: 0.0,
                    horizontal_scale: 1.0,
                    leading: 0.0,
                    rise: 0.0,
                },
            },
            fallback,
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            glyphs: Vec::new(),
            images: Vec::new(),
            forms: BTreeMap::new(),
        }
    }

    fn step(&mut self, index: usize, op: &Operation) -> Result<()> {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);

        match op.operator.as_str() {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(saved) = self.stack.pop() {
                    self.state = saved;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.text_matrix = m;
                    self.line_matrix = m;
                }
            }
            "Td" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (num(0), num(1)) {
                    self.state.text.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "T*" => self.next_line(0.0, -self.state.text.leading),
            "TL" => {
                if let Some(v) = num(0) {
                    self.state.text.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = num(0) {
                    self.state.text.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = num(0) {
                    self.state.text.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = num(0) {
                    self.state.text.horizontal_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = num(0) {
                    self.state.text.rise = v;
                }
            }
            "Tf" => {
                let font = operands
                    .first()
                    .and_then(|o| o.as_name().ok())
                    .and_then(|name| self.resources.font(name))
                    .unwrap_or_else(|| Arc::clone(&self.fallback));
                self.state.text.font = font;
                if let Some(size) = num(1) {
                    self.state.text.font_size = size;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, index, 0);
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.text.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes, index, 0);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (num(0), num(1)) {
                    self.state.text.word_spacing = aw;
                    self.state.text.char_spacing = ac;
                }
                self.next_line(0.0, -self.state.text.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes, index, 0);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for (element, item) in items.iter().enumerate() {
                        match item {
                            Object::String(bytes, _) => self.show(bytes, index, element),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let text = &self.state.text;
                                    let tx = -adjust / 1000.0 * text.font_size * text.horizontal_scale;
                                    self.text_matrix = Matrix::translate(tx, 0.0).then(&self.text_matrix);
                                }
                            }
                        }
                    }
                }
            }
            "Do" => {
                if let Some(name) = operands.first().and_then(|o| o.as_name().ok()) {
                    if self.resources.is_image(name) {
                        self.place_image(index, name);
                    } else if let Some(form) = self.resources.form(name) {
                        self.paint_form(&form)?;
                    }
                }
            }
            INLINE_IMAGE => self.place_image(index, b""),
            _ => {}
        }
        Ok(())
    }

    /// Images fill the unit square of the current CTM.
    fn place_image(&mut self, op_index: usize, name: &[u8]) {
        self.images.push(ImagePlacement {
            form: self.form,
            op_index,
            name: name.to_vec(),
            bbox: self.state.ctm.transform_rect(0.0, 0.0, 1.0, 1.0),
        });
    }

    /// Runs the form's content under `Matrix × CTM` with the form's resources.
    fn paint_form(&mut self, form: &FormXObject) -> Result<()> {
        let operations = decode_operations(&form.data)?;

        let mut nested = Interpreter::new(&form.resources, Some(form.id));
        nested.state = self.state.clone();
        nested.state.ctm = form.matrix.then(&self.state.ctm);
        for (index, operation) in operations.iter().enumerate() {
            nested.step(index, operation)?;
        }

        self.glyphs.append(&mut nested.glyphs);
        self.images.append(&mut nested.images);
        for (id, inner) in nested.forms {
            self.forms.entry(id).or_insert(inner);
        }
        self.forms.entry(form.id).or_insert(operations);
        Ok(())
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn show(&mut self, bytes: &[u8], op_index: usize, element: usize) {
        let text = &self.state.text;
        let font = Arc::clone(&text.font);
        let size_matrix = Matrix::new(
            text.font_size * text.horizontal_scale,
            0.0,
            0.0,
            text.font_size,
            0.0,
            text.rise,
        );

        for code in font.codes(bytes) {
            let width = font.width(code.code);
            let render = size_matrix.then(&self.text_matrix).then(&self.state.ctm);
            let bbox = render.transform_rect(0.0, font.descent(), width, font.ascent());

            let mut displacement = width * text.font_size + text.char_spacing;
            if font.is_word_space(&code) {
                displacement += text.word_spacing;
            }

            self.glyphs.push(Glyph {
                text: font.decode(code.code),
                bbox,
                form: self.form,
                op_index,
                element,
                bytes: code.bytes,
                displacement,
                font_size: text.font_size,
            });
            self.text_matrix =
                Matrix::translate(displacement * text.horizontal_scale, 0.0).then(&self.text_matrix);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Stream};

    fn run(content: &str) -> PageContent {
        interpret(content.as_bytes(), &PageResources::default()).unwrap()
    }

    fn close(a: &BBox, b: &BBox) -> bool {
        (a.x0 - b.x0).abs() < 1e-6
            && (a.y0 - b.y0).abs() < 1e-6
            && (a.x1 - b.x1).abs() < 1e-6
            && (a.y1 - b.y1).abs() < 1e-6
    }

    #[test]
    fn test_tj_places_glyphs_along_baseline() {
        let page = run("BT /F1 10 Tf 100 700 Td (AB) Tj ET");
        assert_eq!(page.text(), "AB");
        assert!(close(&page.glyphs[0].bbox, &BBox::new(100.0, 698.0, 105.0, 708.0)));
        assert!(close(&page.glyphs[1].bbox, &BBox::new(105.0, 698.0, 110.0, 708.0)));
        assert_eq!(page.glyphs[1].bytes, 1..2);
        assert_eq!(page.glyphs[1].op_index, 3);
    }

    #[test]
    fn test_tj_array_kerning_and_spacing() {
        let page = run("BT /F1 10 Tf 2 Tc 0 0 Td [(A) -1000 (B)] TJ ET");
        // A advances 5 + 2, the kern adds 10
        assert!(close(&page.glyphs[1].bbox, &BBox::new(17.0, -2.0, 22.0, 8.0)));
        assert_eq!(page.glyphs[1].element, 2);
        assert_eq!(page.glyphs[0].displacement, 7.0);
    }

    #[test]
    fn test_word_spacing_only_on_space() {
        let page = run("BT /F1 10 Tf 4 Tw (a b) Tj ET");
        assert_eq!(page.glyphs[1].displacement, 9.0);
        assert!(page.glyphs[1].is_whitespace());
        assert!(close(&page.glyphs[2].bbox, &BBox::new(14.0, -2.0, 19.0, 8.0)));
    }

    #[test]
    fn test_ctm_scale_and_horizontal_scaling() {
        let page = run("q 2 0 0 2 0 0 cm BT /F1 10 Tf 50 Tz 10 10 Td (A) Tj ET Q BT /F1 10 Tf (B) Tj ET");
        assert!(close(&page.glyphs[0].bbox, &BBox::new(20.0, 16.0, 25.0, 36.0)));
        // restored CTM and Tz after Q
        assert!(close(&page.glyphs[1].bbox, &BBox::new(0.0, -2.0, 5.0, 8.0)));
    }

    #[test]
    fn test_next_line_operators() {
        let page = run("BT /F1 10 Tf 14 TL 0 100 Td (A) Tj T* (B) Tj (C) ' ET");
        let baselines: Vec<f64> = page.glyphs.iter().map(|g| (g.bbox.y0 + 2.0).round()).collect();
        assert_eq!(baselines, vec![100.0, 86.0, 72.0]);
        assert_eq!(page.glyphs[2].bbox.x0, 0.0);
    }

    #[test]
    fn test_image_placement() {
        let mut doc = Document::with_version("1.5");
        let image = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! { "XObject" => dictionary! { "Im1" => image } },
        });
        let resources = PageResources::load(&doc, page_id);

        let page = interpret(b"q 50 0 0 40 10 20 cm /Im1 Do Q /Im2 Do", &resources).unwrap();
        assert_eq!(page.images.len(), 1);
        assert!(close(&page.images[0].bbox, &BBox::new(10.0, 20.0, 60.0, 60.0)));
        assert_eq!(page.images[0].op_index, 2);
    }

    #[test]
    fn test_inline_image_placement_and_following_text() {
        let page = run("q 20 0 0 10 5 5 cm BI /W 2 /H 1 /BPC 8 /CS /G ID \x01\x02 EI Q BT /F1 10 Tf (A) Tj ET");
        assert_eq!(page.images.len(), 1);
        assert!(page.images[0].name.is_empty());
        assert!(close(&page.images[0].bbox, &BBox::new(5.0, 5.0, 25.0, 15.0)));
        assert_eq!(page.text(), "A");
    }

    #[test]
    fn test_form_glyphs_use_form_matrix_and_stream() {
        let mut doc = Document::with_version("1.5");
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), (-50).into()],
            },
            b"BT /F1 10 Tf 100 700 Td (B) Tj ET".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form } },
        });
        let resources = PageResources::load(&doc, page_id);

        let page = interpret(
            b"BT /F1 10 Tf 100 700 Td (A) Tj ET q 2 0 0 2 0 0 cm /Fm1 Do Q",
            &resources,
        )
        .unwrap();
        assert_eq!(page.text(), "AB");
        assert_eq!(page.glyphs[0].form, None);
        assert_eq!(page.glyphs[1].form, Some(form));
        assert_eq!(page.glyphs[1].op_index, 3);
        // form space (100, 650) lands at (200, 1300) under the doubled CTM
        assert!(close(&page.glyphs[1].bbox, &BBox::new(200.0, 1296.0, 210.0, 1316.0)));
        assert_eq!(page.forms[&form].len(), 5);
    }

    #[test]
    fn test_unreadable_form_content_is_an_error() {
        let mut doc = Document::with_version("1.5");
        let form = doc.add_object(Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Form" },
            b"BT (a) Tj ET ] 0 g".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! { "XObject" => dictionary! { "Fm1" => form } },
        });
        let resources = PageResources::load(&doc, page_id);

        let err = interpret(b"/Fm1 Do", &resources).unwrap_err();
        assert!(matches!(err, crate::error::Error::MalformedDocument(_)));
    }
}
