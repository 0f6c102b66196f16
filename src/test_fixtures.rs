//! PDF builders shared by unit tests

use lopdf::{dictionary, Object, Stream};

use crate::types::Document;

/// Content of one fixture page, drawn with Helvetica (`/F1`) at 12 pt
pub(crate) struct PageSpec {
    content: String,
}

impl PageSpec {
    /// One `Tj` per `(x, y, text)` line.
    pub fn lines(lines: &[(f64, f64, &str)]) -> Self {
        let content = lines
            .iter()
            .map(|(x, y, text)| format!("BT /F1 12 Tf {} {} Td ({}) Tj ET\n", x, y, text))
            .collect();
        Self { content }
    }

    pub fn raw(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Paints `/Im1` over the given rectangle.
    pub fn with_image(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.content
            .push_str(&format!("q {} 0 0 {} {} {} cm /Im1 Do Q\n", width, height, x, y));
        self
    }

    /// Paints the fixture form `/Fm1`.
    pub fn with_form(mut self) -> Self {
        self.content.push_str("/Fm1 Do\n");
        self
    }
}

pub(crate) struct TestFixtures;

impl TestFixtures {
    /// A PDF with an Info dictionary and XMP metadata
    pub fn pdf(pages: &[PageSpec]) -> Document {
        Document::from_bytes(Self::pdf_bytes(pages))
    }

    pub fn pdf_bytes(pages: &[PageSpec]) -> Vec<u8> {
        Self::build(pages, None)
    }

    /// Every page's resources name a shared form `/Fm1` drawing `form_content` with
    /// `/F1`, shifted 50 pt down by its matrix.
    pub fn pdf_with_form(pages: &[PageSpec], form_content: &str) -> Document {
        Document::from_bytes(Self::build(pages, Some(form_content)))
    }

    fn build(pages: &[PageSpec], form_content: Option<&str>) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        ));
        let mut xobjects = dictionary! { "Im1" => image_id };
        if let Some(form_content) = form_content {
            let form_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                    "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), (-50).into()],
                    "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
                },
                form_content.as_bytes().to_vec(),
            ));
            xobjects.set("Fm1", form_id);
        }

        let mut kids = Vec::new();
        for spec in pages {
            let content_id = doc.add_object(Stream::new(dictionary! {}, spec.content.as_bytes().to_vec()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id },
                    "XObject" => xobjects.clone(),
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let xmp_id = doc.add_object(Stream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"><dc:creator>Jane Roe</dc:creator></x:xmpmeta>"
                .to_vec(),
        ));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Metadata" => xmp_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Quarterly Report"),
            "Author" => Object::string_literal("Jane Roe"),
            "Producer" => Object::string_literal("fixture writer 1.0"),
            "CreationDate" => Object::string_literal("D:20240101120000Z"),
            "Company" => Object::string_literal("Acme Clinic"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture PDF serializes");
        bytes
    }
}
