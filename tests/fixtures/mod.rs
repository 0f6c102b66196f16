//! Shared builders and stand-ins for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{dictionary, Object, Stream};
use pii_redact::{
    ClassifierError, Classifier, Document, PageRasterizer, Pipeline, ProcessingConfig, RasterImage,
    StaticKeyProvider, SymmetricKey, WorkingScope,
};

pub const AUTHOR: &str = "Jane Roe";

pub struct TestFixtures;

impl TestFixtures {
    /// One page per entry; each line is `(x, y, text)` drawn with Helvetica at 12 pt.
    pub fn pdf(pages: &[&[(f64, f64, &str)]]) -> Vec<u8> {
        let contents: Vec<String> = pages
            .iter()
            .map(|lines| {
                lines
                    .iter()
                    .map(|(x, y, text)| format!("BT /F1 12 Tf {} {} Td ({}) Tj ET\n", x, y, text))
                    .collect()
            })
            .collect();
        Self::pdf_with_contents(&contents)
    }

    /// A single page drawing `content` verbatim.
    pub fn pdf_with_content(content: &str) -> Vec<u8> {
        Self::pdf_with_contents(&[content.to_string()])
    }

    pub fn pdf_with_contents(contents: &[String]) -> Vec<u8> {
        Self::build(contents, None)
    }

    /// A single page drawing `content`, whose resources also name a form `/Fm1`
    /// drawing `form_content` with `/F1`, shifted 50 pt down by its matrix.
    pub fn pdf_with_form(content: &str, form_content: &str) -> Vec<u8> {
        Self::build(&[content.to_string()], Some(form_content))
    }

    fn build(contents: &[String], form_content: Option<&str>) -> Vec<u8> {
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
            vec![0x40],
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
        for content in contents {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
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
            format!("<x:xmpmeta><dc:creator>{}</dc:creator></x:xmpmeta>", AUTHOR).into_bytes(),
        ));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Metadata" => xmp_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Patient intake"),
            "Author" => Object::string_literal(AUTHOR),
            "Creator" => Object::string_literal("Intake Desk"),
            "Producer" => Object::string_literal("fixture writer 2.1"),
            "CreationDate" => Object::string_literal("D:20240301090000Z"),
            "ModDate" => Object::string_literal("D:20240302090000Z"),
            "Clinic" => Object::string_literal("Northside"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("fixture PDF serializes");
        bytes
    }

    pub fn key() -> SymmetricKey {
        SymmetricKey::from_bytes("fixture", &[0x5A; 32]).expect("32-byte key")
    }

    /// A pipeline whose scratch space lives under `root`.
    pub fn pipeline(
        root: &std::path::Path,
        classifier: Arc<dyn Classifier>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Pipeline {
        let mut config = ProcessingConfig::default();
        config.scope.temp_root = Some(root.to_path_buf());
        Self::pipeline_with(config, classifier, rasterizer)
    }

    pub fn pipeline_with(
        config: ProcessingConfig,
        classifier: Arc<dyn Classifier>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Pipeline {
        Pipeline::new(
            config,
            Arc::new(StaticKeyProvider::new(Self::key())),
            classifier,
            rasterizer,
        )
    }

    /// Every string value of the Info dictionary, keyed by name
    pub fn info_entries(pdf: &[u8]) -> Vec<(String, Vec<u8>)> {
        let doc = lopdf::Document::load_mem(pdf).expect("output loads");
        let info = match doc.trailer.get(b"Info").expect("Info present") {
            Object::Reference(id) => doc.get_dictionary(*id).expect("Info dictionary").clone(),
            Object::Dictionary(dict) => dict.clone(),
            other => panic!("unexpected Info {:?}", other),
        };
        info.iter()
            .map(|(key, value)| {
                let bytes = match value {
                    Object::String(bytes, _) => bytes.clone(),
                    other => format!("{:?}", other).into_bytes(),
                };
                (String::from_utf8_lossy(key).into_owned(), bytes)
            })
            .collect()
    }

    pub fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle.as_bytes())
    }
}

/// Returns the same text for every image and counts calls.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    text: String,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, _image: &RasterImage) -> Result<String, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Always fails as if the service were down
#[derive(Debug, Default)]
pub struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn recognize(&self, _image: &RasterImage) -> Result<String, ClassifierError> {
        Err(ClassifierError::Transport("connection refused".into()))
    }
}

/// Produces a placeholder JPEG without rendering anything
#[derive(Debug, Default)]
pub struct BlankRasterizer;

impl PageRasterizer for BlankRasterizer {
    fn rasterize(&self, _document: &Document, _scope: &WorkingScope) -> Option<RasterImage> {
        Some(RasterImage::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 1, 1))
    }
}

/// Behaves like a renderer without PDFium available
#[derive(Debug, Default)]
pub struct NoRasterizer;

impl PageRasterizer for NoRasterizer {
    fn rasterize(&self, _document: &Document, _scope: &WorkingScope) -> Option<RasterImage> {
        None
    }
}
