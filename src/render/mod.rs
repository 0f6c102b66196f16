//! Page Rasterizer Implementation
//!
//! Renders page 0 to JPEG for the classifier. Rendering is best effort: a document
//! without pages, a missing PDFium library or a rendering error all yield `None`.

use std::fmt::Debug;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::config::RasterConfig;
use crate::types::{Document, RasterImage};
use crate::utils::WorkingScope;

/// PDF user space units per inch
const POINTS_PER_INCH: f32 = 72.0;

pub trait PageRasterizer: Send + Sync + Debug {
    /// Raster of page 0, or `None` when there is nothing to render.
    fn rasterize(&self, document: &Document, scope: &WorkingScope) -> Option<RasterImage>;
}

#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    config: RasterConfig,
}

impl PdfiumRasterizer {
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }

    fn bind(&self) -> Result<Pdfium, String> {
        if let Some(dir) = &self.config.pdfium_library_path {
            let library = Pdfium::pdfium_platform_library_name_at_path(dir);
            match Pdfium::bind_to_library(&library) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => debug!("PDFium not loadable from {}: {}", library.display(), e),
            }
        }
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| format!("PDFium library unavailable: {}", e))
    }

    fn render(&self, path: &Path) -> Result<Option<RasterImage>, String> {
        let pdfium = self.bind()?;
        let pdf = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| format!("cannot open document: {}", e))?;

        let pages = pdf.pages();
        if pages.len() == 0 {
            return Ok(None);
        }
        let page = pages.get(0).map_err(|e| format!("cannot load page 0: {}", e))?;

        let scale = self.config.dpi as f32 / POINTS_PER_INCH;
        let width = (page.width().value * scale).round().max(1.0) as i32;
        let height = (page.height().value * scale).round().max(1.0) as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("cannot render page 0: {}", e))?;
        let rgb = bitmap.as_image().to_rgb8();

        let mut encoded = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut encoded, self.config.jpeg_quality)
            .encode_image(&rgb)
            .map_err(|e| format!("cannot encode JPEG: {}", e))?;

        Ok(Some(RasterImage::jpeg(encoded.into_inner(), rgb.width(), rgb.height())))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    #[instrument(skip_all, fields(dpi = self.config.dpi))]
    fn rasterize(&self, document: &Document, scope: &WorkingScope) -> Option<RasterImage> {
        let path: PathBuf = match scope.spill("raster-input.pdf", document.as_bytes()) {
            Ok(path) => path,
            Err(e) => {
                warn!("⚠️ Cannot stage document for rendering: {}", e);
                return None;
            }
        };

        match self.render(&path) {
            Ok(Some(image)) => {
                info!("🖼️ Rendered page 0 at {}x{}", image.width, image.height);
                Some(image)
            }
            Ok(None) => {
                info!("🖼️ Document has no pages to render");
                None
            }
            Err(e) => {
                warn!("⚠️ No raster for classification: {}", e);
                None
            }
        }
    }
}
