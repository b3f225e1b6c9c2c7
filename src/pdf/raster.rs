use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::{ImageFormat, RgbaImage};
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
use thiserror::Error;
use tracing::{debug, warn};

use super::document::{DocumentError, PdfDocument};

#[derive(Debug, Error)]
pub enum RasterError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("PDFium library is unavailable: {detail}")]
    Unavailable { detail: String },

    #[error("PDFium failed to render: {detail}")]
    Render { detail: String },

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RasterError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }

    fn render(e: impl fmt::Display) -> Self {
        Self::Render {
            detail: e.to_string(),
        }
    }
}

/// Turns one page of an opened document into encoded image bytes.
pub trait Rasterizer: Send + Sync {
    /// Encoded image bytes (PNG) for the zero-based page `index`.
    fn rasterize(&self, doc: &PdfDocument, index: usize) -> Result<Vec<u8>, RasterError>;

    /// File extension for the bytes `rasterize` produces.
    fn extension(&self) -> &'static str {
        "png"
    }
}

pub const DEFAULT_DPI: f32 = 100.0;
pub const DEFAULT_MAX_DIMENSION: u32 = 2000;

/// PDF user space unit, in inches.
const POINTS_PER_INCH: f32 = 72.0;

/// Pixel size of a page rendered at `dpi`, scaled down so neither side
/// exceeds `max_dimension`, and the points-to-pixels scale used.
pub fn thumbnail_size(width_pt: f32, height_pt: f32, dpi: f32, max_dimension: u32) -> (u32, u32, f32) {
    let width_pt = width_pt.max(1.0);
    let height_pt = height_pt.max(1.0);
    let max_dimension = max_dimension.max(1);

    let mut scale = dpi / POINTS_PER_INCH;
    let longest = width_pt.max(height_pt) * scale;
    if longest > max_dimension as f32 {
        scale *= max_dimension as f32 / longest;
    }

    let width = ((width_pt * scale).round() as u32).clamp(1, max_dimension);
    let height = ((height_pt * scale).round() as u32).clamp(1, max_dimension);
    (width, height, scale)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RasterError> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

static PDFIUM: OnceLock<Result<Pdfium, String>> = OnceLock::new();

/// Bind the PDFium shared library, trying `library_dir`, the executable's
/// directory and the working directory before the system library path.
fn bind_pdfium(library_dir: Option<&Path>) -> Result<Pdfium, String> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    let candidates = library_dir
        .map(Path::to_path_buf)
        .into_iter()
        .chain(exe_dir)
        .chain(Some(PathBuf::from("./")));

    for dir in candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)) {
            debug!(dir = %dir.display(), "bound PDFium library");
            return Ok(Pdfium::new(bindings));
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| e.to_string())
}

/// Renders pages with PDFium at a fixed resolution, so text, images and
/// vector art all show up in the thumbnail.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    dpi: f32,
    max_dimension: u32,
    library_dir: Option<PathBuf>,
}

impl Default for PdfiumRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_DPI, DEFAULT_MAX_DIMENSION)
    }
}

impl PdfiumRasterizer {
    pub fn new(dpi: f32, max_dimension: u32) -> Self {
        Self {
            dpi: if dpi > 0.0 { dpi } else { DEFAULT_DPI },
            max_dimension: max_dimension.max(1),
            library_dir: None,
        }
    }

    /// Look for the PDFium library in `dir` first.
    pub fn with_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.library_dir = Some(dir.into());
        self
    }

    pub fn dpi(&self) -> f32 {
        self.dpi
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// The process-wide PDFium binding. The first caller's library
    /// directory wins.
    pub fn pdfium(&self) -> Result<&'static Pdfium, RasterError> {
        let bound = PDFIUM.get_or_init(|| {
            let result = bind_pdfium(self.library_dir.as_deref());
            if let Err(e) = &result {
                warn!(error = %e, "failed to bind PDFium library");
            }
            result
        });
        bound.as_ref().map_err(|detail| RasterError::Unavailable {
            detail: detail.clone(),
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, doc: &PdfDocument, index: usize) -> Result<Vec<u8>, RasterError> {
        doc.page_id(index)?;
        let page_index = u16::try_from(index)
            .map_err(|_| RasterError::render(format!("page {} is past PDFium's page limit", index + 1)))?;

        // PDFium keeps its own parse of the file; each call opens it afresh.
        let document = self
            .pdfium()?
            .load_pdf_from_file(&doc.path, None)
            .map_err(RasterError::render)?;
        let page = document.pages().get(page_index).map_err(RasterError::render)?;

        let (width, height, _) = thumbnail_size(
            page.width().value,
            page.height().value,
            self.dpi,
            self.max_dimension,
        );
        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page.render_with_config(&config).map_err(RasterError::render)?;

        let image = RgbaImage::from_raw(
            bitmap.width() as u32,
            bitmap.height() as u32,
            bitmap.as_rgba_bytes().to_vec(),
        )
        .ok_or_else(|| RasterError::render("bitmap size does not match its dimensions"))?;
        encode_png(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FixtureBuilder;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn pdfium_or_skip(rasterizer: &PdfiumRasterizer) -> bool {
        match rasterizer.pdfium() {
            Ok(_) => true,
            Err(e) => {
                eprintln!("skipping, {e}");
                false
            }
        }
    }

    /// One 400x120 page with a line of Helvetica text and nothing else.
    fn write_text_page(path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(48)]),
                Operation::new("Td", vec![Object::Integer(20), Object::Integer(40)]),
                Operation::new("Tj", vec![Object::string_literal("Slide title")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(400),
                Object::Integer(120),
            ],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_thumbnail_size_follows_dpi() {
        assert_eq!(thumbnail_size(200.0, 100.0, 72.0, 2000), (200, 100, 1.0));
        let (w, h, _) = thumbnail_size(612.0, 792.0, 100.0, 2000);
        assert_eq!((w, h), (850, 1100));
    }

    #[test]
    fn test_thumbnail_size_clamps_longest_side() {
        let (w, h, _) = thumbnail_size(200.0, 100.0, 144.0, 100);
        assert_eq!((w, h), (100, 50));
        let (w, h, _) = thumbnail_size(100.0, 4000.0, 100.0, 2000);
        assert_eq!(h, 2000);
        assert!(w >= 1 && w <= 60);
    }

    #[test]
    fn test_settings_are_sanitised() {
        let r = PdfiumRasterizer::new(-5.0, 0);
        assert_eq!(r.dpi(), DEFAULT_DPI);
        assert_eq!(r.max_dimension(), 1);
    }

    #[test]
    fn test_out_of_range_page_fails_before_rendering() {
        let doc = FixtureBuilder::new(1).build();
        assert!(matches!(
            PdfiumRasterizer::default().rasterize(&doc, 5),
            Err(RasterError::Document(DocumentError::PageOutOfRange { page: 6, total: 1 }))
        ));
    }

    #[test]
    fn test_text_page_is_not_blank() {
        let rasterizer = PdfiumRasterizer::new(72.0, 2000);
        if !pdfium_or_skip(&rasterizer) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.pdf");
        write_text_page(&path);
        let doc = PdfDocument::open(&path).unwrap();

        let png = rasterizer.rasterize(&doc, 0).unwrap();
        let img = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(img.dimensions(), (400, 120));
        let inked = img.pixels().filter(|p| p.0 != [255, 255, 255]).count();
        assert!(inked > 100, "only {inked} non-white pixels");
    }

    #[test]
    fn test_fixture_pages_render_differently() {
        let rasterizer = PdfiumRasterizer::new(36.0, 400);
        if !pdfium_or_skip(&rasterizer) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = FixtureBuilder::new(2).write_to(dir.path().join("two.pdf"));
        let doc = PdfDocument::open(&path).unwrap();
        let a = rasterizer.rasterize(&doc, 0).unwrap();
        let b = rasterizer.rasterize(&doc, 1).unwrap();
        assert_ne!(a, b);
    }
}
