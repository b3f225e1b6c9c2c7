pub mod document;
pub mod raster;

pub use document::{save_atomic, DocumentError, PageExtraction, PdfDocument};
pub use raster::{PdfiumRasterizer, RasterError, Rasterizer};
