use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::pdf::raster::{PdfiumRasterizer, DEFAULT_DPI, DEFAULT_MAX_DIMENSION};

/// Settings read from an optional TOML file, e.g.
///
/// ```toml
/// thumbnail_dpi = 72
/// max_thumbnail_px = 1200
/// scratch_dir = "/var/tmp"
/// pdfium_dir = "/opt/pdfium/lib"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub thumbnail_dpi: f32,
    pub max_thumbnail_px: u32,
    /// Where per-session thumbnail directories are created. Defaults to the
    /// system temp directory.
    pub scratch_dir: Option<PathBuf>,
    /// Directory holding the PDFium shared library, searched before the
    /// executable's directory and the system library path.
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thumbnail_dpi: DEFAULT_DPI,
            max_thumbnail_px: DEFAULT_MAX_DIMENSION,
            scratch_dir: None,
            pdfium_dir: None,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid configuration")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("In config file {}", path.display()))
    }

    /// The file at `path` if given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn rasterizer(&self) -> PdfiumRasterizer {
        let rasterizer = PdfiumRasterizer::new(self.thumbnail_dpi, self.max_thumbnail_px);
        match &self.pdfium_dir {
            Some(dir) => rasterizer.with_library_dir(dir),
            None => rasterizer,
        }
    }
}
