use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info};

use super::{spawn_named, JobOutput};
use crate::jobs::{JobError, JobHandle};
use crate::pdf::{PdfDocument, Rasterizer};
use crate::selection::PageEntry;

pub struct LoadRequest {
    pub source: PathBuf,
    /// Fresh directory the thumbnails are written into. It travels with the
    /// result, so it is removed if the load fails.
    pub scratch: TempDir,
    pub rasterizer: Arc<dyn Rasterizer>,
}

pub struct LoadedDocument {
    pub source: PathBuf,
    pub reader: Arc<PdfDocument>,
    pub pages: Vec<PageEntry>,
    pub scratch: TempDir,
}

impl fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("source", &self.source)
            .field("pages", &self.pages.len())
            .field("scratch", &self.scratch.path())
            .finish()
    }
}

/// Open `request.source` and rasterize every page in order, one at a time.
/// Any failure fails the whole load.
pub fn rasterize_document(
    request: LoadRequest,
    handle: &mut JobHandle<JobOutput>,
) -> Result<LoadedDocument, JobError> {
    let LoadRequest {
        source,
        scratch,
        rasterizer,
    } = request;

    let reader = PdfDocument::open(&source)?;
    let total = reader.page_count();
    if total == 0 {
        return Err(JobError::EmptyDocument);
    }
    info!(path = %source.display(), pages = total, "rasterizing document");

    let mut pages = Vec::with_capacity(total);
    for index in 0..total {
        handle.cancellation().check()?;

        let bytes = rasterizer
            .rasterize(&reader, index)
            .map_err(|source| JobError::Rasterize {
                page: index + 1,
                source,
            })?;
        let raster_path = scratch
            .path()
            .join(format!("page_{index:04}.{}", rasterizer.extension()));
        std::fs::write(&raster_path, &bytes).map_err(|source| JobError::Write {
            path: raster_path.clone(),
            source,
        })?;
        debug!(page = index + 1, path = %raster_path.display(), "page rasterized");

        pages.push(PageEntry {
            source_index: index,
            raster_path,
        });
        handle.progress(index + 1, total);
    }

    Ok(LoadedDocument {
        source,
        reader: Arc::new(reader),
        pages,
        scratch,
    })
}

pub fn spawn_load(request: LoadRequest, mut handle: JobHandle<JobOutput>) {
    spawn_named("pdfpick-load", move || {
        let result = rasterize_document(request, &mut handle);
        handle.finish(result.map(JobOutput::Loaded));
    });
}
