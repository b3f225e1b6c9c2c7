use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::{spawn_named, JobOutput};
use crate::jobs::{JobError, JobHandle};
use crate::pdf::{save_atomic, PdfDocument};

pub struct SaveRequest {
    pub reader: Arc<PdfDocument>,
    /// Source page indices, in output order.
    pub pages: Vec<usize>,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDocument {
    pub destination: PathBuf,
    pub page_count: usize,
}

/// Copy `request.pages` into a new document at `request.destination`.
/// Nothing is written at the destination unless every step succeeds.
pub fn extract_document(
    request: SaveRequest,
    handle: &mut JobHandle<JobOutput>,
) -> Result<SavedDocument, JobError> {
    let SaveRequest {
        reader,
        pages,
        destination,
    } = request;

    // the final write counts as one more step
    let steps = pages.len() + 1;
    let mut extraction = reader.extraction()?;
    for (done, &index) in pages.iter().enumerate() {
        handle.cancellation().check()?;
        extraction.push(index)?;
        handle.progress(done + 1, steps);
    }

    handle.cancellation().check()?;
    let mut doc = extraction.finish()?;
    save_atomic(&mut doc, &destination)?;
    handle.progress(steps, steps);

    info!(path = %destination.display(), pages = pages.len(), "saved selected pages");
    Ok(SavedDocument {
        destination,
        page_count: pages.len(),
    })
}

pub fn spawn_save(request: SaveRequest, mut handle: JobHandle<JobOutput>) {
    spawn_named("pdfpick-save", move || {
        let result = extract_document(request, &mut handle);
        handle.finish(result.map(JobOutput::Saved));
    });
}
