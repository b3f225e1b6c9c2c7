use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::jobs::{Busy, JobController, JobError, JobEvent, JobId, JobKind, JobState};
use crate::pdf::{PdfDocument, Rasterizer};
use crate::selection::{PageEntry, Projection, RosterChange, SelectionError, SelectionModel};
use crate::worker::{self, JobOutput, LoadRequest, LoadedDocument, SaveRequest};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Busy(#[from] Busy),

    #[error("no document is open")]
    NoDocument,

    #[error("no pages are selected")]
    EmptySelection,

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("failed to create scratch directory")]
    Scratch(#[source] std::io::Error),
}

/// One opened source document and the thumbnails generated for it.
/// Dropping it removes the scratch directory.
struct DocumentSession {
    source_path: PathBuf,
    /// Canonical form of `source_path`, used to recognise a refresh.
    identity: PathBuf,
    page_count: usize,
    reader: Arc<PdfDocument>,
    scratch: TempDir,
}

/// Progress and results as the caller sees them.
#[derive(Debug)]
pub enum JobUpdate {
    Progress { kind: JobKind, percent: u8 },
    Loaded { path: PathBuf, pages: usize },
    Saved { path: PathBuf, pages: usize },
    Failed { kind: JobKind, error: JobError },
}

impl JobUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobUpdate::Progress { .. })
    }
}

/// Owns the open document, the roster and the job controller. Worker
/// results are applied only in `next_update` and `poll_updates`.
pub struct Session {
    rasterizer: Arc<dyn Rasterizer>,
    scratch_root: Option<PathBuf>,
    jobs: JobController<JobOutput>,
    document: Option<DocumentSession>,
    model: SelectionModel,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        let mut session = Self::with_rasterizer(Arc::new(config.rasterizer()));
        session.scratch_root = config.scratch_dir.clone();
        session
    }

    pub fn with_rasterizer(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Session {
            rasterizer,
            scratch_root: None,
            jobs: JobController::new(),
            document: None,
            model: SelectionModel::new(),
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.jobs.state() {
            JobState::Running { kind, .. } => {
                warn!(running = %kind, "rejecting request while a job is running");
                Err(Busy { running: *kind }.into())
            }
            _ => Ok(()),
        }
    }

    fn new_scratch(&self) -> Result<TempDir, SessionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdfpick-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(SessionError::Scratch)
    }

    /// Start rasterizing `path` in the background. The current document,
    /// roster and selection stay as they are until the load succeeds.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<JobId, SessionError> {
        self.ensure_idle()?;
        let path = path.as_ref().to_path_buf();
        let scratch = self.new_scratch()?;
        let handle = self.jobs.start(JobKind::Load)?;
        let id = handle.id();
        info!(path = %path.display(), scratch = %scratch.path().display(), "loading document");

        worker::spawn_load(
            LoadRequest {
                source: path,
                scratch,
                rasterizer: self.rasterizer.clone(),
            },
            handle,
        );
        Ok(id)
    }

    /// Start writing the selected pages, in ascending page order, to
    /// `destination`. Nothing is started if no page is selected.
    pub fn save(&mut self, destination: impl AsRef<Path>) -> Result<JobId, SessionError> {
        self.ensure_idle()?;
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let pages = self.model.selected_indices();
        if pages.is_empty() {
            return Err(SessionError::EmptySelection);
        }
        let reader = document.reader.clone();

        let handle = self.jobs.start(JobKind::Save)?;
        let id = handle.id();
        let destination = destination.as_ref().to_path_buf();
        info!(path = %destination.display(), pages = pages.len(), "saving selected pages");

        worker::spawn_save(
            SaveRequest {
                reader,
                pages,
                destination,
            },
            handle,
        );
        Ok(id)
    }

    /// Remove pages from the roster and from the selection.
    pub fn delete(&mut self, source_indices: &[usize]) -> usize {
        let removed = self.model.delete_from_roster(source_indices);
        debug!(requested = source_indices.len(), removed, "deleted pages from roster");
        removed
    }

    pub fn toggle_select(&mut self, source_index: usize, selected: bool) -> Result<bool, SessionError> {
        Ok(self.model.toggle_select(source_index, selected)?)
    }

    pub fn select_only(&mut self, source_index: usize) -> Result<(), SessionError> {
        Ok(self.model.select_only(source_index)?)
    }

    /// Select every page named by `text`. An empty result means the text
    /// named no pages.
    pub fn select_ranges(&mut self, text: &str) -> Result<BTreeSet<usize>, SessionError> {
        if self.document.is_none() {
            return Err(SessionError::NoDocument);
        }
        Ok(self.model.select_from_ranges(text)?)
    }

    pub fn clear_selection(&mut self) {
        self.model.clear_selection();
    }

    pub fn roster(&self) -> &[PageEntry] {
        self.model.project_all()
    }

    pub fn visible(&self, projection: Projection) -> Vec<&PageEntry> {
        self.model.project(projection)
    }

    pub fn selected(&self) -> Vec<usize> {
        self.model.selected_indices()
    }

    pub fn is_selected(&self, source_index: usize) -> bool {
        self.model.is_selected(source_index)
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.source_path.as_path())
    }

    /// Pages in the open document's original source.
    pub fn page_count(&self) -> Option<usize> {
        self.document.as_ref().map(|d| d.page_count)
    }

    pub fn scratch_dir(&self) -> Option<&Path> {
        self.document.as_ref().map(|d| d.scratch.path())
    }

    pub fn job_state(&self) -> &JobState {
        self.jobs.state()
    }

    pub fn acknowledge(&mut self) -> JobState {
        self.jobs.acknowledge()
    }

    /// Ask the running job to stop after its current page.
    pub fn cancel(&self) -> bool {
        self.jobs.cancel()
    }

    /// Wait for the next update from the running job. `None` when idle.
    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        let event = self.jobs.recv().await?;
        Some(self.apply(event))
    }

    /// Apply every update that has already arrived, without waiting.
    pub fn poll_updates(&mut self) -> Vec<JobUpdate> {
        let mut updates = Vec::new();
        while let Some(event) = self.jobs.try_recv() {
            updates.push(self.apply(event));
        }
        updates
    }

    /// Drive the running job to its end, passing progress to `on_progress`.
    /// The job is acknowledged before returning.
    pub async fn run_to_completion<F>(&mut self, mut on_progress: F) -> Option<Result<JobUpdate, JobError>>
    where
        F: FnMut(JobKind, u8),
    {
        while let Some(update) = self.next_update().await {
            match update {
                JobUpdate::Progress { kind, percent } => on_progress(kind, percent),
                JobUpdate::Failed { error, .. } => {
                    self.jobs.acknowledge();
                    return Some(Err(error));
                }
                done => {
                    self.jobs.acknowledge();
                    return Some(Ok(done));
                }
            }
        }
        None
    }

    fn apply(&mut self, event: JobEvent<JobOutput>) -> JobUpdate {
        match event {
            JobEvent::Progress { kind, percent } => JobUpdate::Progress { kind, percent },
            JobEvent::Completed {
                output: JobOutput::Loaded(loaded),
                ..
            } => self.install(loaded),
            JobEvent::Completed {
                output: JobOutput::Saved(saved),
                ..
            } => JobUpdate::Saved {
                path: saved.destination,
                pages: saved.page_count,
            },
            JobEvent::Failed { kind, error } => JobUpdate::Failed { kind, error },
        }
    }

    /// Replace the open document with a freshly loaded one.
    fn install(&mut self, loaded: LoadedDocument) -> JobUpdate {
        let LoadedDocument {
            source,
            reader,
            pages,
            scratch,
        } = loaded;

        let identity = std::fs::canonicalize(&source).unwrap_or_else(|_| source.clone());
        let change = match &self.document {
            Some(current) if current.identity == identity => RosterChange::Refresh,
            _ => RosterChange::NewDocument,
        };
        let page_count = reader.page_count();
        self.model.set_roster(pages, page_count, change);

        if let Some(previous) = self.document.take() {
            debug!(scratch = %previous.scratch.path().display(), "purging previous scratch directory");
            close_document(previous);
        }
        info!(path = %source.display(), pages = page_count, ?change, "document loaded");

        self.document = Some(DocumentSession {
            source_path: source.clone(),
            identity,
            page_count,
            reader,
            scratch,
        });
        JobUpdate::Loaded {
            path: source,
            pages: page_count,
        }
    }

    /// Release the document and remove its thumbnails. A running job is
    /// cancelled and its result discarded, so nothing reopens afterwards.
    pub fn close(&mut self) {
        if self.jobs.abandon() {
            info!("cancelled running job on close");
        }
        self.model.clear();
        if let Some(document) = self.document.take() {
            close_document(document);
        }
    }
}

fn close_document(document: DocumentSession) {
    let path = document.scratch.path().to_path_buf();
    if let Err(e) = document.scratch.close() {
        warn!(error = %e, scratch = %path.display(), "failed to remove scratch directory");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
