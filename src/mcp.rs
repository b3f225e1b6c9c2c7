use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use pdfpick::page_range;
use pdfpick::{Config, JobState, JobUpdate, Projection, Session, SessionError};

// Request structs for tools

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PathRequest {
    #[schemars(description = "Path to the PDF file")]
    pub path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListPagesRequest {
    #[schemars(description = "Only list selected pages (default: false)")]
    #[serde(default)]
    pub selected_only: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PagesRequest {
    #[schemars(description = "Page ranges, one-based (e.g., '1-3,5,7')")]
    pub pages: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SetSelectedRequest {
    #[schemars(description = "One-based page number")]
    pub page: usize,
    #[schemars(description = "Whether the page should be selected")]
    pub selected: bool,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveRequest {
    #[schemars(description = "Output file path")]
    pub output: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct EmptyRequest {}

#[derive(Clone)]
pub struct PageSelectorServer {
    session: Arc<Mutex<Session>>,
    tool_router: ToolRouter<Self>,
}

impl PageSelectorServer {
    pub fn new(config: &Config) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new(config))),
            tool_router: Self::tool_router(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("Error: {}", e))
}

fn error_text(e: &SessionError) -> String {
    format!("Error: {}", e)
}

fn describe(update: &JobUpdate) -> String {
    match update {
        JobUpdate::Progress { kind, percent } => format!("{kind}: {percent}%"),
        JobUpdate::Loaded { path, pages } => format!("loaded {} ({pages} pages)", path.display()),
        JobUpdate::Saved { path, pages } => format!("saved {pages} page(s) to {}", path.display()),
        JobUpdate::Failed { kind, error } => format!("{kind} failed: {error}"),
    }
}

fn status_of(session: &Session, updates: Vec<String>) -> JobStatusResult {
    let (state, kind, progress, error) = match session.job_state() {
        JobState::Idle => ("idle", None, None, None),
        JobState::Running { kind, progress } => ("running", Some(kind.to_string()), Some(*progress), None),
        JobState::Completed { kind } => ("completed", Some(kind.to_string()), Some(100), None),
        JobState::Failed { kind, reason } => {
            ("failed", Some(kind.to_string()), None, Some(reason.clone()))
        }
    };
    JobStatusResult {
        state: state.to_string(),
        kind,
        progress,
        error,
        updates,
        document: session.source_path().map(|p| p.display().to_string()),
        page_count: session.page_count(),
        selected: session.selected().iter().map(|p| p + 1).collect(),
    }
}

#[tool_router]
impl PageSelectorServer {
    #[tool(description = "Open a PDF and start rendering page thumbnails in the background. Poll job_status until the load completes.")]
    async fn open_document(&self, Parameters(PathRequest { path }): Parameters<PathRequest>) -> String {
        let mut session = self.session.lock().await;
        match session.load(&path) {
            Ok(_) => to_json(&status_of(&session, Vec::new())),
            Err(e) => error_text(&e),
        }
    }

    #[tool(description = "Report the state of the current background job and apply any results that have arrived. A finished job is acknowledged by this call.")]
    async fn job_status(&self, Parameters(_): Parameters<EmptyRequest>) -> String {
        let mut session = self.session.lock().await;
        let updates: Vec<String> = session.poll_updates().iter().map(describe).collect();
        let status = status_of(&session, updates);
        if !session.job_state().is_running() {
            session.acknowledge();
        }
        to_json(&status)
    }

    #[tool(description = "List the pages of the open document with their thumbnail paths and selection state")]
    async fn list_pages(&self, Parameters(req): Parameters<ListPagesRequest>) -> String {
        let session = self.session.lock().await;
        let projection = if req.selected_only {
            Projection::SelectedOnly
        } else {
            Projection::All
        };
        let result: Vec<PageResult> = session
            .visible(projection)
            .into_iter()
            .map(|entry| PageResult {
                page: entry.source_index + 1,
                thumbnail: entry.raster_path.display().to_string(),
                selected: session.is_selected(entry.source_index),
            })
            .collect();
        to_json(&result)
    }

    #[tool(description = "Add pages to the selection using range syntax like '1-3,5,7'")]
    async fn select_pages(&self, Parameters(req): Parameters<PagesRequest>) -> String {
        let mut session = self.session.lock().await;
        match session.select_ranges(&req.pages) {
            Ok(pages) if pages.is_empty() => "Error: no valid pages found in the input range".to_string(),
            Ok(_) => to_json(&SelectionResult {
                selected: session.selected().iter().map(|p| p + 1).collect(),
            }),
            Err(e) => error_text(&e),
        }
    }

    #[tool(description = "Select or deselect a single page")]
    async fn set_page_selected(&self, Parameters(req): Parameters<SetSelectedRequest>) -> String {
        let mut session = self.session.lock().await;
        let Some(index) = req.page.checked_sub(1) else {
            return "Error: page numbers start at 1".to_string();
        };
        match session.toggle_select(index, req.selected) {
            Ok(_) => to_json(&SelectionResult {
                selected: session.selected().iter().map(|p| p + 1).collect(),
            }),
            Err(e) => error_text(&e),
        }
    }

    #[tool(description = "Remove pages from the page list; they are also removed from the selection")]
    async fn delete_pages(&self, Parameters(req): Parameters<PagesRequest>) -> String {
        let mut session = self.session.lock().await;
        let Some(total) = session.page_count() else {
            return error_text(&SessionError::NoDocument);
        };
        let pages = match page_range::resolve(&req.pages, total) {
            Ok(p) => p,
            Err(e) => return format!("Error: {}", e),
        };
        let pages: Vec<usize> = pages.into_iter().collect();
        let removed = session.delete(&pages);
        to_json(&DeleteResult {
            removed,
            remaining: session.roster().len(),
        })
    }

    #[tool(description = "Start writing the selected pages, in page order, to a new PDF. Poll job_status until the save completes.")]
    async fn save_selection(&self, Parameters(req): Parameters<SaveRequest>) -> String {
        let mut session = self.session.lock().await;
        match session.save(&req.output) {
            Ok(_) => to_json(&status_of(&session, Vec::new())),
            Err(e) => error_text(&e),
        }
    }

    #[tool(description = "Ask the running job to stop after the page it is working on")]
    async fn cancel_job(&self, Parameters(_): Parameters<EmptyRequest>) -> String {
        let session = self.session.lock().await;
        if session.cancel() {
            "Cancellation requested".to_string()
        } else {
            "No job is running".to_string()
        }
    }
}

// Result types for MCP tools

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct JobStatusResult {
    pub state: String,
    pub kind: Option<String>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub updates: Vec<String>,
    pub document: Option<String>,
    pub page_count: Option<usize>,
    pub selected: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PageResult {
    pub page: usize,
    pub thumbnail: String,
    pub selected: bool,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SelectionResult {
    pub selected: Vec<usize>,
}

#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DeleteResult {
    pub removed: usize,
    pub remaining: usize,
}

#[tool_handler]
impl ServerHandler for PageSelectorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "PDF page picker. Use open_document to load a PDF, job_status to follow \
                 background work, list_pages to see thumbnails, select_pages or \
                 set_page_selected to choose pages, delete_pages to drop pages from the list, \
                 and save_selection to write the selected pages to a new PDF."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let server = PageSelectorServer::new(&config);

    // Serve using stdin/stdout as a tuple
    let service = server.serve((tokio::io::stdin(), tokio::io::stdout())).await?;

    service.waiting().await?;

    Ok(())
}
