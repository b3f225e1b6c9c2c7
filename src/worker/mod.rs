mod load;
mod save;

pub use load::{rasterize_document, spawn_load, LoadRequest, LoadedDocument};
pub use save::{extract_document, spawn_save, SaveRequest, SavedDocument};

/// Result payload of either job kind.
#[derive(Debug)]
pub enum JobOutput {
    Loaded(LoadedDocument),
    Saved(SavedDocument),
}

fn spawn_named<F>(name: &str, f: F)
where
    F: FnOnce() + Send + 'static,
{
    // If the thread cannot start, the closure (and the job handle inside it)
    // is dropped, which reports the job as abandoned.
    if let Err(e) = std::thread::Builder::new().name(name.to_string()).spawn(f) {
        tracing::error!(error = %e, thread = name, "failed to spawn worker thread");
    }
}
