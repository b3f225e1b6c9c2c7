pub mod extract;
pub mod pages;

use anyhow::{anyhow, Result};
use pdfpick::{JobUpdate, Session};

/// Wait for the running job, drawing progress on stderr.
pub(crate) async fn wait_for_job(session: &mut Session, label: &str) -> Result<JobUpdate> {
    let outcome = session
        .run_to_completion(|_, percent| eprint!("\r{label}... {percent:>3}%"))
        .await;
    eprintln!();

    match outcome {
        Some(Ok(update)) => Ok(update),
        Some(Err(e)) => Err(anyhow::Error::new(e).context(format!("{label} failed"))),
        None => Err(anyhow!("{label}: no job was running")),
    }
}
