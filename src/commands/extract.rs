use anyhow::{bail, Result};
use pdfpick::{Config, JobUpdate, Session};
use std::path::Path;

use super::wait_for_job;

pub async fn run(config: &Config, input: &Path, pages: &str, output: &Path) -> Result<()> {
    let mut session = Session::new(config);
    session.load(input)?;
    wait_for_job(&mut session, "Loading PDF").await?;

    let selected = session.select_ranges(pages)?;
    if selected.is_empty() {
        bail!("No pages specified");
    }

    session.save(output)?;
    if let JobUpdate::Saved { path, pages } = wait_for_job(&mut session, "Saving PDF").await? {
        println!("Extracted {} page(s) to {}", pages, path.display());
    }

    Ok(())
}
