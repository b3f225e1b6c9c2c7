use anyhow::{Context, Result};
use pdfpick::{Config, Session};
use std::path::Path;

use super::wait_for_job;

pub async fn run(config: &Config, path: &Path, keep: Option<&Path>) -> Result<()> {
    let mut session = Session::new(config);
    session.load(path)?;
    wait_for_job(&mut session, "Loading PDF").await?;

    if let Some(dir) = keep {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    for entry in session.roster() {
        let shown = match keep {
            Some(dir) => {
                let Some(name) = entry.raster_path.file_name() else {
                    continue;
                };
                let target = dir.join(name);
                std::fs::copy(&entry.raster_path, &target).with_context(|| {
                    format!("Failed to copy thumbnail to {}", target.display())
                })?;
                target
            }
            None => entry.raster_path.clone(),
        };
        println!("Page {}: {}", entry.source_index + 1, shown.display());
    }

    println!(
        "{} page(s) in {}",
        session.roster().len(),
        path.display()
    );
    Ok(())
}
