//! Manuscript export — `fabula export`.

use anyhow::{Context, Result};
use fabula::checkpoint::CheckpointManager;
use fabula::config::Settings;
use fabula::export;
use std::path::Path;

pub fn cmd_export(settings: &Settings, project: &str, out: Option<&Path>) -> Result<()> {
    let manager = CheckpointManager::new(&settings.output_dir)
        .with_retention(settings.checkpoint_retention);
    let doc = manager.load_latest(project)?;
    let manuscript = export::manuscript(&doc);

    match out {
        Some(path) => {
            std::fs::write(path, &manuscript)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "{} {} ({} words)",
                console::style("Exported to").bold().green(),
                path.display(),
                export::word_count(&doc)
            );
        }
        None => print!("{manuscript}"),
    }
    Ok(())
}
