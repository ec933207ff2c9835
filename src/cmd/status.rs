//! Project inspection — `fabula status` and `fabula checkpoints`.

use anyhow::Result;
use fabula::checkpoint::CheckpointManager;
use fabula::config::Settings;
use fabula::export;
use fabula::stage::Stage;

pub fn cmd_status(settings: &Settings, project: &str) -> Result<()> {
    let manager = CheckpointManager::new(&settings.output_dir)
        .with_retention(settings.checkpoint_retention);
    let doc = manager.load_latest(project)?;

    println!("{}", console::style(format!("Project: {project}")).bold().cyan());
    println!("  title:     {}", doc.series.title);
    println!("  genre:     {}", doc.series.genre);
    println!("  stage:     {}", doc.metadata.processing_stage);
    println!("  status:    {}", doc.metadata.status);
    println!("  revision:  {}", doc.metadata.revision);
    println!("  updated:   {} by {}", doc.metadata.last_updated, doc.metadata.last_updated_by);
    println!(
        "  lore:      {} character(s), {} location(s), {} world element(s)",
        doc.series.lore.characters.len(),
        doc.series.lore.locations.len(),
        doc.series.lore.world_elements.len()
    );
    println!("  words:     {}", export::word_count(&doc));

    match doc.next_unfinished() {
        Some(next) => println!("  next:      {next}"),
        None => println!("  next:      {}", console::style("complete").green()),
    }

    if !doc.quality_reports.is_empty() {
        println!("{}", console::style("Quality reports:").bold());
        for stage in Stage::ALL {
            for (index, report) in doc.reports_for(stage).iter().enumerate() {
                println!(
                    "  {stage}[{index}] attempt {} by {}: {} (overall {})",
                    report.attempt, report.reviewer, report.verdict, report.scores.overall
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_checkpoints(settings: &Settings, project: &str) -> Result<()> {
    let manager = CheckpointManager::new(&settings.output_dir)
        .with_retention(settings.checkpoint_retention);
    let checkpoints = manager.list(project)?;
    if checkpoints.is_empty() {
        println!("no checkpoints for project '{project}'");
        return Ok(());
    }
    println!(
        "{}",
        console::style(format!("{} checkpoint(s):", checkpoints.len())).bold()
    );
    for info in checkpoints {
        println!("  {:04}  {:<9}  {}", info.seq, info.stage.to_string(), info.path.display());
    }
    Ok(())
}
