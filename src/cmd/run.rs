//! Pipeline execution — `fabula run` and `fabula resume`.

use anyhow::{Context, Result, anyhow};
use fabula::agents::default_agents;
use fabula::checkpoint::CheckpointManager;
use fabula::config::Settings;
use fabula::document::ProjectDocument;
use fabula::errors::PipelineError;
use fabula::gate::{LlmConsistencyReviewer, LlmCraftReviewer, QualityGate};
use fabula::llm::{OpenAiEmbeddings, OpenRouterClient, TextGenerator};
use fabula::lore::{HttpSimilarityIndex, LoreStore};
use fabula::orchestrator::{FailureReport, Pipeline, RunOptions, Seed};
use fabula::stage::Stage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn cmd_run(
    settings: &Settings,
    project: &str,
    title: &str,
    premise: &str,
    genre: &str,
    max_stages: Option<usize>,
) -> Result<()> {
    let checkpoints = checkpoint_manager(settings);
    if checkpoints.exists(project) {
        anyhow::bail!(
            "project '{project}' already has saved state; use 'fabula resume --project {project}'"
        );
    }

    let seed = Seed {
        title: title.to_string(),
        premise: premise.to_string(),
        genre: genre.to_string(),
    };
    let options = RunOptions {
        resume: false,
        from_stage: None,
        max_stages,
    };
    execute(settings, project, Some(seed), options).await
}

pub async fn cmd_resume(
    settings: &Settings,
    project: &str,
    from_stage: Option<Stage>,
    max_stages: Option<usize>,
) -> Result<()> {
    let options = RunOptions {
        resume: true,
        from_stage,
        max_stages,
    };
    execute(settings, project, None, options).await
}

async fn execute(
    settings: &Settings,
    project: &str,
    seed: Option<Seed>,
    options: RunOptions,
) -> Result<()> {
    let pipeline = build_pipeline(settings, project)?;

    println!(
        "{} project '{}'",
        console::style(if options.resume { "Resuming" } else { "Starting" }).bold().cyan(),
        project
    );

    match pipeline.run(seed, options).await {
        Ok(doc) => {
            let done = doc.next_unfinished().is_none();
            println!(
                "{} stage={} status={} revision={}",
                console::style(if done { "Complete:" } else { "Stopped:" })
                    .bold()
                    .green(),
                doc.metadata.processing_stage,
                doc.metadata.status,
                doc.metadata.revision
            );
            print_progress(&doc);
            Ok(())
        }
        Err(err) => {
            if let Some(report) = FailureReport::from_error(&err) {
                eprintln!("{}", console::style("Pipeline halted:").red().bold());
                eprint!("{report}");
                eprintln!("resume with: fabula resume --project {project}");
            } else if matches!(err, PipelineError::ConcurrencyConflict { .. }) {
                eprintln!(
                    "{} {err}",
                    console::style("Another run is active:").red().bold()
                );
            }
            Err(err.into())
        }
    }
}

fn print_progress(doc: &ProjectDocument) {
    for stage in Stage::ALL {
        let reports = doc.reports_for(stage);
        if reports.is_empty() {
            continue;
        }
        let approved = reports.iter().filter(|r| r.verdict.is_approved()).count();
        println!(
            "  {}: {} report(s), {} approved",
            stage,
            reports.len(),
            approved
        );
    }
}

fn checkpoint_manager(settings: &Settings) -> CheckpointManager {
    CheckpointManager::new(&settings.output_dir).with_retention(settings.checkpoint_retention)
}

/// Wire the full pipeline from settings: per-role generators, LLM-backed
/// reviewers, the lore store (similarity-backed when FABULA_INDEX_URL is
/// set), checkpoints, and ctrl-c cancellation.
fn build_pipeline(settings: &Settings, project: &str) -> Result<Pipeline> {
    let api_key = settings
        .api_key
        .clone()
        .ok_or_else(|| anyhow!("OPENROUTER_API_KEY is not set"))?;

    let lore = match &settings.index_url {
        Some(index_url) => {
            let index = HttpSimilarityIndex::new(index_url, Duration::from_secs(30))
                .context("failed to build similarity index client")?;
            let embeddings =
                OpenAiEmbeddings::new(&settings.api_base_url, &api_key, &settings.embedding_model)
                    .context("failed to build embeddings client")?;
            Arc::new(LoreStore::new(
                project,
                Some(Arc::new(index)),
                Some(Arc::new(embeddings)),
            ))
        }
        None => Arc::new(LoreStore::in_memory(project)),
    };

    let client_for = |role: &str| -> Arc<dyn TextGenerator> {
        let m = settings.model_for(role);
        Arc::new(
            OpenRouterClient::new(&settings.api_base_url, &api_key, &m.model, m.temperature)
                .with_timeout(settings.stage_timeout),
        )
    };

    let agents = default_agents(|stage| client_for(stage.as_str()));
    let gate = QualityGate::new(
        Arc::new(LlmCraftReviewer::new(client_for("craft"))),
        Arc::new(LlmConsistencyReviewer::new(client_for("consistency"))),
    )
    .with_lore_top_k(settings.lore_top_k);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    Ok(
        Pipeline::new(project, agents, gate, checkpoint_manager(settings), lore)
            .with_settings(settings.run_settings())
            .with_cancel(cancel_rx),
    )
}
