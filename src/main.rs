use anyhow::Result;
use clap::{Parser, Subcommand};
use fabula::config::Settings;
use fabula::stage::Stage;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "fabula")]
#[command(
    version,
    about = "AI-powered fiction pipeline - staged drafting with mandatory quality gates"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (defaults to fabula.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new project and run it through the pipeline
    Run {
        /// Project identifier (directory name under the output dir)
        #[arg(short, long)]
        project: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        premise: String,

        #[arg(long, default_value = "fiction")]
        genre: String,

        /// Stop after completing this many stages
        #[arg(long)]
        max_stages: Option<usize>,
    },
    /// Resume a project from its latest checkpoint
    Resume {
        #[arg(short, long)]
        project: String,

        /// Rewind to this stage before resuming
        #[arg(long)]
        from_stage: Option<Stage>,

        #[arg(long)]
        max_stages: Option<usize>,
    },
    /// Show a project's progress and quality reports
    Status {
        #[arg(short, long)]
        project: String,
    },
    /// List a project's checkpoints
    Checkpoints {
        #[arg(short, long)]
        project: String,
    },
    /// Export the drafted manuscript as Markdown
    Export {
        #[arg(short, long)]
        project: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "fabula=debug" } else { "fabula=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            project,
            title,
            premise,
            genre,
            max_stages,
        } => {
            cmd::cmd_run(&settings, project, title, premise, genre, *max_stages).await?;
        }
        Commands::Resume {
            project,
            from_stage,
            max_stages,
        } => {
            cmd::cmd_resume(&settings, project, *from_stage, *max_stages).await?;
        }
        Commands::Status { project } => cmd::cmd_status(&settings, project)?,
        Commands::Checkpoints { project } => cmd::cmd_checkpoints(&settings, project)?,
        Commands::Export { project, out } => cmd::cmd_export(&settings, project, out.as_deref())?,
    }

    Ok(())
}
