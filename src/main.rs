use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use inkgrade_lib::commands::{self, DisplayOptions, StatusLevel};
use inkgrade_lib::config::{self, GraderConfig};
use inkgrade_lib::core_state::CoreState;
use inkgrade_lib::history::HistoryStore;
use inkgrade_lib::models::ErrorCategory;
use inkgrade_lib::pipeline::grading::{GradingBackend, OllamaClient};
use inkgrade_lib::pipeline::intake::LogProgress;
use inkgrade_lib::pipeline::preprocess::ImagePreparer;

#[derive(Parser)]
#[command(name = "inkgrade")]
#[command(about = "Grade photos of handwritten English with a local vision model")]
#[command(version)]
struct Cli {
    /// Ollama base URL (overrides INKGRADE_OLLAMA_URL)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Vision model name (overrides INKGRADE_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare images for grading without calling the model
    Prepare {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write the prepared JPEGs here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Prepare and grade one submission (all files are its pages, in order)
    Grade {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Browse past results
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Check the grading service and model
    Health,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List stored results, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show a stored result
    Show {
        id: String,

        #[command(flatten)]
        display: DisplayArgs,
    },
    /// Delete one stored result
    Delete { id: String },
    /// Delete all stored results
    Clear,
}

#[derive(clap::Args)]
struct DisplayArgs {
    /// Print JSON instead of the text report
    #[arg(long)]
    json: bool,

    /// Only mark errors of this category
    #[arg(long)]
    category: Option<ErrorCategory>,

    /// Only mark errors on this page (1-based)
    #[arg(long)]
    page: Option<u32>,

    /// Show the corrected text instead of the annotated one
    #[arg(long)]
    corrected: bool,
}

impl From<DisplayArgs> for DisplayOptions {
    fn from(args: DisplayArgs) -> Self {
        Self {
            json: args.json,
            category: args.category,
            page: args.page,
            corrected: args.corrected,
        }
    }
}

fn main() -> Result<()> {
    inkgrade_lib::init_tracing();
    let cli = Cli::parse();

    let grader_config = GraderConfig::from_env().with_overrides(cli.url, cli.model);
    tracing::info!(
        version = config::APP_VERSION,
        url = %grader_config.ollama_url,
        model = %grader_config.model,
        "Inkgrade starting"
    );

    // The blocking HTTP client must be created and dropped outside the runtime.
    let backend: Arc<dyn GradingBackend> = Arc::new(OllamaClient::from_config(&grader_config));
    let state = CoreState::new(
        ImagePreparer::standard(),
        backend.clone(),
        HistoryStore::open(config::history_path()),
        Arc::new(LogProgress),
    )
    .map_err(|e| anyhow!(e.user_message()))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let output = runtime.block_on(async {
        match cli.command {
            Commands::Prepare { files, out } => {
                commands::grading::prepare_images(&state, &files, out.as_deref()).await
            }
            Commands::Grade { files, display } => {
                commands::grading::grade_files(&state, &files, &display.into()).await
            }
            Commands::History { action } => match action {
                HistoryAction::List { json } => commands::history::list_history(&state, json),
                HistoryAction::Show { id, display } => {
                    commands::history::show_history(&state, &id, &display.into())
                }
                HistoryAction::Delete { id } => commands::history::delete_history(&state, &id),
                HistoryAction::Clear => commands::history::clear_history(&state),
            },
            Commands::Health => {
                let status =
                    commands::health_check(backend.clone(), grader_config.model.clone()).await;
                match status.level {
                    StatusLevel::Ready => Ok(format!("{}\n", status.summary)),
                    _ => Err(status.summary),
                }
            }
        }
    });
    drop(runtime);

    let output = output.map_err(|message| anyhow!(message))?;
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}
