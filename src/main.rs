//! # Unity Context CLI (`uctx`)
//!
//! Index a Unity project, keep the index current while you work, and pull
//! ranked context for a question.
//!
//! ## Usage
//!
//! ```bash
//! uctx [--config ./uctx.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `uctx index <root>` | Index scripts, prefabs and scenes of a project |
//! | `uctx index-docs <dir>` | Index Markdown/text API documentation |
//! | `uctx watch <root>` | Re-index scripts as they change (Ctrl-C to stop) |
//! | `uctx ask "<query>"` | Assemble retrieval context for a question |
//! | `uctx similar <file>` | Find scripts similar to a file |
//! | `uctx docs "<topic>"` | Search indexed API documentation |
//! | `uctx style <root>` | Print the project's style profile |
//! | `uctx apply-style <root> <file>` | Rewrite a file in the project's style |
//! | `uctx stats` | Vector store document count and dimension |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `unity_context=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unity_context::access::SourceAccess;
use unity_context::config::{self, Config};
use unity_context::embedding::create_provider;
use unity_context::indexer::Indexer;
use unity_context::rag::{ProjectContext, RagEngine, RagRequest};
use unity_context::store::{create_store, VectorStore};
use unity_context::style_service::StyleService;
use unity_context::watcher::{ChangeCallback, ChangeNotice, ChangeOutcome, IndexMaintainer};
use unity_context_core::search::SearchResult;

/// Unity Context CLI: semantic indexing and retrieval-augmented context for
/// Unity projects.
#[derive(Parser)]
#[command(
    name = "uctx",
    about = "Unity Context: semantic indexing and retrieval-augmented context for Unity projects",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional. Without it every setting takes its default: a local Ollama
    /// embedding model and a SQLite store at `./data/uctx.sqlite`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every script, prefab and scene of a Unity project.
    ///
    /// Prints `{totalFiles, indexed, errors}` as JSON. Per-file failures
    /// are counted, not fatal.
    Index {
        /// Project root (the directory holding `Assets/`).
        root: PathBuf,
    },

    /// Index Markdown and text documentation for `docs` lookups.
    IndexDocs {
        dir: PathBuf,

        /// Name the documents are grouped under.
        #[arg(long, default_value = "unity-api")]
        label: String,
    },

    /// Watch a project and re-index scripts as they change.
    Watch { root: PathBuf },

    /// Build retrieval context for a question.
    Ask {
        query: String,

        /// Scope retrieval to this project.
        #[arg(long)]
        project: Option<PathBuf>,

        /// Add the project's style profile to the instructions (needs --project).
        #[arg(long)]
        style: bool,
    },

    /// Find indexed scripts similar to a file.
    Similar {
        file: PathBuf,

        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Search indexed API documentation.
    Docs { topic: String },

    /// Analyze a project's coding style.
    Style {
        root: PathBuf,

        /// Print the full profile as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a C# file to match a project's style and print it.
    ApplyStyle { root: PathBuf, file: PathBuf },

    /// Show vector store statistics.
    Stats,
}

/// Process-wide collaborators, constructed once and shared by handle.
struct App {
    config: Config,
    access: Arc<SourceAccess>,
    store: Arc<dyn VectorStore>,
    indexer: Arc<Indexer>,
    rag: RagEngine,
    style: StyleService,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let access = Arc::new(SourceAccess::with_roots(&config.access.allowed_roots));
        let store = create_store(&config.store).await?;
        let embedder = create_provider(&config.embedding)?;
        let indexer = Arc::new(Indexer::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&access),
            &config,
        )?);
        let rag = RagEngine::new(Arc::clone(&store), embedder, config.retrieval.clone());
        let style = StyleService::new(Arc::clone(&access), &config.style);
        Ok(Self {
            config,
            access,
            store,
            indexer,
            rag,
            style,
        })
    }

    fn project_context(&self, root: &Path, with_style: bool) -> Result<ProjectContext> {
        let mut context = ProjectContext::new(self.indexer.resolve_project(root)?);
        if with_style {
            context.style = Some(self.style.analyze_project(root)?);
        }
        Ok(context)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unity_context=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results above the relevance threshold.");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        println!(
            "{}. [{:.3} {}] {} ({})",
            i + 1,
            r.score,
            r.relevance,
            r.document.metadata.file_path,
            r.document.id
        );
        let preview: String = r.document.content.chars().take(200).collect();
        println!("   {}", preview.replace('\n', "\n   "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    // Style commands never touch the store or the embedding provider.
    match &cli.command {
        Commands::Style { root, json } => {
            let service = StyleService::new(Arc::new(SourceAccess::new()), &config.style);
            let profile = service.analyze_project(root)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                println!(
                    "Analyzed {} scripts, overall confidence {:.0}%",
                    profile.analyzed_unit_count,
                    profile.overall_confidence * 100.0
                );
                println!("{}", profile.summary(profile.patterns.len()));
            }
            return Ok(());
        }
        Commands::ApplyStyle { root, file } => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let service = StyleService::new(Arc::new(SourceAccess::new()), &config.style);
            print!("{}", service.restyle(root, &text)?);
            return Ok(());
        }
        _ => {}
    }

    let app = App::build(config).await?;

    match cli.command {
        Commands::Index { root } => {
            let report = app.indexer.index_project(&root).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::IndexDocs { dir, label } => {
            let report = app.indexer.index_documentation(&dir, &label).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Watch { root } => {
            let maintainer = IndexMaintainer::new(
                Arc::clone(&app.indexer),
                Arc::clone(&app.access),
                Duration::from_millis(app.config.watch.debounce_ms),
            );
            let on_change: ChangeCallback = Arc::new(|notice: &ChangeNotice| match &notice.outcome {
                ChangeOutcome::Reindexed { documents } => println!(
                    "{} {} → {} documents",
                    notice.kind.as_str(),
                    notice.path.display(),
                    documents
                ),
                ChangeOutcome::Removed { documents } => println!(
                    "{} {} → removed {} documents",
                    notice.kind.as_str(),
                    notice.path.display(),
                    documents
                ),
                ChangeOutcome::Failed { message } => {
                    println!("{} {} failed: {}", notice.kind.as_str(), notice.path.display(), message)
                }
            });
            let id = maintainer.watch_project(&root, Some(on_change))?;
            println!("Watching {} (session {}). Press Ctrl-C to stop.", root.display(), id);
            tokio::signal::ctrl_c().await?;
            maintainer.stop_watching(&id);
        }
        Commands::Ask {
            query,
            project,
            style,
        } => {
            let mut request = RagRequest::new(query);
            if let Some(root) = &project {
                request.project = Some(app.project_context(root, style)?);
            }
            let context = app.rag.enhance(&request).await?;
            println!(
                "# intent: {}, keywords: [{}], domain-specific: {}, {} of {} results included\n",
                context.analysis.intent.as_str(),
                context.analysis.keywords.join(", "),
                context.analysis.domain_specific,
                context.included,
                context.results.len()
            );
            println!("{}", context.context);
        }
        Commands::Similar { file, project } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let context = match &project {
                Some(root) => Some(app.project_context(root, false)?),
                None => None,
            };
            let results = app.rag.find_similar_code(&code, context.as_ref()).await?;
            print_results(&results);
        }
        Commands::Docs { topic } => {
            let results = app.rag.get_api_documentation(&topic).await?;
            print_results(&results);
        }
        Commands::Stats => {
            let stats = app.store.stats().await?;
            println!("documents: {}", stats.count);
            println!("dimension: {}", stats.dimension);
        }
        Commands::Style { .. } | Commands::ApplyStyle { .. } => {}
    }

    Ok(())
}
