use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use difftour::cache::ExplanationCache;
use difftour::config::TourConfig;
use difftour::context::BuildContext;
use difftour::explain::{self, Explainer, PlaceholderExplainer};
use difftour::mcp::server::{McpContext, McpServer};
use difftour::sources::{DiskSources, GitSources, SourceProvider};
use difftour::tour::models::{StepKind, Tour};
use difftour::tour::{GraphMode, TourOptions, build_overview_units, build_tour, collect_change_units};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "difftour")]
#[command(about = "Turn uncommitted changes into an ordered, explained code tour")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Workspace (git work tree) root
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Config file (default: difftour.json)
    #[arg(long, global = true, default_value = "")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tour of the working-tree diff against HEAD
    Tour {
        /// Read the unified diff from this file instead of running git
        #[arg(long)]
        diff_file: Option<PathBuf>,

        /// What the reviewer cares about; overrides the configured intent
        #[arg(long)]
        intent: Option<String>,

        /// Use placeholder explanations instead of the configured model
        #[arg(long)]
        offline: bool,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the change units of the diff as JSON
    Units {
        /// Read the unified diff from this file instead of running git
        #[arg(long)]
        diff_file: Option<PathBuf>,
    },

    /// Tour whole files in dependency order, ignoring the diff
    Overview {
        /// Workspace-relative files
        #[arg(required = true)]
        paths: Vec<String>,

        /// Use placeholder explanations instead of the configured model
        #[arg(long)]
        offline: bool,

        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Serve tours over MCP (stdio)
    Serve {
        /// Use placeholder explanations instead of the configured model
        #[arg(long)]
        offline: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TourConfig::load(&cli.config)?;
    config.validate().context("invalid configuration")?;
    let root = cli.root;

    match cli.command {
        Commands::Tour {
            diff_file,
            intent,
            offline,
            format,
        } => {
            let sources = sources_for(&root, diff_file.as_deref())?;
            let mut ctx =
                BuildContext::new(root.clone(), sources.as_ref()).with_filter(config.path_filter()?);
            let units = collect_change_units(&mut ctx).context("failed to read the diff")?;

            let explainer = make_explainer(&config, offline)?;
            let cache_path = config.cache_file(&root);
            let mut cache = ExplanationCache::load(&cache_path)?;
            let intent = intent.or_else(|| config.intent.clone());
            let options = TourOptions {
                intent: intent.as_deref(),
                proximity_threshold: config.proximity_threshold,
                mode: GraphMode::Diff,
            };
            let tour = build_tour(units, explainer.as_ref(), &mut cache, &options);
            cache.save(&cache_path)?;
            info!("Saved {} explanation(s) to {}", cache.len(), cache_path.display());
            print_tour(&tour, format)?;
        }
        Commands::Units { diff_file } => {
            let sources = sources_for(&root, diff_file.as_deref())?;
            let mut ctx =
                BuildContext::new(root.clone(), sources.as_ref()).with_filter(config.path_filter()?);
            let units = collect_change_units(&mut ctx).context("failed to read the diff")?;
            println!("{}", serde_json::to_string_pretty(&units)?);
        }
        Commands::Overview {
            paths,
            offline,
            format,
        } => {
            let sources = GitSources::new(root.clone());
            let mut ctx = BuildContext::new(root.clone(), &sources);
            let units = build_overview_units(&paths, &mut ctx);
            let explainer = make_explainer(&config, offline)?;
            let options = TourOptions {
                intent: config.intent.as_deref(),
                proximity_threshold: config.proximity_threshold,
                mode: GraphMode::Overall,
            };
            let tour = build_tour(units, explainer.as_ref(), &mut ExplanationCache::new(), &options);
            print_tour(&tour, format)?;
        }
        Commands::Serve { offline } => {
            let explainer: Arc<dyn Explainer> = Arc::from(make_explainer(&config, offline)?);
            let mcp_ctx = McpContext::new(root, config, explainer)?;
            let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(McpServer::new(mcp_ctx).start())?;
        }
    }

    Ok(())
}

fn sources_for(root: &Path, diff_file: Option<&Path>) -> Result<Box<dyn SourceProvider>> {
    match diff_file {
        Some(file) => {
            let diff = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read diff file: {}", file.display()))?;
            Ok(Box::new(DiskSources::new(root, diff)))
        }
        None => Ok(Box::new(GitSources::new(root))),
    }
}

fn make_explainer(config: &TourConfig, offline: bool) -> Result<Box<dyn Explainer>> {
    if offline {
        return Ok(Box::new(PlaceholderExplainer));
    }
    explain::from_config(&config.explainer).context("cannot create explainer (try --offline)")
}

fn print_tour(tour: &Tour, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(tour)?),
        Format::Text => {
            if tour.steps.is_empty() {
                println!("Nothing to tour.");
                return Ok(());
            }
            for (i, step) in tour.steps.iter().enumerate() {
                let label = match step.unit() {
                    Some(unit) => format!("{} {}", unit.change_kind.as_str(), unit.label()),
                    None => "background".to_string(),
                };
                let marker = if step.kind == StepKind::Background { "  " } else { "" };
                println!(
                    "{marker}{}. {}:{} [{}]",
                    i + 1,
                    step.target.file_path(),
                    step.target.range(),
                    label
                );
                println!("{marker}   {}", step.explanation);
            }
            println!(
                "\n{} step(s), {} node(s), {} edge(s)",
                tour.steps.len(),
                tour.graph.nodes.len(),
                tour.graph.edges.len()
            );
        }
    }
    Ok(())
}
