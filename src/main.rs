//! RQL CLI - run statements against the task engine

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use rql::ast::Statement;
use rql::{FixSuggestion, Planner, RqlConfig, RqlError, Session, SpecRegistry, TaskEngine};

#[derive(Parser)]
#[command(name = "rql")]
#[command(about = "RQL - reproducible, policy-governed LLM tasks")]
#[command(version)]
struct Cli {
    /// Debug logging and statement confirmations
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute statements given on the command line
    Exec {
        /// One or more statements separated by ';'
        statements: String,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Execute a .rql file
    Run {
        /// Path to .rql file
        file: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },

    /// Validate a .rql file (parse only)
    Validate {
        /// Path to .rql file
        file: PathBuf,
    },

    /// Write the default config to ~/.rql/config.toml
    Init,
}

#[derive(Args)]
struct RunOpts {
    /// Override the model provider (gemini, mock)
    #[arg(short, long)]
    provider: Option<String>,

    /// Override the model
    #[arg(short, long)]
    model: Option<String>,

    /// Directory of task specs (<dir>/<name>/<version>.yaml)
    #[arg(long)]
    spec_dir: Option<PathBuf>,

    /// Print full results as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let verbose = cli.verbose;
    let outcome = match cli.command {
        Commands::Exec { statements, opts } => execute(&statements, &opts, verbose).await,
        Commands::Run { file, opts } => match std::fs::read_to_string(&file) {
            Ok(text) => execute(&text, &opts, verbose).await,
            Err(e) => Err(anyhow::Error::new(RqlError::Io(e))
                .context(format!("Failed to read {}", file.display()))),
        },
        Commands::Validate { file } => validate(&file),
        Commands::Init => init(),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if let Some(suggestion) = e.downcast_ref::<RqlError>().and_then(|r| r.fix_suggestion()) {
                eprintln!("  {} {}", "Fix:".yellow(), suggestion);
            }
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a statement failed (already reported)
async fn execute(text: &str, opts: &RunOpts, verbose: bool) -> Result<bool> {
    let statements = rql::parse(text)?;

    let mut config = RqlConfig::load()?;
    if let Some(provider) = &opts.provider {
        config.llm.provider = provider.clone();
    }
    if let Some(model) = &opts.model {
        config.llm.model = model.clone();
    }
    config.verbose |= verbose;

    let mut engine = TaskEngine::from_config(&config)?;
    if let Some(dir) = &opts.spec_dir {
        engine = engine.with_spec_registry(SpecRegistry::with_dir(dir));
    }
    if verbose {
        eprintln!(
            "{} Using provider: {} | model: {}",
            "→".cyan(),
            engine.provider_name().cyan().bold(),
            config.llm.model.cyan()
        );
    }

    let planner = Planner::new(engine);
    let mut session = Session::new(config);
    let report = planner.run_traced(&statements, &mut session).await;

    for (stmt, result) in statements.iter().zip(&report.results) {
        if opts.json {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else if result.success {
            if let Some(output) = &result.output {
                println!("{}", output);
            }
            if let Statement::Select(select) = stmt {
                if select.has_evidence() {
                    if let Some(evidence) = &result.evidence {
                        println!("{}", "Evidence:".cyan().bold());
                        println!("{}", serde_json::to_string_pretty(evidence)?);
                    }
                }
                if select.has_confidence() {
                    if let Some(confidence) = result.confidence {
                        println!("{} {:.2}", "Confidence:".cyan().bold(), confidence);
                    }
                }
            }
        }

        if !result.success {
            eprintln!(
                "{} {}",
                "Error:".red().bold(),
                result.error.as_deref().unwrap_or("statement failed")
            );
            if let Some(hint) = &result.hint {
                eprintln!("  {} {}", "Fix:".yellow(), hint);
            }
        }
    }

    if verbose {
        if let Some(path) = &report.journal {
            eprintln!("{} Trace written to: {}", "→".cyan(), path.display());
        }
        let summary = report.tracer.summary();
        eprintln!(
            "{} {} statement(s), {} ok, {} failed, {:.1} ms",
            "→".cyan(),
            summary.total_statements,
            summary.successful_statements,
            summary.failed_statements,
            summary.total_execution_time_ms
        );
        if let Some(costs) = report.tracer.estimate_costs() {
            eprintln!(
                "{} {} LLM call(s), ~{} tokens, ~${:.6}",
                "→".cyan(),
                costs.llm_calls,
                costs.estimated_tokens,
                costs.estimated_cost_usd
            );
        }
    }

    Ok(report.succeeded())
}

fn validate(file: &Path) -> Result<bool> {
    let statements = rql::parse_file(file)?;

    println!("{} '{}' is valid", "✓".green(), file.display());
    println!("  Statements: {}", statements.len());
    let selects = statements
        .iter()
        .filter(|s| matches!(s, Statement::Select(_)))
        .count();
    println!("  Selects: {}", selects);
    Ok(true)
}

fn init() -> Result<bool> {
    let path = RqlConfig::global_path();
    let created = RqlConfig::init_at(&path)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;
    if created {
        println!("{} Wrote {}", "✓".green(), path.display());
    } else {
        println!("{} {} already exists", "→".cyan(), path.display());
    }
    Ok(true)
}
