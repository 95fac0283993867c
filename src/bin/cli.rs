//! Owlscope CLI
//!
//! Loads a seed file of scopes and drives crawls and scoped queries against
//! the configured frontier and retrieval services.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use owlscope::{
    config,
    error::{AppError, Result},
    models::{Config, QueryRequest, ScopeId},
    services::ScopeService,
};

/// Owlscope - scoped crawl and query coordinator
#[derive(Parser, Debug)]
#[command(
    name = "owlscope",
    version,
    about = "Scope- and freshness-aware crawl coordinator"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Path to the seed file listing scopes and pages
    #[arg(short, long, default_value = "data/seed.toml")]
    seed: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate configuration and seed files
    Validate,

    /// Show the effective configuration
    Info,

    /// Submit every seeded page to the frontier and wait for the results
    Crawl,

    /// Run a scoped query against the retrieval service
    Query {
        /// Query text
        text: String,

        /// Scope names to search within (default: all seeded scopes)
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
}

/// Initialize logging from the verbosity flag or the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let level = if verbose { "debug" } else { configured };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = Config::load(&cli.config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    log::info!("Owlscope starting...");

    match cli.command {
        Command::Validate => {
            log::info!("Validating configuration...");
            let (_, seed) = config::load_all(&cli.config, &cli.seed)?;
            log::info!("✓ Config OK");
            log::info!(
                "✓ Seed OK ({} scopes, {} pages)",
                seed.scopes.len(),
                seed.scopes.iter().map(|s| s.pages.len()).sum::<usize>()
            );
            log::info!("All validations passed!");
        }

        Command::Info => {
            let config = config::load_config(&cli.config);
            log::info!("Config file: {}", cli.config.display());
            log::info!("Seed file: {}", cli.seed.display());
            println!("{}", toml::to_string_pretty(&config).map_err(|e| AppError::config(e.to_string()))?);
        }

        Command::Crawl => {
            let (config, seed) = config::load_all(&cli.config, &cli.seed)?;
            let concurrency = config.coordinator.max_concurrent.max(1);
            let service = ScopeService::new(config)?;
            let seeded = service.apply_seed(&seed, true)?;

            let jobs: Vec<_> = seeded
                .into_iter()
                .flat_map(|s| {
                    for rejected in &s.pages.rejected {
                        log::warn!("Skipped {}: {}", rejected.url, rejected.reason);
                    }
                    s.pages.jobs
                })
                .collect();
            log::info!("Waiting for {} crawl jobs...", jobs.len());

            let reports: Vec<_> = stream::iter(jobs)
                .map(|job| job.wait())
                .buffer_unordered(concurrency)
                .collect()
                .await;

            let mut completed = 0;
            let mut failed = 0;
            for report in reports {
                match report {
                    Ok(report) if report.is_success() => completed += 1,
                    Ok(report) => {
                        failed += 1;
                        log::error!(
                            "{}: {}",
                            report.url,
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    Err(e) => {
                        failed += 1;
                        log::error!("Crawl job lost: {}", e);
                    }
                }
            }

            let stats = service.stats();
            service.shutdown();
            log::info!(
                "Crawl complete: {} succeeded, {} failed, {} pages indexed across {} scopes",
                completed,
                failed,
                stats.total_pages,
                stats.total_scopes
            );
        }

        Command::Query { text, scopes } => {
            let (config, seed) = config::load_all(&cli.config, &cli.seed)?;
            let service = ScopeService::new(config)?;
            let seeded = service.apply_seed(&seed, false)?;

            let scope_ids: Vec<ScopeId> = if scopes.is_empty() {
                seeded.iter().map(|s| s.scope.id).collect()
            } else {
                scopes
                    .iter()
                    .map(|name| {
                        seeded
                            .iter()
                            .find(|s| s.scope.name.eq_ignore_ascii_case(name.trim()))
                            .map(|s| s.scope.id)
                            .ok_or_else(|| AppError::validation(format!("unknown scope: {name}")))
                    })
                    .collect::<Result<_>>()?
            };

            let response = service.query(&QueryRequest::new(text, scope_ids)).await?;
            service.shutdown();

            if response.degraded {
                log::warn!(
                    "Degraded results: {}",
                    response.degraded_reason.as_deref().unwrap_or("retrieval unavailable")
                );
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    log::info!("Done!");

    Ok(())
}
