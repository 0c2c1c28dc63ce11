use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use prlens::cli::{Cli, Command};
use prlens::config::Config;
use prlens::error::Result;
use prlens::extract::Scope;
use prlens::gemini::GeminiClient;
use prlens::orchestrator::Orchestrator;
use prlens::page::PageSnapshot;
use prlens::present::ConsolePresenter;
use prlens::remote::AdoFetcher;
use prlens::service::Service;
use prlens::store::StatsStore;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Review {
            snapshot,
            url,
            scope,
        } => run_review(config, snapshot, url, &scope),
        Command::Serve => run_serve(config).await,
        Command::Stats => run_stats(config),
    }
}

fn run_review(
    config: Config,
    snapshot: Option<String>,
    url: Option<String>,
    scope: &str,
) -> Result<()> {
    use prlens::error::Error;

    config.settings.validate()?;
    let scope = Scope::parse(scope)
        .ok_or_else(|| Error::ConfigValidation(format!("unknown scope: {scope}")))?;

    let mut page = match snapshot {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str::<PageSnapshot>(&content)
                .map_err(|e| Error::Protocol(format!("bad snapshot file {path}: {e}")))?
        }
        None => PageSnapshot::default(),
    };
    if let Some(url) = url {
        page.url = url;
    }
    if page.url.is_empty() {
        return Err(Error::ConfigValidation(
            "nothing to review: pass --snapshot and/or --url".to_string(),
        ));
    }

    info!(url = page.url, "starting review");
    let orchestrator = build_orchestrator(&config);
    let mut presenter = ConsolePresenter;
    orchestrator.run_review(scope, &page, &mut presenter)?;
    Ok(())
}

async fn run_serve(config: Config) -> Result<()> {
    let orchestrator = build_orchestrator(&config);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let service = Service::new(orchestrator, config.settings, events_tx);
    service.run(events_rx).await
}

fn build_orchestrator(config: &Config) -> Orchestrator<GeminiClient, AdoFetcher> {
    Orchestrator::new(
        GeminiClient::new(&config.settings.api_key, &config.settings.model),
        AdoFetcher::new(config.settings.access_token.clone()),
        config.settings.clone(),
        StatsStore::new(&config.state_dir),
    )
}

fn run_stats(config: Config) -> Result<()> {
    let stats = StatsStore::new(&config.state_dir).load();
    println!("review passes:  {}", stats.passes);
    println!("files reviewed: {}", stats.totals.files);
    println!("critical:       {}", stats.totals.critical);
    println!("warnings:       {}", stats.totals.warnings);
    println!("suggestions:    {}", stats.totals.suggestions);
    Ok(())
}
