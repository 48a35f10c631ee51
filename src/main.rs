use anyhow::{bail, Context, Result};
use clap::Parser;
use kiln_core::cli::Commands;
use kiln_core::config::CONFIG_FILE;
use kiln_core::logger::Logger;
use kiln_core::{BuildContext, BuildEvent, Cli, Config, Engine, FreshnessSource, FsStat};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init(dir: &Path, force: bool) -> Result<()> {
    let path = dir.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        );
    }

    Config::starter().save_to_file(&path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn list_rules(config: &Config, dir: &Path) -> Result<()> {
    let rules = config.to_rules(dir)?;
    for (index, rule) in rules.iter().enumerate() {
        println!("{:>3}  {:<24} {}", index + 1, rule.pattern(), rule.recipe().describe());
    }
    Ok(())
}

async fn build(cli: &Cli, config: Config, dir: &Path) -> Result<bool> {
    let targets = if cli.targets.is_empty() {
        config.build.default_targets.clone()
    } else {
        cli.targets.clone()
    };
    if targets.is_empty() {
        bail!("No targets given and no `default_targets` in {}", CONFIG_FILE);
    }

    let mut display = config.display.clone();
    if cli.no_color {
        display.color = false;
    }
    let logger = Logger::new(&display, cli.verbose > 0);

    let rules = config.to_rules(dir)?;
    let stat: Arc<dyn FreshnessSource> = Arc::new(FsStat::new(dir));
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<BuildEvent>();
    let engine = Engine::new(BuildContext::new(rules, stat).with_events(event_tx));

    for target in &targets {
        engine.request_build(target);
    }

    let settle = engine.settle();
    tokio::pin!(settle);

    let summary = loop {
        tokio::select! {
            Some(event) = event_rx.recv() => logger.log_event(&event),
            summary = &mut settle => break summary,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted");
                break engine.summary();
            }
        }
    };

    while let Ok(event) = event_rx.try_recv() {
        logger.log_event(&event);
    }
    logger.log_summary(&summary);

    Ok(summary.is_success())
}

async fn run() -> Result<bool> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let dir = cli
        .source_directory()
        .context("Failed to determine the project directory")?;

    if let Some(Commands::Init { force }) = cli.command {
        init(&dir, force)?;
        return Ok(true);
    }

    let config = Config::load(&dir, cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Rules) => {
            list_rules(&config, &dir)?;
            Ok(true)
        }
        _ => build(&cli, config, &dir).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
