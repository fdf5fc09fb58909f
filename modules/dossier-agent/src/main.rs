use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dossier_agent::pipeline::{Stage, ValidationStage};
use dossier_agent::{state_from_payload, state_to_payload};
use dossier_common::Config;

#[derive(Parser)]
#[command(name = "dossier-agent", about = "Due-diligence investigation toolkit")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Re-run validation and scoring over a saved investigation state
    Fuse {
        /// State snapshot (JSON), optionally wrapped in a `state` or `value` envelope
        #[arg(long)]
        input: PathBuf,
        /// Where to write the updated state; stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load configuration from the environment and log it redacted
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("dossier=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Command::Fuse { input, output } => fuse(input, output).await,
        Command::Config => {
            let config = Config::from_env()?;
            config.log_redacted();
            let engine = config.search_provider();
            let llm = config.llm_provider()?;
            info!(llm = ?llm, search = engine.as_str(), "Providers resolved");
            Ok(())
        }
    }
}

async fn fuse(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", input.display()))?;
    let mut state = state_from_payload(payload)?;

    info!(
        subject = state.subject.as_str(),
        findings = state.findings.len(),
        facts = state.context.extracted_facts.len(),
        "Fusing saved state"
    );
    ValidationStage::default().run(&mut state).await?;

    let rendered = serde_json::to_string_pretty(&state_to_payload(&state)?)?;
    match output {
        Some(path) => {
            std::fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "State written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
