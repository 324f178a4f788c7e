use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::StreamExt;

use mcp_browser::agent_core::{Orchestrator, ProgressEvent};
use mcp_browser::config::AppConfig;
use mcp_browser::inference;
use mcp_browser::mcp_client::{ConnectionManager, EnvCredentials, McpConnector};

/// Ask a question; MCP tools gather the facts, the answer comes back as HTML.
#[derive(Parser, Debug)]
#[command(name = "mcp-browser", version, about)]
struct Cli {
    /// The question to answer (use "-" to read from stdin)
    #[arg(required_unless_present = "list_providers")]
    query: Option<String>,

    /// Config file (default: MCP_BROWSER_CONFIG, then mcp-browser.yaml lookup)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write the final HTML document here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Emit progress events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Connect to every enabled provider and list its tools
    #[arg(long)]
    list_providers: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = mcp_browser::init_tracing() {
        eprintln!("Warning: file logging disabled: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let providers = config
        .all_providers(&EnvCredentials)
        .context("assembling provider set")?;

    let manager = Arc::new(ConnectionManager::new(Arc::new(McpConnector)));
    manager.set_providers(providers).await;

    let outcome = if cli.list_providers {
        list_providers(&manager, cli.json).await
    } else {
        ask(&cli, &config, manager.clone()).await
    };

    manager.close_all().await;
    outcome
}

async fn ask(cli: &Cli, config: &AppConfig, manager: Arc<ConnectionManager>) -> Result<ExitCode> {
    let query = read_query(cli.query.as_deref())?;
    let backend =
        inference::from_config(&config.backend).context("configuring reasoning backend")?;
    let orchestrator = Orchestrator::new(manager, backend);

    tokio::select! {
        outcome = stream_run(&orchestrator, &query, cli.output.as_deref(), cli.json) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("run interrupted");
            eprintln!("Interrupted.");
            Ok(ExitCode::from(130))
        }
    }
}

/// Print progress as it arrives; deliver the document on completion.
async fn stream_run(
    orchestrator: &Orchestrator,
    query: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<ExitCode> {
    let mut events = orchestrator.run(query);

    while let Some(event) = events.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        match event {
            ProgressEvent::ReasoningText { text } => {
                if !json {
                    eprintln!("… {}", text.trim());
                }
            }
            ProgressEvent::InvocationStart {
                name,
                provider_id,
                arguments,
            } => {
                if !json {
                    eprintln!("→ {name} [{provider_id}] {arguments}");
                }
            }
            ProgressEvent::InvocationResult { name, ok } => {
                if !json {
                    eprintln!("{} {name}", if ok { "✓" } else { "✗" });
                }
            }
            ProgressEvent::Completion { document } => {
                match output {
                    Some(path) => {
                        std::fs::write(path, &document)
                            .with_context(|| format!("writing {}", path.display()))?;
                        eprintln!("Wrote {}", path.display());
                    }
                    None if !json => println!("{document}"),
                    None => {}
                }
                return Ok(ExitCode::SUCCESS);
            }
            ProgressEvent::Failure { message } => {
                if !json {
                    eprintln!("{message}");
                }
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    bail!("run ended without a result")
}

async fn list_providers(manager: &ConnectionManager, json: bool) -> Result<ExitCode> {
    let catalog = manager.list_capabilities().await;
    let statuses = manager.provider_status();

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(ExitCode::SUCCESS);
    }

    if statuses.is_empty() {
        println!("No providers are enabled.");
        return Ok(ExitCode::SUCCESS);
    }

    for status in &statuses {
        let state = match (&status.error, status.connected) {
            (Some(error), _) => format!("error: {error}"),
            (None, true) => format!("{} tools", status.tool_count),
            (None, false) => "not connected".to_string(),
        };
        println!("{} ({}) {state}", status.config.id, status.config.name);
        for tool in catalog.iter().filter(|t| t.provider_id == status.config.id) {
            println!("    {}", tool.namespaced_id);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_query(query: Option<&str>) -> Result<String> {
    let query = match query {
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading query from stdin")?;
            buf
        }
        Some(query) => query.to_string(),
        None => bail!("a query is required"),
    };

    let query = query.trim().to_string();
    if query.is_empty() {
        bail!("the query is empty");
    }
    Ok(query)
}
