use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use branch_navigator::{
    BranchNavigator, BranchVersionStore, DeepLinkResolver, NavigationAxis, NavigationOutcome,
};
use chat_client::HttpChatClient;
use chat_core::{Config, MessageId};
use clap::{Parser, Subcommand};
use colored::Colorize;
use stream_resume::{ResumableStreamClient, StreamClientConfig, StreamUpdate};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chat-cli")]
#[command(about = "Resume message streams and navigate branches and versions")]
#[command(version)]
struct Cli {
    /// Store API base URL (overrides config and CHAT_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Delay between resume calls
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Enable debug mode
    #[arg(long, short, default_value = "false")]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a message stream until it completes
    Stream { message_id: String },
    /// List the branches of a message
    Branches { message_id: String },
    /// List the versions of a message
    Versions { message_id: String },
    /// Switch to the next branch (or version)
    Next {
        message_id: String,
        #[arg(long)]
        versions: bool,
    },
    /// Switch to the previous branch (or version)
    Prev {
        message_id: String,
        #[arg(long)]
        versions: bool,
    },
    /// Follow a deep link (`<message>`, `<message>/<branch>` or a URL)
    Open { locator: String },
    /// Edit a message, creating a new branch
    Edit { message_id: String, content: String },
    /// Regenerate a message, creating a new version
    Retry {
        message_id: String,
        #[arg(long, default_value = "")]
        model: String,
    },
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_line_number(debug)
                .with_file(false),
        )
        .init();
}

fn axis(versions: bool) -> NavigationAxis {
    if versions {
        NavigationAxis::Versions
    } else {
        NavigationAxis::Branches
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = Config::new();
    if let Some(api_base) = cli.api_base {
        config.api_base = api_base;
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }
    tracing::debug!(api_base = %config.api_base, poll_interval_ms = config.poll_interval_ms, "Configuration loaded");

    let client = Arc::new(HttpChatClient::new(&config).context("failed to build store client")?);
    let streams = ResumableStreamClient::new(client.clone(), StreamClientConfig::from(&config));
    let store = Arc::new(BranchVersionStore::new(client));
    let navigator = Arc::new(BranchNavigator::new(store, streams));

    match cli.command {
        Commands::Stream { message_id } => follow_stream(&navigator, &MessageId::new(message_id)).await,
        Commands::Branches { message_id } => list_branches(&navigator, &MessageId::new(message_id)).await,
        Commands::Versions { message_id } => list_versions(&navigator, &MessageId::new(message_id)).await,
        Commands::Next { message_id, versions } => {
            step(&navigator, &MessageId::new(message_id), axis(versions), true).await
        }
        Commands::Prev { message_id, versions } => {
            step(&navigator, &MessageId::new(message_id), axis(versions), false).await
        }
        Commands::Open { locator } => open(navigator, &locator).await,
        Commands::Edit { message_id, content } => {
            let message_id = MessageId::new(message_id);
            let branch_id = navigator.edit(&message_id, &content).await?;
            println!("{}", format!("✅ New branch {branch_id}").green());
            print_view(&navigator, &message_id, NavigationAxis::Branches);
            Ok(())
        }
        Commands::Retry { message_id, model } => {
            let message_id = MessageId::new(message_id);
            let version_id = navigator.retry(&message_id, &model).await?;
            println!("{}", format!("✅ New version {version_id}").green());
            print_view(&navigator, &message_id, NavigationAxis::Versions);
            Ok(())
        }
    }
}

async fn follow_stream(navigator: &BranchNavigator, message_id: &MessageId) -> anyhow::Result<()> {
    let streams = navigator.streams();
    let mut updates = streams.subscribe();
    streams.activate(message_id).await?;

    println!("{}", format!("📡 Streaming message {message_id}").cyan());
    println!("{}", "─".repeat(50).dimmed());

    loop {
        let update = tokio::select! {
            update = updates.recv() => update,
            _ = tokio::signal::ctrl_c() => {
                streams.deactivate(message_id).await;
                println!();
                println!("{}", "⏹ Stopped".yellow());
                return Ok(());
            }
        };

        let update = match update {
            Ok(update) if update.message_id() == message_id => update,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Stream output lagging, re-reading snapshot");
                if let Some(snapshot) = streams.snapshot(message_id).await {
                    println!();
                    print!("{}", snapshot.content.green());
                    io::stdout().flush()?;
                }
                continue;
            }
            Err(RecvError::Closed) => return Ok(()),
        };

        match update {
            StreamUpdate::ContentUpdated { delta, .. } => {
                print!("{}", delta.green());
                io::stdout().flush()?;
            }
            StreamUpdate::Completed { content, position, .. } => {
                println!();
                println!("{}", "─".repeat(50).dimmed());
                println!(
                    "{}",
                    format!("✅ Complete: {} chars at position {position}", content.chars().count()).green()
                );
                return Ok(());
            }
            StreamUpdate::Failed { error, .. } => {
                println!();
                println!("{}", format!("❌ {error}").red());
                if !ask("Retry?")? {
                    streams.deactivate(message_id).await;
                    return Ok(());
                }
                streams.retry(message_id).await?;
            }
            StreamUpdate::Cancelled { .. } => return Ok(()),
        }
    }
}

fn ask(question: &str) -> anyhow::Result<bool> {
    print!("{} {} ", question.yellow(), "[y/N]".dimmed());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

async fn list_branches(navigator: &BranchNavigator, message_id: &MessageId) -> anyhow::Result<()> {
    let projection = navigator.store().refresh_branches(message_id).await?;
    if projection.is_empty() {
        println!("{}", "No branches".dimmed());
        return Ok(());
    }
    for (index, branch) in projection.branches.iter().enumerate() {
        let line = format!("{:>3}  {}  (ordinal {})", index + 1, branch.id, branch.ordinal);
        if projection.active_index == Some(index) {
            println!("{} {}", "▶".green(), line.green().bold());
        } else {
            println!("  {line}");
        }
    }
    print_view(navigator, message_id, NavigationAxis::Branches);
    Ok(())
}

async fn list_versions(navigator: &BranchNavigator, message_id: &MessageId) -> anyhow::Result<()> {
    let projection = navigator.store().refresh_versions(message_id).await?;
    if projection.is_empty() {
        println!("{}", "No versions".dimmed());
        return Ok(());
    }
    for (index, version) in projection.versions.iter().enumerate() {
        let preview: String = version.content.chars().take(60).collect();
        let line = format!(
            "{:>3}  {}  {}  {}",
            index + 1,
            version.model,
            version.created_at.format("%Y-%m-%d %H:%M:%S"),
            preview
        );
        if projection.active_index == Some(index) {
            println!("{} {}", "▶".green(), line.green().bold());
        } else {
            println!("  {line}");
        }
    }
    print_view(navigator, message_id, NavigationAxis::Versions);
    Ok(())
}

async fn step(
    navigator: &BranchNavigator,
    message_id: &MessageId,
    axis: NavigationAxis,
    forward: bool,
) -> anyhow::Result<()> {
    let outcome = if forward {
        navigator.next(message_id, axis).await?
    } else {
        navigator.prev(message_id, axis).await?
    };
    report(outcome);
    print_view(navigator, message_id, axis);
    Ok(())
}

async fn open(navigator: Arc<BranchNavigator>, locator: &str) -> anyhow::Result<()> {
    let resolver = DeepLinkResolver::new(navigator);
    let resolution = resolver.resolve_str(locator).await?;
    report(resolution.outcome);
    println!("{}", format!("💬 Message {}", resolution.message_id).cyan());
    if let Some(branch_id) = &resolution.active_branch_id {
        println!("{}", format!("🌿 Branch {branch_id}").cyan());
    }
    if let Some(view) = &resolution.view {
        println!("{}", view.label.bold());
    }
    Ok(())
}

fn report(outcome: NavigationOutcome) {
    match outcome {
        NavigationOutcome::Switched => println!("{}", "✅ Switched".green()),
        NavigationOutcome::Unchanged => println!("{}", "Already there".dimmed()),
        NavigationOutcome::Ignored => println!("{}", "⏳ Navigation in progress, ignored".yellow()),
    }
}

fn print_view(navigator: &BranchNavigator, message_id: &MessageId, axis: NavigationAxis) {
    match navigator.view(message_id, axis) {
        Some(view) => println!("{}", view.label.bold()),
        None => println!("{}", "No alternatives".dimmed()),
    }
}
