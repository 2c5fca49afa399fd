use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use odr_events::Bus;
use odr_mock_port::{MockBehavior, MockPort};
use odr_port::PortError;
use odr_registry::{LoadUpdate, RegistryConfig, ResourceRegistry};

#[derive(Parser)]
#[command(name = "odr-probe", version, about = "Resource registry smoke driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted request/prefetch/release pass against the mock port
    Demo(DemoArgs),
}

#[derive(Args)]
struct DemoArgs {
    /// Comma-delimited tags to request one by one
    #[arg(long, default_value = "Chapter1,Chapter2")]
    tags: String,
    /// Comma-delimited tags to prefetch up front
    #[arg(long, default_value = "Chapter3,Chapter4")]
    prefetch: String,
    /// Tag scripted to fail with an out-of-space error
    #[arg(long, default_value = "Chapter2")]
    fail: String,
    /// Tag scripted as already cached (requested with reload off)
    #[arg(long)]
    cached: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo(args) => run_demo(args).await,
    }
}

async fn run_demo(args: DemoArgs) -> Result<()> {
    let port = MockPort::new();
    if !args.fail.trim().is_empty() {
        port.script(args.fail.trim(), MockBehavior::Fail(PortError::OutOfSpace));
    }
    if let Some(cached) = args.cached.as_deref() {
        port.script(cached.trim(), MockBehavior::Cached);
    }

    let bus = Bus::new(64);
    let mut events = bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(env) = events.recv().await {
            println!(
                "event {} {}",
                env.kind,
                serde_json::to_string(&env.payload).unwrap_or_default()
            );
        }
    });

    let registry = ResourceRegistry::new(bus, RegistryConfig::new(port).from_env());
    let board = registry.board();

    registry.prefetch_resources(&args.prefetch, true).await;

    for tag in args.tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let reload = args.cached.as_deref().map(str::trim) != Some(tag);
        let mut ticket = registry.request_resource(tag, reload).await;
        while let Some(update) = ticket.next().await {
            match update {
                LoadUpdate::Loading => println!("{tag}: loading"),
                LoadUpdate::Loaded => println!("{tag}: loaded"),
                LoadUpdate::Failed(message) => println!("{tag}: failed ({message})"),
            }
        }
    }

    // Give prefetch jobs a moment to settle before the summary.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    println!("loading now: {}", board.is_loading());
    if !board.last_error().is_empty() {
        println!("last error: {}", board.last_error());
    }
    for snap in registry.snapshot().await {
        println!("record {}", serde_json::to_string(&snap)?);
    }

    registry.release_failed().await;
    println!("after release_failed: {} records", registry.snapshot().await.len());
    registry.release_all().await;
    println!("after release_all: {} records", registry.snapshot().await.len());

    printer.abort();
    Ok(())
}
