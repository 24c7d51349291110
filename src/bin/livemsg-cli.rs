//! livemsg CLI - drive the engine against the in-memory host
//!
//! Provides subcommands for writing and checking runtime configuration and
//! for running a scripted counter demo that exercises coalescing, eviction
//! and interaction routing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use livemsg::runtime::host::SendOptions;
use livemsg::runtime::instance::WeakInstance;
use livemsg::runtime::registry::EvictionPolicy;
use livemsg::runtime::router::InteractionEvent;
use livemsg::runtime::{DEFAULT_MAX_INSTANCES, HostNode, MemoryHost};
use livemsg::{Runtime, RuntimeConfig};

#[derive(Parser)]
#[command(name = "livemsg")]
#[command(about = "Live chat messages driven by a declarative tree", long_about = None)]
struct Cli {
    /// Runtime config file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },

    /// Load and validate a config file
    CheckConfig {
        /// Config path
        path: PathBuf,
    },

    /// Run the counter demo against an in-memory host
    Demo {
        /// Number of counter messages to create
        #[arg(long, default_value = "4")]
        instances: usize,

        /// Clicks sent to each counter without waiting
        #[arg(long, default_value = "5")]
        clicks: u64,

        /// Simulated latency of each host operation in milliseconds
        #[arg(long, default_value = "20")]
        latency_ms: u64,

        /// Override the eviction policy from the config
        #[arg(long, value_enum)]
        eviction: Option<EvictionArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EvictionArg {
    CreationOrder,
    RenderOrder,
}

impl From<EvictionArg> for EvictionPolicy {
    fn from(arg: EvictionArg) -> Self {
        match arg {
            EvictionArg::CreationOrder => EvictionPolicy::CreationOrder,
            EvictionArg::RenderOrder => EvictionPolicy::RenderOrder,
        }
    }
}

struct Counter {
    count: AtomicU64,
    instance: OnceLock<WeakInstance>,
}

impl Counter {
    fn view(self: &Arc<Self>) -> Vec<HostNode> {
        let count = self.count.load(Ordering::SeqCst);
        let counter = self.clone();
        vec![
            HostNode::text(format!("Count: {}", count)),
            HostNode::button_with("increment", "+1", move |_event| counter.increment()),
        ]
    }

    fn increment(self: &Arc<Self>) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let Some(instance) = self.instance.get().and_then(WeakInstance::upgrade) else {
            return;
        };
        match instance.request_render(self.view()) {
            Ok(pending) => drop(pending),
            Err(err) => tracing::warn!("Counter render rejected: {}", err),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig { path } => {
            let config = RuntimeConfig::bounded(DEFAULT_MAX_INSTANCES);
            config.save(&path)?;
            println!("Wrote default config to {:?}", path);
        }

        Commands::CheckConfig { path } => {
            let config = RuntimeConfig::load(&path)
                .with_context(|| format!("invalid config {:?}", path))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Demo {
            instances,
            clicks,
            latency_ms,
            eviction,
        } => {
            let mut config = match &cli.config {
                Some(path) => RuntimeConfig::load(path)?,
                None => RuntimeConfig::bounded(3),
            };
            if let Some(eviction) = eviction {
                config.eviction = eviction.into();
            }
            run_demo(config, instances, clicks, Duration::from_millis(latency_ms)).await?;
        }
    }

    Ok(())
}

async fn run_demo(config: RuntimeConfig, instances: usize, clicks: u64, latency: Duration) -> Result<()> {
    let host = MemoryHost::with_latency(latency);
    let runtime = Runtime::new(config, host.clone())?;

    let mut created = Vec::new();
    for _ in 0..instances {
        let counter = Arc::new(Counter {
            count: AtomicU64::new(0),
            instance: OnceLock::new(),
        });
        let instance = runtime.send(counter.view(), SendOptions::default()).await?;
        if counter.instance.set(instance.downgrade()).is_err() {
            tracing::warn!("Counter for {} was already bound", instance.message_id());
        }
        created.push(instance);
    }

    for instance in &created {
        for _ in 0..clicks {
            let event = InteractionEvent::button(instance.message_id().clone(), "increment");
            let outcome = runtime.dispatch(&event);
            if !outcome.is_handled() {
                tracing::info!("Click on {} ignored: {:?}", instance.message_id(), outcome);
                break;
            }
        }
    }

    for instance in &created {
        instance.await_settled().await;
        let message = host.message(instance.message_id());
        println!(
            "{} [{}] edits={} content={:?}",
            instance.message_id(),
            instance.state(),
            host.edit_count(instance.message_id()),
            message.map(|m| m.content).unwrap_or_default()
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.active_instances())?
    );
    Ok(())
}
