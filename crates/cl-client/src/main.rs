//! clusterlink cluster member
//!
//! Connects one cluster member to the coordinating server, then either stays
//! online to watch the cluster and answer queries, pushes a single piece of
//! data, or asks other members a question.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cl_client::{ClientEvent, ClusterClient, ConnectionState, EventKind};
use cl_core::config::{self, ClientConfig};
use cl_protocol::{CccData, CccTarget, CloseReason};

#[derive(Parser)]
#[command(name = "cl-client")]
#[command(about = "clusterlink cluster member - connects to the coordinating server")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server endpoint
    /// Example: ws://coordinator:8000/manager
    #[arg(long)]
    url: Option<String>,

    /// Authentication token
    #[arg(long, env = "CLUSTERLINK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// This member's cluster id
    #[arg(long)]
    cluster_id: Option<u32>,

    /// Total number of clusters
    #[arg(long)]
    cluster_count: Option<u32>,

    /// JSON file with the local data schema
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Do not reconnect when the connection drops
    #[arg(long)]
    no_reconnect: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stay connected and log cluster events
    Run {
        /// Answer queries from other members with their own text
        #[arg(long)]
        echo: bool,
    },
    /// Push data and print whether the server accepted it
    Send {
        /// Data category
        #[arg(long = "type", default_value_t = 0)]
        kind: u8,
        /// JSON payload
        data: String,
    },
    /// Ask one member, or all of them, and print the answer
    Query {
        /// Cluster id, or "all"
        #[arg(long)]
        to: CccTarget,
        /// Query text
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    let schema = load_schema(&args, &config)?;
    tracing::debug!("Using configuration {:?}", config);

    let client = ClusterClient::new(config, schema).context("Invalid configuration")?;

    match args.command {
        Command::Run { echo } => run(client, echo).await,
        Command::Send { kind, data } => {
            let data: Value = serde_json::from_str(&data).context("Payload is not valid JSON")?;
            client.connect().await.context("Failed to connect")?;
            let accepted = client.send_data(kind, data).await;
            disconnect(&client).await;
            let accepted = accepted.context("Failed to send data")?;
            println!("{}", if accepted { "accepted" } else { "rejected" });
            Ok(())
        }
        Command::Query { to, data } => {
            client.connect().await.context("Failed to connect")?;
            let response = client.start_ccc(to, data).await;
            disconnect(&client).await;
            let response = response.context("Query failed")?;
            match response.data {
                CccData::Single(answer) => println!("{}", answer),
                CccData::Many(answers) => {
                    for answer in answers {
                        println!("{}", answer);
                    }
                }
            }
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(config::default_config_path);

    let mut config = if config_path.exists() {
        config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        if args.config.is_some() {
            anyhow::bail!("Config file {:?} does not exist", config_path);
        }
        ClientConfig::default()
    };

    // Apply command-line overrides
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(token) = &args.token {
        config.token = token.clone();
    }
    if let Some(id) = args.cluster_id {
        config.cluster.id = id;
    }
    if let Some(count) = args.cluster_count {
        config.cluster.count = count;
    }
    if let Some(schema) = &args.schema {
        config.schema_path = Some(schema.clone());
    }
    if args.no_reconnect {
        config.reconnect = false;
    }

    Ok(config)
}

fn load_schema(args: &Args, config: &ClientConfig) -> Result<Value> {
    match args.schema.as_ref().or(config.schema_path.as_ref()) {
        Some(path) => config::load_schema(path).context("Failed to load schema"),
        None => {
            tracing::warn!("No schema configured, using an empty schema");
            Ok(Value::Object(Default::default()))
        }
    }
}

async fn run(client: ClusterClient, echo: bool) -> Result<()> {
    let kinds: &[EventKind] = if echo {
        &[
            EventKind::Connected,
            EventKind::Disconnected,
            EventKind::ClusterStatus,
            EventKind::DataPushed,
            EventKind::CccQuery,
        ]
    } else {
        EventKind::NOTIFICATIONS
    };
    let mut events = client.subscribe_to(kinds);
    let mut state = client.watch_state();

    client.connect().await.context("Failed to connect")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                disconnect(&client).await;
                break;
            }
            event = events.recv() => match event {
                Some(event) => handle_event(event).await,
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow() == ConnectionState::Closed {
                    tracing::info!("Session closed");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn handle_event(event: ClientEvent) {
    match event {
        ClientEvent::Connected => tracing::info!("Connected"),
        ClientEvent::Disconnected(cause) => tracing::warn!("Disconnected: {}", cause),
        ClientEvent::ClusterStatus { count, connected } => {
            tracing::info!(
                "Cluster status: {}/{} connected {:?}",
                connected.len(),
                count,
                connected
            );
        }
        ClientEvent::DataPushed => tracing::info!("Server has new data"),
        ClientEvent::CccQuery(query) => {
            tracing::info!("Query {} from cluster: {}", query.id(), query.data());
            if let Err(e) = query.reply(query.data()).await {
                tracing::warn!("Failed to answer query {}: {}", query.id(), e);
            }
        }
    }
}

async fn disconnect(client: &ClusterClient) {
    if let Err(e) = client.disconnect(CloseReason::Ok).await {
        tracing::debug!("Disconnect: {}", e);
    }
}
