use anyhow::Context;
use clap::{Parser, Subcommand};
use slurm_informer::slurm::client::parse_versions;
use slurm_informer::{
    ChannelHandler, Client, ClientConfig, EventType, GetOptions, ListOptions, ObjectKey, ObjectType,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// slurmrestd base URL
    #[arg(short, long, env = "SLURM_REST_URL")]
    server: Option<String>,

    /// JWT for slurmrestd
    #[arg(long, env = "SLURM_JWT", hide_env_values = true)]
    token: Option<String>,

    /// Protocol versions to try, most preferred first (e.g. v0.0.43,v0.0.42)
    #[arg(long, env = "SLURM_REST_VERSIONS")]
    versions: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report controller liveness
    Ping,
    /// List every object of a kind (Node, JobInfo, PartitionInfo)
    List { kind: ObjectType },
    /// Show one object
    Get { kind: ObjectType, key: String },
    /// Print cache events for a kind until interrupted
    Watch { kind: ObjectType },
}

fn config(args: &Args) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env()?;
    if let Some(server) = &args.server {
        config = config.with_server(server.clone());
    }
    if let Some(token) = &args.token {
        config = config.with_auth_token(token.clone());
    }
    if let Some(versions) = &args.versions {
        config = config.with_versions(parse_versions(versions)?);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = Client::new(config(&args)?).context("creating slurm client")?;

    match args.command {
        Command::Ping => {
            for ping in client.ping().await? {
                println!(
                    "{}\t{}\t{}\t{}us",
                    ping.hostname,
                    ping.mode,
                    if ping.is_up() { "UP" } else { "DOWN" },
                    ping.latency
                );
            }
        }
        Command::List { kind } => {
            let list = client.list(kind, &ListOptions::bypass()).await?;
            for item in list.items() {
                println!("{}", serde_json::to_string(&item.to_json()?)?);
            }
        }
        Command::Get { kind, key } => {
            let object = client
                .get(kind, &ObjectKey::from(key), &GetOptions::bypass())
                .await?;
            println!("{}", serde_json::to_string_pretty(&object.to_json()?)?);
        }
        Command::Watch { kind } => watch(&client, kind).await?,
    }

    Ok(())
}

async fn watch(client: &Client, kind: ObjectType) -> anyhow::Result<()> {
    if client.config().is_uncached(kind) {
        anyhow::bail!("{kind} is not cached, nothing to watch");
    }

    let (handler, mut events) = ChannelHandler::new();
    client.set_event_handler(kind, Arc::new(handler)).await;
    client.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                let marker = match event.event_type {
                    EventType::Added => "+",
                    EventType::Modified => "~",
                    EventType::Deleted => "-",
                };
                println!("{} {} {}", marker, kind, event.object.key());
            }
        }
    }

    client.stop().await;
    Ok(())
}
