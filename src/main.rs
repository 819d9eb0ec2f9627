use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use work_dispatcher::server::config::ServerConfig;
use work_dispatcher::server::lifecycle::DispatcherServer;

/// Hands out the lines of a JSONL file to workers over HTTP and persists
/// one result line per input line, in input order. Progress is
/// checkpointed; restarting with the same arguments resumes where the
/// last run left off.
#[derive(Debug, Parser)]
#[command(name = "work-dispatcher")]
struct Args {
    /// Input file, one JSON record per line.
    #[arg(long)]
    infile: PathBuf,

    /// Output file; line i holds the result for input line i.
    #[arg(long)]
    outfile: PathBuf,

    /// Checkpoint file (defaults to <outfile>.checkpoint).
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Seconds before issued work is considered lost and re-issued.
    #[arg(long, default_value_t = 3600)]
    work_timeout: u64,

    /// Seconds between checkpoint writes.
    #[arg(long, default_value_t = 60)]
    checkpoint_interval: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let checkpoint = args.checkpoint.unwrap_or_else(|| {
        let mut path = args.outfile.as_os_str().to_owned();
        path.push(".checkpoint");
        PathBuf::from(path)
    });
    let config = ServerConfig {
        infile: args.infile,
        outfile: args.outfile,
        checkpoint,
        host: args.host,
        port: args.port,
        work_timeout: Duration::from_secs(args.work_timeout),
        checkpoint_interval: Duration::from_secs(args.checkpoint_interval),
    };

    if let Err(err) = run(config).await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let server = DispatcherServer::bind(&config).await?;
    tracing::info!(
        "Dispatcher listening on {} (infile={}, outfile={}, checkpoint={}, work_timeout={}s, checkpoint_interval={}s)",
        server.local_addr()?,
        config.infile.display(),
        config.outfile.display(),
        config.checkpoint.display(),
        config.work_timeout.as_secs(),
        config.checkpoint_interval.as_secs()
    );
    server.run().await
}
