use clap::{Parser, Subcommand};
use distributed_digest::config::Config;
use distributed_digest::master::server::{prepare, serve, spawn_progress_reporter};
use distributed_digest::worker::WorkerPool;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "distributed-digest", version, about = "Distributed file digest cluster")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a home directory and serve its files to workers
    Master {
        /// Directory whose files are digested
        #[arg(long)]
        home: Option<PathBuf>,

        /// Address to listen on
        #[arg(long, env = "DIGEST_MASTER_ADDR", default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Window added to a worker's estimate before a file is reclaimed
        #[arg(long)]
        processing_timeout_secs: Option<u64>,

        /// Bytes per streamed body frame
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Pull files from a master until the job is drained
    Worker {
        /// Master address
        #[arg(long, env = "DIGEST_MASTER_ADDR", default_value = "127.0.0.1:8000")]
        master: SocketAddr,

        /// Base worker name; slots register as <name>-<slot>
        #[arg(long)]
        name: Option<String>,

        /// Concurrent slots (defaults to the number of CPUs)
        #[arg(long)]
        processes: Option<usize>,

        /// Bytes per digest update
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Sleep after a retry-later answer
        #[arg(long)]
        retry_backoff_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::default();

    match cli.command {
        Command::Master {
            home,
            bind,
            processing_timeout_secs,
            chunk_size,
        } => {
            config.master_addr = bind;
            if let Some(secs) = processing_timeout_secs {
                config.processing_timeout = Duration::from_secs(secs);
            }
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            config.validate()?;

            let home = match home {
                Some(home) => home,
                None => std::env::current_dir()?,
            };
            tracing::info!("Starting master for {}", home.display());

            let state = prepare(home, &config)?;
            spawn_progress_reporter(state.clone(), config.progress_interval);

            let listener = tokio::net::TcpListener::bind(config.master_addr).await?;
            tracing::info!("Press Ctrl+C to shutdown");
            serve(listener, state, async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down master");
            })
            .await?;
        }

        Command::Worker {
            master,
            name,
            processes,
            chunk_size,
            retry_backoff_secs,
        } => {
            config.master_addr = master;
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(secs) = retry_backoff_secs {
                config.retry_backoff = Duration::from_secs(secs);
            }
            config.validate()?;

            let name = name.unwrap_or_else(default_worker_name);
            let processes = processes.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });

            let report = WorkerPool::new(name, processes, config).run().await;
            tracing::info!(
                "Pool finished: {} files digested by {} slots",
                report.total_files(),
                report.summaries.len()
            );

            if !report.is_success() {
                anyhow::bail!(
                    "{} worker slot(s) failed: {}",
                    report.failures.len(),
                    report.failures.join("; ")
                );
            }
        }
    }

    Ok(())
}

fn default_worker_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("worker-{}", &id[..8])
}
