/// Mobility Mirror Server - copies vendor exports into owned storage
use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use mobility_core::{JobId, JobRepository, NewJob, StoragePath, SyncStateStore};
use mobility_server::{config::ServerConfig, create_router, state::AppState};
use mobility_storage::{LocalJobStore, LocalObjectStore};
use mobility_sync::{SyncManager, SyncOutcome};
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mobility-server")]
#[command(about = "Mirror vendor mobility exports into owned storage", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Run a sync in the foreground and print its outcome
    Sync {
        /// Job ID
        job_id: String,
        /// Destination override (`s3://bucket/prefix`)
        #[arg(short, long)]
        destination: Option<String>,
    },
    /// Print the resolved sync status of a job as JSON
    Status {
        /// Job ID
        job_id: String,
    },
    /// List all jobs
    ListJobs,
    /// Create a job record
    CreateJob {
        /// Vendor export location (`s3://bucket/prefix`)
        #[arg(short, long)]
        source: String,
        /// Mirror location
        #[arg(short, long)]
        destination: Option<String>,
        /// First requested day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last requested day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "mobility_server=info,mobility_sync=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;
    config.validate()?;

    match cli.command {
        Commands::Serve => {
            serve(config).await?;
        }
        Commands::Sync {
            job_id,
            destination,
        } => {
            sync_job(config, &job_id, destination.as_deref()).await?;
        }
        Commands::Status { job_id } => {
            print_status(config, &job_id).await?;
        }
        Commands::ListJobs => {
            list_jobs(config).await?;
        }
        Commands::CreateJob {
            source,
            destination,
            start,
            end,
        } => {
            let job = NewJob {
                source_path: source,
                destination_path: destination,
                requested_start_date: start,
                requested_end_date: end,
            };
            create_job(config, job).await?;
        }
    }

    Ok(())
}

async fn open_job_store(config: &ServerConfig) -> anyhow::Result<LocalJobStore> {
    if let Some(parent) = sqlite_parent_dir(&config.storage.database_url) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let pool = mobility_storage::create_pool(&config.storage.database_url).await?;
    mobility_storage::run_migrations(&pool).await?;
    tracing::info!("Database connected");

    Ok(LocalJobStore::new(pool))
}

/// Directory of a file-backed SQLite URL, if it has one
fn sqlite_parent_dir(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

async fn build_manager(config: &ServerConfig) -> anyhow::Result<(SyncManager, Arc<LocalJobStore>)> {
    let store = Arc::new(open_job_store(config).await?);
    let objects = LocalObjectStore::new(config.storage.objects_root.clone())
        .with_copy_concurrency(config.sync.copy_concurrency);
    tracing::info!("Object root: {}", objects.root().display());

    let manager = SyncManager::new(
        Arc::clone(&store) as Arc<dyn JobRepository>,
        Arc::new(objects),
        Arc::clone(&store) as Arc<dyn SyncStateStore>,
        config.sync_config(),
    );

    Ok((manager, store))
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Mobility Mirror server");
    tracing::info!("Host: {}", config.server.host);
    tracing::info!("Port: {}", config.server.port);

    let (manager, store) = build_manager(&config).await?;
    let app_state = AppState::new(Arc::new(manager), store);
    let app = create_router(app_state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutting down");
}

async fn sync_job(
    config: ServerConfig,
    job_id: &str,
    destination: Option<&str>,
) -> anyhow::Result<()> {
    let destination = destination
        .map(str::parse::<StoragePath>)
        .transpose()
        .context("invalid destination")?;

    let (manager, _) = build_manager(&config).await?;
    let manager = Arc::new(manager);
    let job_id = JobId::new(job_id);

    // Ctrl-C cancels the run so it records its partial progress
    let canceller = Arc::clone(&manager);
    let cancel_job = job_id.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel_sync(&cancel_job);
        }
    });

    let outcome = manager.run(&job_id, destination).await;
    watcher.abort();

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        SyncOutcome::Completed(_) => Ok(()),
        SyncOutcome::Cancelled { .. } => anyhow::bail!("sync of job {job_id} was cancelled"),
        SyncOutcome::Superseded { .. } => anyhow::bail!("sync of job {job_id} was superseded"),
        SyncOutcome::Failed { message, .. } => anyhow::bail!("sync of job {job_id} failed: {message}"),
    }
}

async fn print_status(config: ServerConfig, job_id: &str) -> anyhow::Result<()> {
    let (manager, _) = build_manager(&config).await?;
    let job_id = JobId::new(job_id);

    let status = manager
        .get_status(&job_id)
        .await?
        .with_context(|| format!("job not found: {job_id}"))?;

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn create_job(config: ServerConfig, job: NewJob) -> anyhow::Result<()> {
    job.source_path
        .parse::<StoragePath>()
        .context("invalid source path")?;

    let store = open_job_store(&config).await?;
    let job = store.create_job(job).await?;

    println!("{}", job.id);
    Ok(())
}

async fn list_jobs(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_job_store(&config).await?;
    let jobs = mobility_storage::jobs::get_all(store.pool()).await?;

    println!("Jobs:");
    for job in jobs {
        let state = if job.synced_at.is_some() {
            "synced"
        } else if job.sync_cancelled_at.is_some() {
            "cancelled"
        } else if job.error_message.is_some() {
            "error"
        } else {
            "-"
        };
        println!(
            "  {} - {} -> {} [{}]",
            job.id,
            job.source_path.as_deref().unwrap_or("-"),
            job.destination_path.as_deref().unwrap_or("-"),
            state
        );
    }

    Ok(())
}
