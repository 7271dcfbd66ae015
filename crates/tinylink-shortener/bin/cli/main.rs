mod cli;

use crate::cli::{Command, LogFormat, CLI};
use clap::Parser;
use std::sync::Arc;
use tinylink_generator::HashGenerator;
use tinylink_shortener::{
    BatchItem, Result as ShortenerResult, ServiceSettings, Shortener, ShortenerService,
};
use tinylink_storage::{Repository, Storage, StorageConfig};
use tinylink_workerpool::{PoolSettings, WorkerPool};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CLI::try_parse()?;
    init_tracing(&config.log_level, config.log_format)?;

    let storage = Storage::open(&StorageConfig {
        database_dsn: config.database_dsn.clone(),
        file_storage_path: config.file_storage_path.clone(),
    })
    .await?;

    info!(
        storage_backend = storage.kind(),
        short_code_len = config.short_code_len,
        base_url = %config.base_url,
        "starting tinylink"
    );

    let pool_settings = match config.workers {
        Some(workers) => PoolSettings::builder()
            .workers(workers)
            .queue_capacity(config.queue_capacity)
            .build(),
        None => PoolSettings::builder()
            .queue_capacity(config.queue_capacity)
            .build(),
    };
    let pool = Arc::new(WorkerPool::new(pool_settings)?);
    pool.start();

    let generator = HashGenerator::new(usize::from(config.short_code_len))?;
    let service = ShortenerService::new(
        storage,
        generator,
        Arc::clone(&pool),
        ServiceSettings::builder().base_url(config.base_url).build(),
    );

    let outcome = run(&service, &config.owner, config.command).await;

    // Queued deletions finish before storage goes away.
    pool.shutdown()?;
    pool.wait().await;
    if let Err(err) = service.repository().close().await {
        error!(error = %err, "failed to close storage");
    }

    outcome.map_err(Into::into)
}

fn init_tracing(level: &str, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| err as Box<dyn std::error::Error>)
}

async fn run<S: Shortener>(service: &S, owner: &str, command: Command) -> ShortenerResult<()> {
    match command {
        Command::Shorten { url } => {
            println!("{}", service.encode(&url, owner).await?);
        }
        Command::ShortenBatch { items } => {
            let items = items
                .into_iter()
                .map(|(correlation_id, original_url)| BatchItem {
                    correlation_id,
                    original_url,
                })
                .collect();
            for result in service.encode_batch(items, owner).await? {
                println!("{}\t{}", result.correlation_id, result.short_url);
            }
        }
        Command::Resolve { code } => {
            println!("{}", service.decode(&code).await?);
        }
        Command::List => {
            for url in service.list_user(owner).await? {
                println!("{}\t{}", url.short_url, url.original_url);
            }
        }
        Command::Delete { codes } => {
            let count = codes.len();
            service.request_delete(owner, codes).await?;
            println!("queued {count} code(s) for deletion");
        }
        Command::Stats => {
            let stats = service.statistics().await?;
            println!("urls\t{}\nusers\t{}", stats.urls, stats.users);
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}
