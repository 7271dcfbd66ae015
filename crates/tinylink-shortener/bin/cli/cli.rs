use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DATABASE_DSN_ENV: &str = "TINYLINK_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "TINYLINK_FILE_STORAGE_PATH";
pub const SHORT_CODE_LEN_ENV: &str = "TINYLINK_SHORT_CODE_LEN";
pub const BASE_URL_ENV: &str = "TINYLINK_BASE_URL";
pub const WORKERS_ENV: &str = "TINYLINK_WORKERS";
pub const QUEUE_CAPACITY_ENV: &str = "TINYLINK_QUEUE_CAPACITY";
pub const LOG_LEVEL_ENV: &str = "TINYLINK_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";
pub const OWNER_ENV: &str = "TINYLINK_OWNER";

pub const DEFAULT_SHORT_CODE_LEN: &str = "8";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_QUEUE_CAPACITY: &str = "16";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_OWNER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[value(name = "text")]
    Text,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tinylink", version, about = "Shorten, resolve and delete links")]
pub struct CLI {
    /// PostgreSQL DSN. Takes precedence over the file store.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// JSON-lines file backing the file store.
    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(
        long,
        env = SHORT_CODE_LEN_ENV,
        default_value = DEFAULT_SHORT_CODE_LEN,
        value_parser = clap::value_parser!(u8).range(1..=24),
    )]
    pub short_code_len: u8,

    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Deletion workers. Defaults to the available parallelism.
    #[arg(long, env = WORKERS_ENV)]
    pub workers: Option<usize>,

    #[arg(long, env = QUEUE_CAPACITY_ENV, default_value = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Filter used when `RUST_LOG` is unset.
    #[arg(long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[arg(long, env = LOG_FORMAT_ENV, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// User the command acts for.
    #[arg(long, global = true, env = OWNER_ENV, default_value = DEFAULT_OWNER)]
    pub owner: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL.
    Shorten { url: String },
    /// Shorten several URLs; each argument is `correlation_id=url`.
    ShortenBatch {
        #[arg(required = true, value_parser = parse_batch_item)]
        items: Vec<(String, String)>,
    },
    /// Print the URL behind a short code.
    Resolve { code: String },
    /// List the owner's live links.
    List,
    /// Delete the owner's short codes.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Print URL and user counts.
    Stats,
    /// Check that storage is reachable.
    Ping,
}

fn parse_batch_item(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(id, url)| (id.to_string(), url.to_string()))
        .ok_or_else(|| format!("expected `correlation_id=url`, got `{value}`"))
}
