//! CLI/env configuration, following `ferroid-tonic-server::server::config`'s
//! `CliArgs` → fallible `TryFrom` → `ServerConfig` pattern.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use imagegate_core::DEFAULT_MAX_TOTAL_PIXELS;

#[derive(Parser, Debug)]
#[command(name = "imagegate-server", about = "Image generation inference gateway")]
pub struct CliArgs {
    /// Number of in-process generation workers.
    #[arg(long, env = "NUM_WORKER_PROCESSES", default_value_t = 1)]
    pub num_workers: usize,

    /// Per-batch pixel budget (width * height * n), used both for single
    /// request admission and batch coalescing.
    #[arg(long, env = "MAX_TOTAL_PIXELS", default_value_t = DEFAULT_MAX_TOTAL_PIXELS)]
    pub max_total_pixels: u64,

    /// Filesystem path to the diffusion model weights. The bundled
    /// `SyntheticPipeline` accepts any path, including one that does not
    /// exist, and uses it only for logging.
    #[arg(long, env = "MODEL_PATH", default_value = "/models/imagegate")]
    pub model_path: PathBuf,

    /// Whether to coalesce same-shape requests into one pipeline invocation.
    #[arg(long, env = "ENABLE_PROMPT_BATCHING", default_value_t = true)]
    pub enable_prompt_batching: bool,

    /// Maximum time a request waits in a pending batch slot before the slot
    /// flushes regardless of size, in seconds.
    #[arg(long, env = "BATCH_TIMEOUT", default_value_t = 0.5)]
    pub batch_timeout: f64,

    /// Maximum number of requests coalesced into a single batch.
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 8)]
    pub max_batch_size: usize,

    /// `tracing-subscriber` `EnvFilter` directive, e.g. `info` or
    /// `imagegate_server=debug,tower_http=info`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Optional path to a log file. When unset, logs go to stdout only.
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Address the HTTP server binds to.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8000")]
    pub server_addr: String,

    /// Grace period for in-flight requests to finish during shutdown, in
    /// seconds, before workers are force-terminated.
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    /// Directory the gallery store persists images and its JSON index to.
    #[arg(long, env = "GALLERY_DIR", default_value = "static/images")]
    pub gallery_dir: PathBuf,

    /// Base URL of an OpenAI-compatible chat completions endpoint used for
    /// prompt optimize/translate pass-through. Unset disables those routes.
    #[arg(long, env = "PROMPT_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// API key sent as a bearer token to `llm_base_url`.
    #[arg(long, env = "PROMPT_LLM_API_KEY")]
    pub llm_api_key: Option<String>,
}

/// Validated, ready-to-use server configuration. Distinct from [`CliArgs`]
/// so downstream code works with parsed/typed values (`SocketAddr`,
/// `Duration`) instead of re-deriving them at every use site.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub num_workers: usize,
    pub max_total_pixels: u64,
    pub model_path: PathBuf,
    pub enable_prompt_batching: bool,
    pub batch_timeout: Duration,
    pub max_batch_size: usize,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub server_addr: SocketAddr,
    pub shutdown_timeout: Duration,
    pub gallery_dir: PathBuf,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            anyhow::bail!("num_workers must be at least 1");
        }
        if args.max_batch_size == 0 {
            anyhow::bail!("max_batch_size must be at least 1");
        }
        if !args.batch_timeout.is_finite() || args.batch_timeout <= 0.0 {
            anyhow::bail!("batch_timeout must be a positive number of seconds");
        }
        let server_addr = args
            .server_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid SERVER_ADDR {:?}: {e}", args.server_addr))?;

        Ok(Self {
            num_workers: args.num_workers,
            max_total_pixels: args.max_total_pixels,
            model_path: args.model_path,
            enable_prompt_batching: args.enable_prompt_batching,
            batch_timeout: Duration::from_secs_f64(args.batch_timeout),
            max_batch_size: args.max_batch_size,
            log_level: args.log_level,
            log_file: args.log_file,
            server_addr,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
            gallery_dir: args.gallery_dir,
            llm_base_url: args.llm_base_url,
            llm_api_key: args.llm_api_key,
        })
    }
}
