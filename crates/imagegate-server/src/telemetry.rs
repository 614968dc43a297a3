//! Logging bootstrap.
//!
//! The teacher (`ferroid-tonic-server::server::telemetry`) wires a full
//! OpenTelemetry/Honeycomb exporter stack behind feature flags; none of that
//! has a consumer in this service, so only the `tracing-subscriber`
//! env-filter half survives, optionally duplicating output to a rolling
//! file via `tracing-appender`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Must be kept alive for the process lifetime; dropping it stops the
/// background flush thread and silently truncates buffered log lines.
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(log_level: &str, log_file: Option<&std::path::Path>) -> anyhow::Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("the literal fallback directive always parses");

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(dir) = dir {
                std::fs::create_dir_all(dir)?;
            }
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("LOG_FILE must name a file, got {path:?}"))?;
            let appender = tracing_appender::rolling::never(
                dir.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install global tracing subscriber: {e}"))?;

    Ok(TelemetryGuard {
        _file_guard: guard,
    })
}
