use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const DEFAULT_FILTER: &str = "info,tower_http=warn,hyper=warn";

pub struct LoggingHandle {
    pub run_id: String,
    pub guard: WorkerGuard,
}

pub fn init_logging(config: &Config) -> anyhow::Result<LoggingHandle> {
    let filter = std::env::var("PAIRPAD_LOG_FILTER")
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let log_path = config.log_dir().join("server.log");
    let (writer, guard): (NonBlocking, WorkerGuard) = if config.log_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        std::fs::create_dir_all(config.log_dir())?;
        tracing_appender::non_blocking(tracing_appender::rolling::never(
            config.log_dir(),
            "server.log",
        ))
    };

    let default_format = if config.log_stderr { "pretty" } else { "json" };
    let format =
        std::env::var("PAIRPAD_LOG_FORMAT").unwrap_or_else(|_| default_format.to_string());

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("pretty") {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .json()
                    .flatten_event(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(true)
                    .with_current_span(true),
            )
            .init();
    }

    let run_id = std::env::var("PAIRPAD_RUN_ID").unwrap_or_else(|_| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("pid-{}-{}", std::process::id(), now)
    });

    let destination = if config.log_stderr {
        "stderr".to_string()
    } else {
        log_path.display().to_string()
    };

    tracing::info!(
        component = "logging",
        event = "logging.initialized",
        run_id = %run_id,
        destination = %destination,
        format = %format,
        filter = %std::env::var("PAIRPAD_LOG_FILTER")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
    );

    Ok(LoggingHandle { run_id, guard })
}
