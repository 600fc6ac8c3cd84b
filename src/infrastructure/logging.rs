use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

static INIT: OnceCell<()> = OnceCell::new();
static GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const LOG_FILE_PREFIX: &str = "detoxify.log";

/// Dependencies that are chatty at debug level.
const QUIET_TARGETS: [&str; 4] = ["sqlx", "hyper", "reqwest", "rustls"];

fn filter_directives(level: &str) -> String {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

/// Compact console output on stderr plus a daily rolling file. Safe to call more than once.
///
/// `RUST_LOG` wins over `LOG_LEVEL` when set.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    INIT.get_or_try_init::<_, anyhow::Error>(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(filter_directives(&config.logging.level)))
            .unwrap_or_else(|_| EnvFilter::new(filter_directives("info")));

        let (file_writer, guard) = tracing_appender::non_blocking(
            tracing_appender::rolling::daily(&paths.logs_dir, LOG_FILE_PREFIX),
        );
        let _ = GUARD.set(guard);

        // stdin carries the chat feed, so the console gets stderr.
        let console_layer = fmt::layer().compact().with_writer(io::stderr);
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_thread_ids(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::info!(
            logs = %paths.logs_dir.display(),
            level = %config.logging.level,
            "tracing initialized"
        );
        Ok(())
    })?;
    Ok(())
}
