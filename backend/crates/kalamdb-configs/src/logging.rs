// Logging module (tracing-subscriber)
//
// Library crates log through the `log` facade. A compatibility bridge
// (`tracing_log::LogTracer`) routes those records through the tracing
// subscriber installed here.

use std::collections::HashMap;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::LoggingSettings;

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line text: timestamp, level, target, message
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Build the `EnvFilter` from the base level and optional per-target overrides.
pub fn build_env_filter(
    level: &str,
    target_levels: Option<&HashMap<String, String>>,
) -> anyhow::Result<EnvFilter> {
    let mut directives = vec![level.to_string()];

    if let Some(map) = target_levels {
        // Sorted so the resulting directive string is stable
        let mut targets: Vec<_> = map.iter().collect();
        targets.sort();
        for (target, lvl) in targets {
            directives.push(format!("{}={}", target, lvl));
        }
    }

    let filter_str = directives.join(",");
    EnvFilter::try_new(&filter_str)
        .map_err(|e| anyhow::anyhow!("Invalid tracing filter '{}': {}", filter_str, e))
}

/// Initialize logging based on configuration.
///
/// Installs a console layer (compact text or JSON lines) filtered by the
/// configured level and target overrides, and bridges `log::*` records into
/// tracing. Calling this more than once keeps the first subscriber.
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = build_env_filter(&settings.level, Some(&settings.targets))?;

    // ok() in case a logger is already installed
    tracing_log::LogTracer::init().ok();

    if !settings.log_to_console {
        return Ok(());
    }

    let console_layer = match LogFormat::parse(&settings.format) {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter)
            .boxed(),
    };

    if tracing_subscriber::registry().with(console_layer).try_init().is_ok() {
        tracing::trace!(
            "Logging initialized: level={}, format={}",
            settings.level,
            settings.format
        );
    }

    Ok(())
}

/// Console logging for tests, honouring `RUST_LOG` when set.
pub fn init_test_logging() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    let settings = LoggingSettings {
        level,
        ..LoggingSettings::default()
    };
    if let Err(e) = init_logging(&settings) {
        eprintln!("failed to initialise test logging: {}", e);
    }
}
