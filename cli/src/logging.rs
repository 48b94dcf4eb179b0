//! Logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events follow `--log-level`; everything else stays at warn
const OWN_TARGETS: [&str; 3] = ["cipherpulse", "cipherpulse_sync", "cipherpulse_storage"];

/// Default filter directives for `level`
fn directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for target in OWN_TARGETS {
        directives.push_str(&format!(",{}={}", target, level));
    }
    directives
}

/// Initialize logging; `RUST_LOG` overrides `level`
pub fn init(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(level)))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", level, e))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(false).compact())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    }

    Ok(())
}
