//! # Logging
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter. The
//! filter comes from `RUST_LOG` when it is set, otherwise from the given
//! default (the daemon passes its configured `log_filter`).
//!
//! ```bash
//! # Power lock and pre-boot detail
//! RUST_LOG=debug node-agent --config config.json
//!
//! # Only this crate, at trace level
//! RUST_LOG=node_agent=trace node-agent --config config.json
//! ```
//!
//! Log lines carry the server id as a structured field, so a single server's
//! history can be pulled out with a plain `grep server=<uuid>`.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, defaulting to `info`.
pub fn setup_tracing() {
    setup_tracing_with_default("info");
}

pub fn setup_tracing_with_default(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
