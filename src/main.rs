//! podscan - proof-of-delivery OCR processing and validation.
//!
//! Submits delivery receipt captures to OCR backends, validates the
//! extracted fields, and writes per-file result artifacts.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if podscan::cli::is_verbose() {
        "podscan=debug"
    } else {
        "podscan=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    podscan::cli::run().await
}
