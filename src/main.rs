//! CLI entry point for the scoreacquire pipeline.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoreacquire::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "scoreacquire=info"
    } else {
        "scoreacquire=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let code = cli::run().await?;
    std::process::exit(code);
}
