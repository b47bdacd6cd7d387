pub mod agent_engine;
pub mod artifacts;
pub mod config;
pub mod errors;
pub mod llm;
pub mod localize;
pub mod oracle;
pub mod rfb;
pub mod session;
pub mod workflows;

pub use errors::{PilotError, PilotResult};
pub use workflows::{ComputerUse, Oracles};

/// Install the fmt subscriber (filter from `RUST_LOG`, default `info`) and
/// load `.env` if present. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}
