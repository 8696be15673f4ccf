//! Entry point: initializes logging and delegates to [`audit_engine::cli::run`].

use tracing::error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("AUDIT_ENGINE_LOG")
                .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("audit_engine=info")),
        )
        .init();

    if let Err(err) = audit_engine::cli::run().await {
        error!(error = %err, "audit-engine run failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
