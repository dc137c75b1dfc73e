//! Subcommand implementations.

pub(crate) mod config;
pub(crate) mod history;
pub(crate) mod watch;

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves.
pub(crate) async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
