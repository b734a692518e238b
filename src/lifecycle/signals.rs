//! OS signal handling.

/// Name of the signal that ended the wait.
pub type SignalName = &'static str;

/// Resolve on Ctrl-C, or SIGTERM on Unix.
pub async fn wait_for_shutdown() -> std::io::Result<SignalName> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}
