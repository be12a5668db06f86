//! Signal-triggered shutdown plumbing.
//!
//! SIGINT and SIGTERM are observed by a dedicated task that flips a watch
//! channel; nothing else happens in signal context. Every blocking point in
//! the server (`accept`, connection reads, the accept-retry sleep) selects
//! against [`Shutdown::recv`], so a signal arriving mid-connection aborts the
//! read and funnels into the same teardown path as a fatal error.

use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// Create a connected trigger/observer pair, initially not triggered.
pub fn channel() -> (Trigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx }, Shutdown { rx })
}

/// Sending side of the shutdown flag.
#[derive(Debug)]
pub struct Trigger {
    tx: watch::Sender<bool>,
}

impl Trigger {
    /// Request shutdown. Further calls are no-ops.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observing side of the shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Wait until shutdown has been requested.
    ///
    /// Resolves immediately if it already has, so it is safe to await
    /// repeatedly and from inside `select!`.
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }

    /// Whether shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Spawn the task that translates SIGINT/SIGTERM into the shutdown flag.
///
/// Fails only if the signal handlers cannot be registered.
pub fn install(trigger: Trigger) -> io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        info!("Caught signal, exiting");
        trigger.trigger();
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_resolves_after_trigger() {
        let (trigger, mut shutdown) = channel();
        assert!(!shutdown.is_triggered());

        trigger.trigger();
        shutdown.recv().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_recv_resolves_when_already_triggered() {
        let (trigger, shutdown) = channel();
        trigger.trigger();

        // A clone taken after the fact still observes the flag.
        let mut observer = shutdown.clone();
        observer.recv().await;
        assert!(observer.is_triggered());
    }

    #[tokio::test]
    async fn test_trigger_is_idempotent() {
        let (trigger, mut shutdown) = channel();
        trigger.trigger();
        trigger.trigger();
        shutdown.recv().await;
        shutdown.recv().await;
        assert!(shutdown.is_triggered());
    }
}
