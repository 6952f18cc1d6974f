//! Network reachability as seen by the engine.
//!
//! The host platform owns the real signal; the engine only needs a
//! point-in-time answer and a stream of changes to detect reconnects.

use tokio::sync::watch;

/// Reports whether the device can currently reach the remote store.
pub trait ConnectivityMonitor: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Receiver of connectivity changes. A `false -> true` edge is a reconnect.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// A monitor driven by explicit calls, e.g. from a platform callback.
#[derive(Debug)]
pub struct ManualConnectivity {
    tx: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(connected: bool) -> Self {
        let (tx, _rx) = watch::channel(connected);
        Self { tx }
    }

    /// Report the current state. Subscribers are only woken on a change.
    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                return false;
            }
            *current = connected;
            true
        });
        if changed {
            tracing::info!(connected, "connectivity changed");
        }
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor for ManualConnectivity {
    fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Detects reconnects on a connectivity receiver.
///
/// The state at construction is the baseline, so a reconnect that happens
/// before the first wait is still reported.
#[derive(Debug)]
pub struct ReconnectWatch {
    rx: watch::Receiver<bool>,
    connected: bool,
}

impl ReconnectWatch {
    pub fn new(mut rx: watch::Receiver<bool>) -> Self {
        let connected = *rx.borrow_and_update();
        Self { rx, connected }
    }

    /// Wait for the next `false -> true` transition.
    ///
    /// Returns `false` once the monitor is gone and no reconnect can follow.
    pub async fn next_reconnect(&mut self) -> bool {
        loop {
            if self.rx.changed().await.is_err() {
                return false;
            }
            let connected = *self.rx.borrow_and_update();
            let reconnected = connected && !self.connected;
            self.connected = connected;
            if reconnected {
                return true;
            }
        }
    }
}
