use std::fmt;

use log::{debug, info, warn};
use tokio::sync::watch;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// State machine for one network link.
///
/// Each transition is logged exactly once. Losing an established link is a
/// warning, failing yet another attempt while already down only shows at
/// debug level so an unreachable endpoint does not flood the log.
#[derive(Debug)]
pub struct ConnectionTracker {
    name: &'static str,
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionTracker {
    pub fn new(name: &'static str) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        ConnectionTracker { name, tx }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn connecting(&self, target: &str) {
        if self.transition(ConnectionState::Connecting) {
            debug!("[{}] Connecting to {}", self.name, target);
        }
    }

    pub fn connected(&self, target: &str) {
        if self.transition(ConnectionState::Connected) {
            info!("[{}] Connected to {}", self.name, target);
        }
    }

    /// Error or close on the link, `reason` is only used for logging.
    pub fn disconnected(&self, reason: impl fmt::Display) {
        let previous = self.state();

        if self.transition(ConnectionState::Disconnected) {
            match previous {
                ConnectionState::Connected => {
                    warn!("[{}] Connection lost: {}. Will reconnect...", self.name, reason)
                }
                _ => debug!("[{}] Connection attempt failed: {}", self.name, reason),
            }
        }
    }

    fn transition(&self, next: ConnectionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }
}
