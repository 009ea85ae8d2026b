//! Connection state control
//!
//! The scheduler only polls while the state is `Connected`. Transitions come
//! from whoever owns a [`ConnectionControl`]; the scheduler watches them.

use crate::models::{ConnectionState, DeviceTarget};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable handle for changing and observing the connection state
#[derive(Debug, Clone)]
pub struct ConnectionControl {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl Default for ConnectionControl {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

impl ConnectionControl {
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `state`. Returns true when this was an actual transition.
    pub fn set(&self, state: ConnectionState) -> bool {
        let mut previous = state;
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            previous = *current;
            *current = state;
            true
        });

        if changed {
            info!(from = ?previous, to = ?state, "Connection state changed");
        }
        changed
    }

    pub fn connect(&self) -> bool {
        self.set(ConnectionState::Connected)
    }

    pub fn disconnect(&self) -> bool {
        self.set(ConnectionState::Disconnected)
    }

    /// Connect when the target has an address, otherwise stay disconnected
    pub fn connect_to(&self, target: &DeviceTarget) -> ConnectionState {
        if target.address.trim().is_empty() {
            self.disconnect();
        } else {
            self.connect();
        }
        self.state()
    }
}
