//! Connected-peer tracking with edge-triggered change notification.
//!
//! The session may report a connect or disconnect more than once per
//! client session. Only real transitions reach the host.

use std::sync::Mutex;

/// Callback fired with the new state after each transition.
pub type ConnectionNotify = Box<dyn Fn(bool) + Send + Sync>;

/// Lock-guarded "peer connected" flag.
pub struct ConnectionWatcher {
    connected: Mutex<bool>,
    notify: Option<ConnectionNotify>,
}

impl ConnectionWatcher {
    /// Create a watcher in the disconnected state with no listener.
    pub fn new() -> Self {
        Self {
            connected: Mutex::new(false),
            notify: None,
        }
    }

    /// Create a watcher that calls `notify` on every transition.
    pub fn with_notify<F>(notify: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self {
            connected: Mutex::new(false),
            notify: Some(Box::new(notify)),
        }
    }

    /// Peer connected. Returns `true` if this was a transition.
    pub fn on_connect(&self) -> bool {
        self.transition(true)
    }

    /// Peer disconnected. Returns `true` if this was a transition.
    pub fn on_disconnect(&self) -> bool {
        self.transition(false)
    }

    /// Current state.
    pub fn get_connected(&self) -> bool {
        *self.connected.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: bool) -> bool {
        let changed = {
            let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
            if *connected == to {
                false
            } else {
                *connected = to;
                true
            }
        };

        // Notify outside the lock so a listener may read the property.
        if changed {
            tracing::debug!(connected = to, "connection state changed");
            if let Some(notify) = &self.notify {
                notify(to);
            }
        }
        changed
    }
}

impl Default for ConnectionWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWatcher")
            .field("connected", &self.get_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting() -> (ConnectionWatcher, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let watcher = ConnectionWatcher::with_notify(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (watcher, count)
    }

    #[test]
    fn test_starts_disconnected() {
        let watcher = ConnectionWatcher::new();
        assert!(!watcher.get_connected());
    }

    #[test]
    fn test_double_connect_notifies_once() {
        let (watcher, count) = counting();
        assert!(watcher.on_connect());
        assert!(!watcher.on_connect());

        assert!(watcher.get_connected());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnect_then_connect_notifies_twice() {
        let (watcher, count) = counting();
        watcher.on_connect();
        count.store(0, Ordering::SeqCst);

        watcher.on_disconnect();
        watcher.on_connect();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect_when_disconnected_is_noop() {
        let (watcher, count) = counting();
        assert!(!watcher.on_disconnect());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_notify_receives_new_state() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let s = states.clone();
        let watcher = ConnectionWatcher::with_notify(move |connected| {
            s.lock().unwrap().push(connected);
        });

        watcher.on_connect();
        watcher.on_disconnect();
        watcher.on_disconnect();
        watcher.on_connect();

        assert_eq!(*states.lock().unwrap(), vec![true, false, true]);
    }
}
