use crate::domain::ports::{ConnectionObserver, MarketConnectorBox, RemoteServiceHandle};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

struct ConnState {
    handle: Option<RemoteServiceHandle>,
    bind_in_flight: bool,
}

/// Owns the lifecycle of the connection handle to the remote billing service.
///
/// The manager is the sole writer of the handle; the dispatcher only reads
/// its presence. A failed bind is terminal for that attempt; there is no
/// automatic retry, the next request submission triggers a fresh `connect`.
pub struct ConnectionManager {
    connector: MarketConnectorBox,
    state: Mutex<ConnState>,
    weak_self: Weak<ConnectionManager>,
}

impl ConnectionManager {
    pub fn new(connector: MarketConnectorBox) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            connector,
            state: Mutex::new(ConnState {
                handle: None,
                bind_in_flight: false,
            }),
            weak_self: weak_self.clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current handle if one is live. Never blocks.
    pub fn current_handle(&self) -> Option<RemoteServiceHandle> {
        self.state().handle.clone()
    }

    /// Starts an asynchronous bind to the remote service.
    ///
    /// Idempotent: if a handle is already live or a bind attempt is already
    /// in flight, this returns without observable effect. Otherwise exactly
    /// one of `connection_established` or `connect_failed` is eventually
    /// delivered to `observer`.
    pub fn connect(&self, observer: Weak<dyn ConnectionObserver>) {
        {
            let mut state = self.state();
            if state.handle.is_some() || state.bind_in_flight {
                return;
            }
            state.bind_in_flight = true;
        }

        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            match manager.connector.bind().await {
                Ok(handle) => {
                    manager.on_connected(handle);
                    if let Some(observer) = observer.upgrade() {
                        observer.connection_established().await;
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "bind to remote billing service failed");
                    manager.state().bind_in_flight = false;
                    if let Some(observer) = observer.upgrade() {
                        observer.connect_failed().await;
                    }
                }
            }
        });
    }

    /// Installs a live handle. Invoked by the bind task on success, or by the
    /// hosting platform when it delivers the binding itself.
    pub fn on_connected(&self, handle: RemoteServiceHandle) {
        let mut state = self.state();
        state.handle = Some(handle);
        state.bind_in_flight = false;
    }

    /// Clears the handle. Invoked by the hosting platform when the remote
    /// service goes away.
    pub fn on_disconnected(&self) {
        self.state().handle = None;
        tracing::debug!("remote billing service disconnected");
    }
}
