use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::endpoint::ConnectionEndpoint;
use super::link::{ChatRequest, ChatResponse, Link, LinkEvent};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Phase plus the endpoint it refers to; changed only through `send_if_modified`
/// / `send_modify`, which gives every transition an atomic check-and-set.
#[derive(Clone, Default)]
pub struct TransportState {
    pub phase: ConnectionPhase,
    pub endpoint: Option<Arc<ConnectionEndpoint>>,
}

/// Single mediator for all outbound chat traffic
///
/// Holds at most one endpoint. Connect/disconnect transitions are serialized
/// through the phase; sends are only accepted while Connected.
pub struct SessionTransport {
    state: watch::Sender<TransportState>,
}

impl Default for SessionTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTransport {
    pub fn new() -> Self {
        let (state, _) = watch::channel(TransportState::default());
        Self { state }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.state.borrow().phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase() == ConnectionPhase::Connected
    }

    pub fn active_endpoint(&self) -> Option<Arc<ConnectionEndpoint>> {
        self.state.borrow().endpoint.clone()
    }

    /// Observe phase transitions
    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Connect through `endpoint`
    ///
    /// Rejected without touching the current connection while Connecting or
    /// Connected. A connect issued during Disconnecting waits for it to finish.
    pub async fn connect(&self, endpoint: Arc<ConnectionEndpoint>) -> Result<(), TransportError> {
        loop {
            let mut rejection = None;
            let mut draining = false;
            let accepted = self.state.send_if_modified(|s| match s.phase {
                ConnectionPhase::Connecting => {
                    rejection = Some(TransportError::AlreadyConnecting);
                    false
                }
                ConnectionPhase::Connected => {
                    rejection = Some(TransportError::AlreadyConnected);
                    false
                }
                ConnectionPhase::Disconnecting => {
                    draining = true;
                    false
                }
                ConnectionPhase::Disconnected => {
                    s.phase = ConnectionPhase::Connecting;
                    true
                }
            });

            if let Some(e) = rejection {
                warn!("Connect to {} rejected: {}", endpoint.address(), e);
                return Err(e);
            }
            if accepted {
                break;
            }
            if draining {
                self.wait_while(ConnectionPhase::Disconnecting).await;
            }
        }

        let mut guard = PhaseReset::new(&self.state);
        info!("Transport connecting to {}", endpoint.address());

        match endpoint.connect().await {
            Ok(()) => {
                guard.disarm();
                let address = endpoint.address().to_string();
                self.state.send_modify(|s| {
                    s.phase = ConnectionPhase::Connected;
                    s.endpoint = Some(endpoint);
                });
                info!("Transport connected to {}", address);
                Ok(())
            }
            Err(e) => {
                // Guard restores Disconnected
                drop(guard);
                warn!("Transport connect failed: {}", e);
                Err(e)
            }
        }
    }

    /// Disconnect the active endpoint; no-op when Disconnected
    ///
    /// A disconnect issued while a connect is in flight waits for that
    /// attempt to resolve first.
    pub async fn disconnect(&self) {
        loop {
            let mut endpoint = None;
            let mut pending = None;
            let accepted = self.state.send_if_modified(|s| match s.phase {
                ConnectionPhase::Disconnected => false,
                ConnectionPhase::Connecting | ConnectionPhase::Disconnecting => {
                    pending = Some(s.phase);
                    false
                }
                ConnectionPhase::Connected => {
                    s.phase = ConnectionPhase::Disconnecting;
                    endpoint = s.endpoint.clone();
                    true
                }
            });

            if accepted {
                let _guard = PhaseReset::new(&self.state);
                if let Some(endpoint) = endpoint {
                    info!("Transport disconnecting from {}", endpoint.address());
                    endpoint.disconnect().await;
                }
                info!("Transport disconnected");
                return;
            }

            match pending {
                Some(phase) => self.wait_while(phase).await,
                None => {
                    debug!("Disconnect ignored: already disconnected");
                    return;
                }
            }
        }
    }

    /// Send one message and wait for its reply
    ///
    /// Fails with `NotConnected` before any network activity when the phase
    /// is not Connected. A failed request never changes the phase, but an
    /// endpoint closed by another transport fails with `ConnectionLost` and
    /// leaves this one Disconnected.
    pub async fn send(&self, request: ChatRequest) -> Result<ChatResponse, TransportError> {
        let link = self.connected_link().await?;

        debug!("Sending request {}", request.request_id);
        match link.request(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                let e = TransportError::from(e);
                warn!("Request {} failed: {}", request.request_id, e);
                Err(e)
            }
        }
    }

    /// Send one message and receive the reply incrementally
    ///
    /// `on_partial` sees every partial in order; the returned result is the
    /// single terminal event, so no partial can follow it. A connection that
    /// drops mid-stream ends with `ConnectionLost`.
    pub async fn send_streaming<F>(
        &self,
        request: ChatRequest,
        mut on_partial: F,
    ) -> Result<ChatResponse, TransportError>
    where
        F: FnMut(&str) + Send,
    {
        let link = self.connected_link().await?;

        debug!("Sending streaming request {}", request.request_id);
        let mut events = link.request_stream(&request).await?;

        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Partial(text) => on_partial(&text),
                LinkEvent::Completed(response) => return Ok(response),
                LinkEvent::Failed(reason) => {
                    warn!("Streaming request {} failed: {}", request.request_id, reason);
                    return Err(TransportError::RequestFailed(reason));
                }
            }
        }

        warn!("Connection lost during request {}", request.request_id);
        Err(TransportError::ConnectionLost)
    }

    async fn connected_link(&self) -> Result<Arc<dyn Link>, TransportError> {
        let endpoint = {
            let state = self.state.borrow();
            if state.phase != ConnectionPhase::Connected {
                return Err(TransportError::NotConnected);
            }
            state.endpoint.clone()
        };

        let Some(endpoint) = endpoint else {
            return Err(TransportError::NotConnected);
        };
        if let Some(link) = endpoint.link().await {
            return Ok(link);
        }

        // Another holder of the endpoint closed it underneath this transport
        let dropped = self.state.send_if_modified(|s| {
            let same = s
                .endpoint
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &endpoint));
            if s.phase == ConnectionPhase::Connected && same {
                s.phase = ConnectionPhase::Disconnected;
                s.endpoint = None;
                true
            } else {
                false
            }
        });
        if !dropped {
            // Left Connected in the meantime
            return Err(TransportError::NotConnected);
        }

        warn!("Endpoint {} closed; transport disconnected", endpoint.address());
        Err(TransportError::ConnectionLost)
    }

    async fn wait_while(&self, phase: ConnectionPhase) {
        let mut rx = self.state.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|s| s.phase != phase).await;
    }
}

/// Restores Disconnected if a transition does not complete, including when
/// the transition future is dropped mid-flight
struct PhaseReset<'a> {
    state: &'a watch::Sender<TransportState>,
    armed: bool,
}

impl<'a> PhaseReset<'a> {
    fn new(state: &'a watch::Sender<TransportState>) -> Self {
        Self { state, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_modify(|s| {
                s.phase = ConnectionPhase::Disconnected;
                s.endpoint = None;
            });
        }
    }
}
