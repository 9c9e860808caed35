use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::link::{Connector, Link};
use crate::error::TransportError;

/// Snapshot of an endpoint's identity and liveness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub id: String,
    pub address: String,
    pub is_live: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
}

struct EndpointState {
    is_live: bool,
    last_connected_at: Option<DateTime<Utc>>,
    link: Option<Arc<dyn Link>>,
}

/// One addressable chat server and its last-known liveness
///
/// Construction never connects. `is_live` only changes through
/// `connect`/`disconnect`. An endpoint may be reused by many transports;
/// `disconnect` from any of them closes it for all.
pub struct ConnectionEndpoint {
    id: String,
    address: String,
    connector: Arc<dyn Connector>,
    state: Mutex<EndpointState>,
}

impl ConnectionEndpoint {
    pub fn new(
        address: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TransportError> {
        let address = address.into();
        if address.trim().is_empty() {
            return Err(TransportError::InvalidAddress(address));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            connector,
            state: Mutex::new(EndpointState {
                is_live: false,
                last_connected_at: None,
                link: None,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Perform the transport handshake
    ///
    /// On success the endpoint is live and `last_connected_at` is now. On
    /// failure it stays not-live and reports `ConnectFailed`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.is_live {
            debug!("Endpoint {} already live", self.id);
            return Ok(());
        }

        info!(
            "Connecting endpoint {} to {} via {}",
            self.id,
            self.address,
            self.connector.name()
        );

        match self.connector.open(&self.id, &self.address).await {
            Ok(link) => {
                state.link = Some(link);
                state.is_live = true;
                state.last_connected_at = Some(Utc::now());
                info!("Endpoint {} connected", self.id);
                Ok(())
            }
            Err(e) => {
                state.link = None;
                state.is_live = false;
                warn!("Endpoint {} failed to connect: {:#}", self.id, e);
                Err(TransportError::ConnectFailed(format!("{e:#}")))
            }
        }
    }

    /// Drop the connection; safe to call when already disconnected
    pub async fn disconnect(&self) {
        let link = {
            let mut state = self.state.lock().await;
            state.is_live = false;
            state.link.take()
        };

        if let Some(link) = link {
            info!("Disconnecting endpoint {}", self.id);
            link.close().await;
        }
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.is_live
    }

    pub async fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_connected_at
    }

    pub async fn status(&self) -> EndpointStatus {
        let state = self.state.lock().await;
        EndpointStatus {
            id: self.id.clone(),
            address: self.address.clone(),
            is_live: state.is_live,
            last_connected_at: state.last_connected_at,
        }
    }

    pub(crate) async fn link(&self) -> Option<Arc<dyn Link>> {
        self.state.lock().await.link.clone()
    }
}
