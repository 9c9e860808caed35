use crate::chat::ChatSession;
use crate::error::TransportError;
use crate::speech::SpeechCaptureEngine;
use crate::transport::{ConnectionEndpoint, Connector, SessionTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one chat transport
    pub transport: Arc<SessionTransport>,

    /// The one capture engine
    pub engine: Arc<SpeechCaptureEngine>,

    /// Raw connect primitive for new endpoints
    pub connector: Arc<dyn Connector>,

    /// Endpoints created so far (address → endpoint), reused across reconnects
    pub endpoints: Arc<RwLock<HashMap<String, Arc<ConnectionEndpoint>>>>,

    /// Address most recently passed to `endpoint`
    last_address: Arc<RwLock<Option<String>>>,

    /// Conversation shown by the UI
    pub chat: Arc<RwLock<ChatSession>>,
}

impl AppState {
    pub fn new(
        transport: Arc<SessionTransport>,
        engine: Arc<SpeechCaptureEngine>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            transport,
            engine,
            connector,
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            last_address: Arc::new(RwLock::new(None)),
            chat: Arc::new(RwLock::new(ChatSession::new("Chat"))),
        }
    }

    /// Endpoint for `address`, created on first use
    ///
    /// Also remembers `address` as the last one used.
    pub async fn endpoint(&self, address: &str) -> Result<Arc<ConnectionEndpoint>, TransportError> {
        let endpoint = self.lookup_or_create(address).await?;
        *self.last_address.write().await = Some(address.to_string());
        Ok(endpoint)
    }

    pub async fn last_address(&self) -> Option<String> {
        self.last_address.read().await.clone()
    }

    async fn lookup_or_create(
        &self,
        address: &str,
    ) -> Result<Arc<ConnectionEndpoint>, TransportError> {
        if let Some(endpoint) = self.endpoints.read().await.get(address) {
            return Ok(Arc::clone(endpoint));
        }

        let mut endpoints = self.endpoints.write().await;
        if let Some(endpoint) = endpoints.get(address) {
            return Ok(Arc::clone(endpoint));
        }

        let endpoint = Arc::new(ConnectionEndpoint::new(address, Arc::clone(&self.connector))?);
        endpoints.insert(address.to_string(), Arc::clone(&endpoint));
        Ok(endpoint)
    }
}
