//! Chat server connectivity
//!
//! - `ConnectionEndpoint`: one server address and its liveness
//! - `SessionTransport`: the single owner of the connection phase
//! - `Connector`/`Link`: the raw network primitive (NATS in production)

mod endpoint;
mod link;
mod nats;
mod session;

pub use endpoint::{ConnectionEndpoint, EndpointStatus};
pub use link::{ChatRequest, ChatResponse, Connector, Link, LinkError, LinkEvent};
pub use nats::{ChatSubjects, NatsConnector, NatsLink};
pub use session::{ConnectionPhase, SessionTransport, TransportState};
