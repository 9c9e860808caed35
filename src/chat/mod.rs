//! Chat log data containers
//!
//! Plain data held by the UI layer; the core only converts messages into
//! transport requests.

mod message;
mod session;

pub use message::{ChatMessage, MessageKind};
pub use session::ChatSession;
