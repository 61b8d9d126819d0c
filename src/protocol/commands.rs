//! Inbound control commands
//!
//! Commands arrive as plain text on the command topic. Surrounding whitespace
//! is ignored; matching is exact and case-sensitive.

use crate::transport::InboundMessage;

/// A parsed control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Orderly restart after the grace delay
    Restart,
    /// Publish status immediately
    Status,
    /// Anything else; logged and discarded
    Unrecognized { name: String },
}

impl Command {
    /// Parse a command payload
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        match text.trim() {
            "restart" => Command::Restart,
            "status" => Command::Status,
            other => Command::Unrecognized {
                name: other.to_string(),
            },
        }
    }

    /// Parse a message if it arrived on the command topic
    pub fn from_message(message: &InboundMessage, command_topic: &str) -> Option<Self> {
        (message.topic == command_topic).then(|| Self::parse(&message.payload))
    }
}
