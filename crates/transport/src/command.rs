//! Southbound command handling

use contracts::CommandHandler;
use tracing::debug;

/// Logs every inbound command and does nothing else
#[derive(Debug, Clone, Default)]
pub struct LoggingCommandHandler;

impl LoggingCommandHandler {
    pub fn new() -> Self {
        Self
    }
}

impl CommandHandler for LoggingCommandHandler {
    fn receive(&self, command: &str) {
        debug!(command = %command, "command received: {command}");
    }
}
