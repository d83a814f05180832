use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use super::worker::Command;

/// Re-runs the start routine after a fixed delay
///
/// No backoff and no retry limit: retries continue until the link connects or
/// is stopped. Timers carry the epoch they were scheduled in so a stop
/// invalidates them.
pub(crate) struct ReconnectScheduler {
    delay: Duration,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl ReconnectScheduler {
    pub(crate) fn new(delay: Duration, commands: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self { delay, commands }
    }

    pub(crate) fn schedule(&self, epoch: u64) {
        debug!("Reconnecting in {:?}", self.delay);
        let delay = self.delay;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::Reconnect { epoch });
            }
        });
    }
}
