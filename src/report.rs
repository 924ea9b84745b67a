//! Failure reporting.
//!
//! Components receive a [`FailureSink`] when they are constructed and send every
//! failure message through it. The default sink writes to the `log` facade; a
//! [`ChannelSink`] additionally hands the message to whatever surface wraps the
//! core (a terminal UI, a progress window).

use log::error;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Receives human-readable failure messages.
pub trait FailureSink: Send + Sync {
    /// Report a single failure.
    fn report(&self, message: &str);
}

/// Writes failures to the `log` facade at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl FailureSink for LogSink {
    fn report(&self, message: &str) {
        error!("{}", message);
    }
}

/// Logs failures and forwards them over a channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl FailureSink for ChannelSink {
    fn report(&self, message: &str) {
        error!("{}", message);
        // The receiving surface may already be gone during shutdown.
        let _ = self.tx.send(message.to_string());
    }
}

/// The sink used when a component is built without one.
pub fn default_sink() -> Arc<dyn FailureSink> {
    Arc::new(LogSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn channel_sink_forwards_messages() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);
        sink.report("first");
        sink.report("second");
        assert_eq!(rx.try_recv().unwrap(), "first");
        assert_eq!(rx.try_recv().unwrap(), "second");
    }

    #[test]
    fn channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelSink::new(tx).report("nobody listening");
    }
}
