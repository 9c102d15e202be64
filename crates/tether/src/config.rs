//! Socket configuration.

use std::time::Duration;

use tether_reconnect::ReconnectPolicy;
use tracing::warn;

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Limits on payloads buffered while no channel is open.
///
/// The default buffers without limit: payloads are small control messages
/// and dropping them silently is worse than holding them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueConfig {
    /// Most payloads held at once. When full, the oldest is dropped.
    pub max_len: Option<usize>,
    /// Payloads older than this at flush time are dropped instead of sent.
    pub ttl: Option<Duration>,
}

impl QueueConfig {
    /// A queue holding at most `max_len` payloads.
    pub fn bounded(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ttl: None,
        }
    }

    /// Drops payloads older than `ttl` at flush time.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Fixes values that would make the queue useless.
    ///
    /// - `max_len` of 0 becomes 1.
    /// - a zero `ttl` is removed.
    pub fn validated(mut self) -> Self {
        if self.max_len == Some(0) {
            warn!("queue max_len of 0 would drop every payload, using 1");
            self.max_len = Some(1);
        }
        if self.ttl == Some(Duration::ZERO) {
            warn!("queue ttl of 0 would expire every payload, disabling ttl");
            self.ttl = None;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SocketConfig
// ---------------------------------------------------------------------------

/// Everything a durable socket is configured with, apart from its URL and
/// plugins.
#[derive(Debug, Clone, Default)]
pub struct SocketConfig {
    pub reconnect: ReconnectPolicy,
    pub queue: QueueConfig,
}

impl SocketConfig {
    /// Validates every section.
    pub fn validated(self) -> Self {
        Self {
            reconnect: self.reconnect.validated(),
            queue: self.queue.validated(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_is_unbounded() {
        let config = QueueConfig::default();
        assert_eq!(config.max_len, None);
        assert_eq!(config.ttl, None);
    }

    #[test]
    fn test_validated_fixes_degenerate_queue() {
        let config = QueueConfig::bounded(0).with_ttl(Duration::ZERO).validated();
        assert_eq!(config.max_len, Some(1));
        assert_eq!(config.ttl, None);
    }

    #[test]
    fn test_validated_keeps_sane_values() {
        let config = QueueConfig::bounded(8)
            .with_ttl(Duration::from_secs(5))
            .validated();
        assert_eq!(config, QueueConfig::bounded(8).with_ttl(Duration::from_secs(5)));
    }
}
