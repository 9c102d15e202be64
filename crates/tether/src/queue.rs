//! The outbound buffer used while no channel is open.

use std::collections::VecDeque;

use tether_transport::Frame;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::QueueConfig;

struct Queued {
    frame: Frame,
    queued_at: Instant,
}

/// Encoded frames waiting for the next open channel, in send order.
pub(crate) struct OutboundQueue {
    entries: VecDeque<Queued>,
    config: QueueConfig,
}

impl OutboundQueue {
    pub(crate) fn new(config: QueueConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            config,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a frame, dropping the oldest if the queue is full.
    pub(crate) fn push(&mut self, frame: Frame) {
        if let Some(max_len) = self.config.max_len {
            while self.entries.len() >= max_len {
                if let Some(dropped) = self.entries.pop_front() {
                    warn!(
                        max_len,
                        bytes = dropped.frame.len(),
                        "outbound queue full, dropping oldest payload"
                    );
                }
            }
        }
        self.entries.push_back(Queued {
            frame,
            queued_at: Instant::now(),
        });
    }

    /// Puts back a frame whose write failed, ahead of everything else.
    ///
    /// Not subject to `max_len`: the next `push` trims instead.
    pub(crate) fn requeue(&mut self, frame: Frame) {
        self.entries.push_front(Queued {
            frame,
            queued_at: Instant::now(),
        });
    }

    /// Takes the oldest frame that has not outlived the ttl.
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        while let Some(entry) = self.entries.pop_front() {
            match self.config.ttl {
                Some(ttl) if entry.queued_at.elapsed() > ttl => {
                    debug!(
                        age_ms = entry.queued_at.elapsed().as_millis() as u64,
                        "dropping expired payload"
                    );
                }
                _ => return Some(entry.frame),
            }
        }
        None
    }

    /// Empties the queue, returning how many frames were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn drain(queue: &mut OutboundQueue) -> Vec<Frame> {
        std::iter::from_fn(|| queue.pop()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = OutboundQueue::new(QueueConfig::default());
        for n in 0..5 {
            queue.push(Frame::from(n.to_string()));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!(
            drain(&mut queue),
            ["0", "1", "2", "3", "4"].map(Frame::from)
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = OutboundQueue::new(QueueConfig::bounded(2));
        queue.push(Frame::from("a"));
        queue.push(Frame::from("b"));
        queue.push(Frame::from("c"));
        assert_eq!(drain(&mut queue), ["b", "c"].map(Frame::from));
    }

    #[test]
    fn test_requeue_goes_first() {
        let mut queue = OutboundQueue::new(QueueConfig::default());
        queue.push(Frame::from("b"));
        queue.requeue(Frame::from("a"));
        assert_eq!(drain(&mut queue), ["a", "b"].map(Frame::from));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_frames_are_skipped() {
        let mut queue = OutboundQueue::new(QueueConfig::default().with_ttl(Duration::from_secs(2)));
        queue.push(Frame::from("old"));
        tokio::time::advance(Duration::from_secs(3)).await;
        queue.push(Frame::from("fresh"));

        assert_eq!(drain(&mut queue), [Frame::from("fresh")]);
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = OutboundQueue::new(QueueConfig::default());
        queue.push(Frame::from("a"));
        queue.push(Frame::from("b"));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
