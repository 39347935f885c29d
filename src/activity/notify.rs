//! Real-time notification hub
//!
//! Channel name -> live subscribers. Publishing is fire-and-forget: no
//! buffering for absent subscribers, no ordering relative to the
//! activity log.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use super::ActivityRecord;

/// Event pushed to a channel (a wallet address)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEvent {
    pub channel: String,
    pub record: ActivityRecord,
}

pub type EventSender = mpsc::UnboundedSender<LedgerEvent>;

/// Unique subscription identifier
pub type SubscriptionId = u64;

pub struct NotificationHub {
    /// channel -> list of (subscription_id, sender)
    subscribers: DashMap<String, Vec<(SubscriptionId, EventSender)>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Listen on a channel. Several subscribers per channel are allowed.
    pub fn subscribe(&self, channel: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<LedgerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.subscribers
            .entry(channel.to_string())
            .or_default()
            .push((id, tx));

        tracing::debug!(channel, subscription = id, "Subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, channel: &str, id: SubscriptionId) {
        if let Some(mut senders) = self.subscribers.get_mut(channel) {
            senders.retain(|(sub, _)| *sub != id);

            if senders.is_empty() {
                drop(senders); // Release the lock
                self.subscribers.remove(channel);
            }
        }
    }

    /// Deliver to every live subscriber of `channel`; returns how many got it.
    ///
    /// Subscribers whose receiver is gone are dropped.
    pub fn publish(&self, channel: &str, record: ActivityRecord) -> usize {
        let Some(mut senders) = self.subscribers.get_mut(channel) else {
            return 0;
        };

        let event = LedgerEvent {
            channel: channel.to_string(),
            record,
        };
        senders.retain(|(_, tx)| tx.send(event.clone()).is_ok());
        let delivered = senders.len();

        if senders.is_empty() {
            drop(senders);
            self.subscribers.remove_if(channel, |_, v| v.is_empty());
        }

        tracing::debug!(channel, delivered, "Event published");
        delivered
    }

    /// (channels, total subscriptions)
    pub fn stats(&self) -> (usize, usize) {
        let channels = self.subscribers.len();
        let total = self
            .subscribers
            .iter()
            .map(|entry| entry.value().len())
            .sum();
        (channels, total)
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
