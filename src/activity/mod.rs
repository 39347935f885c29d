//! Recent-activity log
//!
//! Per-account ring of the most recent activity records. Written only
//! after a unit commits; best-effort, never part of the unit.

pub mod notify;

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::ActivityConfig;
use crate::core_types::{AccountId, Assets};

pub use notify::{LedgerEvent, NotificationHub, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Send,
    Receive,
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Counterparty address, or warehouse name for deposits/withdrawals
    pub interactant: String,
    pub assets: Assets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn push(&self, account: AccountId, record: ActivityRecord);

    /// Newest first, expired entries excluded
    async fn recent(&self, account: AccountId) -> Vec<ActivityRecord>;
}

/// In-process sink: capped ring per account, per-entry expiry
pub struct MemoryActivitySink {
    entries: DashMap<AccountId, VecDeque<ActivityRecord>>,
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryActivitySink {
    pub fn new(config: &ActivityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: config.capacity,
            ttl: Duration::seconds(config.ttl_secs as i64),
            clock,
        }
    }

    fn is_live(&self, record: &ActivityRecord, now: DateTime<Utc>) -> bool {
        now - record.timestamp < self.ttl
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn push(&self, account: AccountId, record: ActivityRecord) {
        let now = self.clock.now();
        let mut ring = self.entries.entry(account).or_default();
        ring.retain(|r| self.is_live(r, now));
        ring.push_front(record);
        ring.truncate(self.capacity);
    }

    async fn recent(&self, account: AccountId) -> Vec<ActivityRecord> {
        let now = self.clock.now();
        self.entries
            .get(&account)
            .map(|ring| {
                ring.iter()
                    .filter(|r| self.is_live(r, now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AssetSymbol;
    use crate::clock::ManualClock;

    fn record(clock: &ManualClock, n: i64) -> ActivityRecord {
        ActivityRecord {
            kind: ActivityKind::Receive,
            interactant: "bob".to_string(),
            assets: [(AssetSymbol::new("gold").unwrap(), n)].into_iter().collect(),
            memo: None,
            timestamp: clock.now(),
        }
    }

    #[tokio::test]
    async fn test_capped_newest_first() {
        let clock = ManualClock::epoch();
        let sink = MemoryActivitySink::new(&ActivityConfig::default(), Arc::new(clock.clone()));

        for n in 1..=12 {
            sink.push(1, record(&clock, n)).await;
        }

        let recent = sink.recent(1).await;
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].assets.values().next(), Some(&12));
        assert_eq!(recent[9].assets.values().next(), Some(&3));
        assert!(sink.recent(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let clock = ManualClock::epoch();
        let sink = MemoryActivitySink::new(&ActivityConfig::default(), Arc::new(clock.clone()));

        sink.push(1, record(&clock, 1)).await;
        clock.advance(Duration::days(3));
        sink.push(1, record(&clock, 2)).await;
        clock.advance(Duration::days(2) + Duration::seconds(1));

        let recent = sink.recent(1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].assets.values().next(), Some(&2));
    }

    #[test]
    fn test_record_json_shape() {
        let clock = ManualClock::epoch();
        let mut r = record(&clock, 4);
        r.kind = ActivityKind::Withdrawal;
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["type"], "withdrawal");
        assert_eq!(json["interactant"], "bob");
        assert_eq!(json["assets"]["gold"], 4);
        assert!(json.get("memo").is_none());
    }
}
