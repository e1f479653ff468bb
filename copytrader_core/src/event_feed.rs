// Event-Feed Client - platform-agnostic subscription bookkeeping and message
// shapes for the launchpad data feed. The concrete `tokio-tungstenite`
// connection loop lives in the binary crate (`event_feed_ws.rs`); this module
// owns everything that doesn't touch a socket directly: what to subscribe to,
// how to decode incoming frames, and where to dispatch them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The four subscription families the data feed supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FeedTopic {
    NewToken,
    TokenTrade,
    AccountTrade,
    Migration,
}

impl FeedTopic {
    fn method_suffix(&self) -> &'static str {
        match self {
            FeedTopic::NewToken => "NewToken",
            FeedTopic::TokenTrade => "TokenTrade",
            FeedTopic::AccountTrade => "AccountTrade",
            FeedTopic::Migration => "Migration",
        }
    }

    /// True if this topic requires the AMM-authenticated connection variant.
    pub fn requires_auth(&self) -> bool {
        matches!(self, FeedTopic::AccountTrade)
    }
}

/// A raw trade/migration/create notification as delivered by the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedTradeEvent {
    pub tx_type: String, // "buy" | "sell" | "create" | "migrate"
    pub mint: String,
    pub trader_public_key: String,
    #[serde(default)]
    pub sol_amount: Option<f64>,
    #[serde(default)]
    pub token_amount: Option<f64>,
    pub signature: String,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub market_cap_sol: Option<f64>,
}

/// Decoded shape for every frame the feed can send, matching the teacher's
/// `PumpPortalMessage` untagged-enum approach but generalized to all four
/// event families plus server confirmation/acknowledgement frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedEvent {
    Trade(FeedTradeEvent),
    Confirmation { message: String },
    Unknown(serde_json::Value),
}

/// One registered subscription: the topic plus an optional key set
/// (addresses) for the filtered topics (token-trade, account-trade).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub topic: FeedTopic,
    pub keys: Vec<String>,
}

/// Callback invoked for a dispatched event. Wrapped in `Arc` so it can be
/// cloned into spawned tasks without the read loop blocking on it.
pub type FeedCallback = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Builds subscribe/unsubscribe JSON-RPC-ish payloads and tracks the set of
/// active subscriptions for reconnect replay. Holds no transport state.
#[derive(Default)]
pub struct EventFeedClient {
    subscriptions: HashMap<SubscriptionKey, FeedCallback>,
    global_callback: Option<FeedCallback>,
}

impl EventFeedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription and its callback; returns the wire payload to
    /// send over the socket. Idempotent: re-subscribing to an identical key
    /// replaces the callback without duplicating the record.
    pub fn subscribe(
        &mut self,
        topic: FeedTopic,
        keys: Vec<String>,
        callback: FeedCallback,
    ) -> serde_json::Value {
        let sub_key = SubscriptionKey {
            topic,
            keys: keys.clone(),
        };
        self.subscriptions.insert(sub_key, callback);
        self.build_subscribe_payload(topic, &keys)
    }

    pub fn unsubscribe(&mut self, topic: FeedTopic, keys: Vec<String>) -> serde_json::Value {
        let sub_key = SubscriptionKey {
            topic,
            keys: keys.clone(),
        };
        self.subscriptions.remove(&sub_key);
        self.build_unsubscribe_payload(topic, &keys)
    }

    pub fn set_global_callback(&mut self, callback: FeedCallback) {
        self.global_callback = Some(callback);
    }

    /// Every currently-recorded subscription, for replay after a reconnect.
    pub fn active_subscriptions(&self) -> Vec<(FeedTopic, Vec<String>)> {
        self.subscriptions
            .keys()
            .map(|k| (k.topic, k.keys.clone()))
            .collect()
    }

    pub fn requires_auth(&self) -> bool {
        self.subscriptions.keys().any(|k| k.topic.requires_auth())
    }

    /// Rebuilds the subscribe payload for every currently-registered
    /// subscription, for the connection loop to resend after a reconnect.
    /// Does not touch the registration itself.
    pub fn replay_payloads(&self) -> Vec<serde_json::Value> {
        self.subscriptions
            .keys()
            .map(|k| self.build_subscribe_payload(k.topic, &k.keys))
            .collect()
    }

    fn build_subscribe_payload(&self, topic: FeedTopic, keys: &[String]) -> serde_json::Value {
        let method = format!("subscribe{}", topic.method_suffix());
        if keys.is_empty() {
            serde_json::json!({ "method": method })
        } else {
            serde_json::json!({ "method": method, "keys": keys })
        }
    }

    fn build_unsubscribe_payload(&self, topic: FeedTopic, keys: &[String]) -> serde_json::Value {
        let method = format!("unsubscribe{}", topic.method_suffix());
        if keys.is_empty() {
            serde_json::json!({ "method": method })
        } else {
            serde_json::json!({ "method": method, "keys": keys })
        }
    }

    /// Dispatches a decoded event to every matching registered callback, or
    /// the global fallback if nothing matches. The caller (the read loop) is
    /// responsible for spawning this off the hot path if the callback is async.
    pub fn dispatch(&self, mint: Option<&str>, event: FeedEvent) {
        let mut matched = false;
        for (sub_key, callback) in &self.subscriptions {
            let matches = match mint {
                Some(m) => sub_key.keys.is_empty() || sub_key.keys.iter().any(|k| k == m),
                None => sub_key.keys.is_empty(),
            };
            if matches {
                matched = true;
                callback(event.clone());
            }
        }
        if !matched {
            if let Some(cb) = &self.global_callback {
                cb(event);
            }
        }
    }
}

/// Exponential reconnect backoff with a cap, reset on successful connect.
/// Initial 3s, doubling to a 60s ceiling, matching the data-feed's
/// reconnection contract.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial_s: u64,
    max_s: u64,
    current_s: u64,
    attempts: u32,
    max_attempts: u32,
}

impl ReconnectBackoff {
    pub fn new(initial_s: u64, max_s: u64, max_attempts: u32) -> Self {
        Self {
            initial_s,
            max_s,
            current_s: initial_s,
            attempts: 0,
            max_attempts,
        }
    }

    /// Returns the delay to wait before the next attempt, or `None` if the
    /// retry budget is exhausted and the failure should surface as fatal.
    pub fn next_delay(&mut self) -> Option<std::time::Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }
        let delay = self.current_s;
        self.current_s = (self.current_s * 2).min(self.max_s);
        Some(std::time::Duration::from_secs(delay))
    }

    pub fn reset(&mut self) {
        self.current_s = self.initial_s;
        self.attempts = 0;
    }
}

/// Tracks a candidate set of subscribed addresses to verify idempotent
/// replay after a reconnect (no duplicate subscriptions, matching §8's
/// reconnect-replay property).
pub fn dedupe_replay(topics: &[(FeedTopic, Vec<String>)]) -> HashSet<(FeedTopic, Vec<String>)> {
    topics.iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscribe_builds_expected_payload() {
        let mut client = EventFeedClient::new();
        let payload = client.subscribe(
            FeedTopic::TokenTrade,
            vec!["MintX".to_string()],
            Arc::new(|_| {}),
        );
        assert_eq!(payload["method"], "subscribeTokenTrade");
        assert_eq!(payload["keys"][0], "MintX");
    }

    #[test]
    fn unsubscribe_removes_from_active_set() {
        let mut client = EventFeedClient::new();
        client.subscribe(FeedTopic::NewToken, vec![], Arc::new(|_| {}));
        assert_eq!(client.active_subscriptions().len(), 1);
        client.unsubscribe(FeedTopic::NewToken, vec![]);
        assert!(client.active_subscriptions().is_empty());
    }

    #[test]
    fn dispatch_invokes_matching_callback() {
        let mut client = EventFeedClient::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        client.subscribe(
            FeedTopic::TokenTrade,
            vec!["MintX".to_string()],
            Arc::new(move |_| {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        client.dispatch(
            Some("MintX"),
            FeedEvent::Confirmation {
                message: "ok".to_string(),
            },
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reconnect_backoff_doubles_and_caps() {
        let mut backoff = ReconnectBackoff::new(3, 60, 5);
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 3);
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 6);
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 12);
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 24);
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 48);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn reconnect_backoff_resets_on_success() {
        let mut backoff = ReconnectBackoff::new(3, 60, 5);
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay().unwrap().as_secs(), 3);
    }

    #[test]
    fn replay_dedupes_identical_topics() {
        let topics = vec![
            (FeedTopic::TokenTrade, vec!["MintX".to_string()]),
            (FeedTopic::TokenTrade, vec!["MintX".to_string()]),
        ];
        assert_eq!(dedupe_replay(&topics).len(), 1);
    }
}
