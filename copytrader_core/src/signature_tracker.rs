// Signature-Tracking Client - admission control, request/response
// correlation bookkeeping, and notification classification for watching
// Solana transaction signatures to confirmation. Grounded in the teacher's
// `sol_beast_cli/src/ws.rs` (placeholder-id remapping, pending-request map,
// periodic TTL scan) generalized from bonding-curve account subscriptions to
// signature subscriptions with a bounded admission semaphore.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::error::CoreError;
use crate::models::{SubscriptionRecord, SubscriptionStatus};

/// Classified outcome of a signature notification, per the wire error taxonomy.
#[derive(Debug, Clone)]
pub enum SignatureOutcome {
    Confirmed,
    Timeout,
    Error(CoreError),
}

impl PartialEq for SignatureOutcome {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SignatureOutcome::Confirmed, SignatureOutcome::Confirmed) => true,
            (SignatureOutcome::Timeout, SignatureOutcome::Timeout) => true,
            (SignatureOutcome::Error(a), SignatureOutcome::Error(b)) => {
                a.wire_taxonomy() == b.wire_taxonomy()
            }
            _ => false,
        }
    }
}

/// Decodes a `signatureNotification` result payload (`err: null | {...}`)
/// into the outcome taxonomy: slippage (6002), insufficient_tokens (6023),
/// insufficient_lamports (code 1), insufficient_funds_for_rent (named
/// variant anywhere in the error), or unknown.
pub fn classify_notification(err: &serde_json::Value) -> SignatureOutcome {
    if err.is_null() {
        return SignatureOutcome::Confirmed;
    }
    let text = err.to_string();
    if text.contains("6002") {
        return SignatureOutcome::Error(CoreError::Slippage);
    }
    if text.contains("6023") {
        return SignatureOutcome::Error(CoreError::InsufficientTokens);
    }
    if text.contains("InsufficientFundsForRent") || text.contains("insufficient_funds_for_rent") {
        return SignatureOutcome::Error(CoreError::InsufficientFundsForRent);
    }
    // Custom-code 1 inside an InstructionError tuple, e.g. {"InstructionError":[0,{"Custom":1}]}
    if let Some(custom) = err
        .get("InstructionError")
        .and_then(|v| v.get(1))
        .and_then(|v| v.get("Custom"))
        .and_then(|v| v.as_u64())
    {
        if custom == 1 {
            return SignatureOutcome::Error(CoreError::InsufficientLamports);
        }
    }
    SignatureOutcome::Error(CoreError::Validation(format!("unknown tx error: {}", text)))
}

struct PendingSubscription {
    signature: String,
    commitment: String,
    timeout_s: u64,
}

/// Owns every pending/subscribed signature record and the admission
/// semaphore bounding concurrent `signatureSubscribe` calls to the RPC node.
pub struct SignatureTracker {
    max_subscriptions: usize,
    admission_queue_capacity: usize,
    semaphore: Arc<Semaphore>,
    admission_queue: VecDeque<PendingSubscription>,
    records: HashMap<String, SubscriptionRecord>,
    subid_to_signature: HashMap<u64, String>,
    /// Notifications that arrived before the subscribe-ACK revealed the
    /// subscription id, keyed by subscription id.
    pending_notifications: HashMap<u64, serde_json::Value>,
    total_confirmed: u64,
    total_timeouts: u64,
    total_errors: u64,
}

impl SignatureTracker {
    pub fn new(max_subscriptions: usize, admission_queue_capacity: usize) -> Self {
        Self {
            max_subscriptions,
            admission_queue_capacity,
            semaphore: Arc::new(Semaphore::new(max_subscriptions)),
            admission_queue: VecDeque::new(),
            records: HashMap::new(),
            subid_to_signature: HashMap::new(),
            pending_notifications: HashMap::new(),
            total_confirmed: 0,
            total_timeouts: 0,
            total_errors: 0,
        }
    }

    /// Enqueues a signature for tracking. Returns `true` if admitted into
    /// the queue, `false` if the admission queue is at capacity (the caller
    /// must fail the position fast, per §5's back-pressure policy).
    pub fn subscribe(&mut self, signature: String, commitment: String, timeout_s: u64) -> bool {
        if self.admission_queue.len() >= self.admission_queue_capacity {
            return false;
        }
        self.records.insert(
            signature.clone(),
            SubscriptionRecord::new(signature.clone(), commitment.clone(), timeout_s),
        );
        self.admission_queue.push_back(PendingSubscription {
            signature,
            commitment,
            timeout_s,
        });
        true
    }

    /// Cancels tracking for a signature still pending admission, releasing
    /// any reservation. A signature already `subscribed` must instead be
    /// torn down via `mark_timeout` or `mark_confirmed`.
    pub fn unsubscribe(&mut self, signature: &str) {
        self.admission_queue.retain(|p| p.signature != signature);
        self.records.remove(signature);
    }

    /// Attempts to acquire a permit and pop the next admitted signature,
    /// transitioning it to `subscribed`. Returns `None` if the queue is
    /// empty or no permits are currently available.
    pub fn try_admit(
        &mut self,
    ) -> Option<(String, String, u64, tokio::sync::OwnedSemaphorePermit)> {
        if self.admission_queue.is_empty() {
            return None;
        }
        let permit = self.semaphore.clone().try_acquire_owned().ok()?;
        let pending = self.admission_queue.pop_front()?;
        if let Some(record) = self.records.get_mut(&pending.signature) {
            record.status = SubscriptionStatus::Subscribed;
            record.subscribed_at = Some(Utc::now());
        }
        Some((pending.signature, pending.commitment, pending.timeout_s, permit))
    }

    /// Records the server-assigned subscription id for a signature, and
    /// resolves any buffered notification that arrived before this ACK.
    pub fn on_subscribed(&mut self, signature: &str, subscription_id: u64) -> Option<serde_json::Value> {
        if let Some(record) = self.records.get_mut(signature) {
            record.subscription_id = Some(subscription_id);
        }
        self.subid_to_signature
            .insert(subscription_id, signature.to_string());
        self.pending_notifications.remove(&subscription_id)
    }

    /// Buffers a notification whose subscription id has no known signature
    /// yet (it raced the subscribe-ACK).
    pub fn buffer_notification(&mut self, subscription_id: u64, payload: serde_json::Value) {
        self.pending_notifications.insert(subscription_id, payload);
    }

    /// Resolves a `signatureNotification`, releasing the permit and marking
    /// the record terminal. The caller supplies the permit it obtained from
    /// `try_admit` so it is dropped here exactly once.
    pub fn resolve_notification(
        &mut self,
        subscription_id: u64,
        err: &serde_json::Value,
    ) -> Option<SignatureOutcome> {
        let signature = self.subid_to_signature.remove(&subscription_id)?;
        let outcome = classify_notification(err);
        if let Some(record) = self.records.get_mut(&signature) {
            record.confirmed_at = Some(Utc::now());
            record.status = SubscriptionStatus::Confirmed;
        }
        match &outcome {
            SignatureOutcome::Confirmed => self.total_confirmed += 1,
            SignatureOutcome::Error(_) => self.total_errors += 1,
            SignatureOutcome::Timeout => self.total_timeouts += 1,
        }
        Some(outcome)
    }

    /// Scans subscribed records for ones whose wall-clock timeout has
    /// elapsed. Called on a fixed `timeout_check_interval` so timeouts fire
    /// even when the feed is completely silent.
    pub fn scan_timeouts(&mut self) -> Vec<String> {
        let now = Utc::now();
        let mut timed_out = Vec::new();
        for (signature, record) in self.records.iter_mut() {
            if record.status != SubscriptionStatus::Subscribed {
                continue;
            }
            if let Some(subscribed_at) = record.subscribed_at {
                let elapsed = now.signed_duration_since(subscribed_at);
                if elapsed.num_seconds() as u64 > record.timeout_s {
                    record.status = SubscriptionStatus::Timeout;
                    timed_out.push(signature.clone());
                }
            }
        }
        self.total_timeouts += timed_out.len() as u64;
        timed_out
    }

    pub fn get_status(&self, signature: &str) -> Option<SubscriptionStatus> {
        self.records.get(signature).map(|r| r.status)
    }

    pub fn clear_all(&mut self) {
        self.admission_queue.clear();
        self.records.clear();
        self.subid_to_signature.clear();
        self.pending_notifications.clear();
    }

    pub fn get_statistics(&self) -> SignatureTrackerStats {
        SignatureTrackerStats {
            max_subscriptions: self.max_subscriptions,
            in_flight: self.max_subscriptions - self.semaphore.available_permits(),
            queued: self.admission_queue.len(),
            total_confirmed: self.total_confirmed,
            total_timeouts: self.total_timeouts,
            total_errors: self.total_errors,
        }
    }

    /// Default timeout used for admissions that do not override it.
    pub fn timeout_check_interval() -> Duration {
        Duration::from_secs(5)
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SignatureTrackerStats {
    pub max_subscriptions: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub total_confirmed: u64,
    pub total_timeouts: u64,
    pub total_errors: u64,
}

/// The control-channel request the concrete websocket connection loop
/// accepts from the rest of the process. Lives here rather than in the
/// binary crate so the pipeline can depend on the request shape without
/// depending on the transport that services it.
pub enum SignatureTrackRequest {
    Track {
        signature: String,
        commitment: String,
        timeout_s: u64,
        resp: tokio::sync::oneshot::Sender<Result<SignatureOutcome, String>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_success_notification() {
        let outcome = classify_notification(&serde_json::Value::Null);
        assert_eq!(outcome, SignatureOutcome::Confirmed);
    }

    #[test]
    fn classify_slippage_by_custom_code() {
        let err = serde_json::json!({"InstructionError": [0, {"Custom": 6002}]});
        assert_eq!(
            classify_notification(&err),
            SignatureOutcome::Error(CoreError::Slippage)
        );
    }

    #[test]
    fn classify_insufficient_lamports_custom_code_1() {
        let err = serde_json::json!({"InstructionError": [0, {"Custom": 1}]});
        assert_eq!(
            classify_notification(&err),
            SignatureOutcome::Error(CoreError::InsufficientLamports)
        );
    }

    #[test]
    fn subscribe_respects_admission_capacity() {
        let mut tracker = SignatureTracker::new(10, 1);
        assert!(tracker.subscribe("sig1".into(), "confirmed".into(), 60));
        assert!(!tracker.subscribe("sig2".into(), "confirmed".into(), 60));
    }

    #[test]
    fn try_admit_transitions_to_subscribed() {
        let mut tracker = SignatureTracker::new(1, 10);
        tracker.subscribe("sig1".into(), "confirmed".into(), 60);
        let admitted = tracker.try_admit();
        assert!(admitted.is_some());
        assert_eq!(
            tracker.get_status("sig1"),
            Some(SubscriptionStatus::Subscribed)
        );
    }

    #[test]
    fn try_admit_respects_semaphore_with_max_one() {
        let mut tracker = SignatureTracker::new(1, 10);
        tracker.subscribe("sig1".into(), "confirmed".into(), 60);
        tracker.subscribe("sig2".into(), "confirmed".into(), 60);
        let first = tracker.try_admit();
        assert!(first.is_some());
        let second = tracker.try_admit();
        assert!(second.is_none(), "second admission should block on the held permit");
    }

    #[test]
    fn buffered_notification_resolved_on_subscribe_ack() {
        let mut tracker = SignatureTracker::new(10, 10);
        tracker.buffer_notification(42, serde_json::Value::Null);
        let resolved = tracker.on_subscribed("sig1", 42);
        assert_eq!(resolved, Some(serde_json::Value::Null));
    }
}
