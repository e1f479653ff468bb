// Concrete websocket connection loop driving the Signature-Tracking Client.
// Grounded in `ws.rs`'s placeholder-id remapping and pending-request map,
// generalized from bonding-curve `accountSubscribe` to `signatureSubscribe`
// against a Solana RPC node, and from a raw control enum to the tracker's
// own admission-queue/semaphore bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{stream::StreamExt, SinkExt};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use copytrader_core::signature_tracker::{SignatureOutcome, SignatureTrackRequest, SignatureTracker};

struct InFlight {
    signature: String,
    _permit: OwnedSemaphorePermit,
}

/// Connects to `wss_url`, admits signatures from `tracker`'s queue as
/// semaphore permits free up, correlates `signatureSubscribe` acks and
/// notifications back to the original caller, and retires timed-out
/// subscriptions on a fixed scan interval.
pub async fn run_signature_ws(
    wss_url: &str,
    tracker: Arc<Mutex<SignatureTracker>>,
    mut control_rx: mpsc::Receiver<SignatureTrackRequest>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        info!("Connecting to signature-tracking WebSocket at {}", wss_url);
        let (ws_stream, _) = match connect_async(wss_url).await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to signature WebSocket: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(3)).await;
                continue;
            }
        };
        let (mut write, mut read) = ws_stream.split();

        let mut req_id: i64 = 1;
        let mut waiting: HashMap<String, oneshot::Sender<Result<SignatureOutcome, String>>> = HashMap::new();
        let mut pending_acks: HashMap<i64, InFlight> = HashMap::new();
        let mut subid_to_flight: HashMap<u64, InFlight> = HashMap::new();

        let mut admit_tick = tokio::time::interval(std::time::Duration::from_millis(200));
        let mut timeout_tick = tokio::time::interval(SignatureTracker::timeout_check_interval());

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => { error!("Signature WS read error: {}", e); break; }
                        None => { warn!("Signature WS stream ended"); break; }
                    };
                    let text = match msg {
                        Message::Text(t) => t,
                        Message::Ping(data) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                warn!("Failed to send pong: {}", e);
                            }
                            continue;
                        }
                        Message::Close(_) => { warn!("Signature WS closed by server"); break; }
                        _ => continue,
                    };
                    let value: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => { debug!("Signature WS JSON parse error: {}", e); continue; }
                    };

                    // ---- subscribe ack ----
                    if let (Some(id), Some(result)) = (value.get("id").and_then(|v| v.as_i64()), value.get("result")) {
                        if let Some(flight) = pending_acks.remove(&id) {
                            if let Some(sub_id) = result.as_u64() {
                                let buffered = tracker.lock().await.on_subscribed(&flight.signature, sub_id);
                                if let Some(err) = buffered {
                                    if let Some(outcome) = tracker.lock().await.resolve_notification(sub_id, &err) {
                                        if let Some(resp) = waiting.remove(&flight.signature) {
                                            let _ = resp.send(Ok(outcome));
                                        }
                                    }
                                } else {
                                    subid_to_flight.insert(sub_id, flight);
                                }
                            } else if let Some(resp) = waiting.remove(&flight.signature) {
                                let _ = resp.send(Err("subscribe ack missing subscription id".to_string()));
                            }
                        }
                        continue;
                    }

                    // ---- notification ----
                    if let Some(params) = value.get("params") {
                        if let Some(sub_id) = params.get("subscription").and_then(|v| v.as_u64()) {
                            let Some(flight) = subid_to_flight.remove(&sub_id) else { continue };
                            let err = params
                                .get("result")
                                .and_then(|r| r.get("value"))
                                .and_then(|v| v.get("err"))
                                .cloned()
                                .unwrap_or(Value::Null);
                            if let Some(outcome) = tracker.lock().await.resolve_notification(sub_id, &err) {
                                if let Some(resp) = waiting.remove(&flight.signature) {
                                    let _ = resp.send(Ok(outcome));
                                }
                            }
                        }
                    }
                }

                Some(req) = control_rx.recv() => {
                    match req {
                        SignatureTrackRequest::Track { signature, commitment, timeout_s, resp } => {
                            let admitted = tracker.lock().await.subscribe(signature.clone(), commitment, timeout_s);
                            if !admitted {
                                let _ = resp.send(Err("signature admission queue is full".to_string()));
                            } else {
                                waiting.insert(signature, resp);
                            }
                        }
                    }
                }

                _ = admit_tick.tick() => {
                    loop {
                        let admitted = tracker.lock().await.try_admit();
                        let Some((signature, commitment, _timeout_s, permit)) = admitted else { break };
                        req_id += 1;
                        let id = req_id;
                        let request = json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "method": "signatureSubscribe",
                            "params": [ signature.clone(), { "commitment": commitment, "enableReceivedNotification": false } ]
                        });
                        if let Err(e) = write.send(Message::Text(request.to_string())).await {
                            error!("Failed to send signatureSubscribe for {}: {}", signature, e);
                            if let Some(resp) = waiting.remove(&signature) {
                                let _ = resp.send(Err(format!("failed to send subscribe request: {}", e)));
                            }
                        } else {
                            pending_acks.insert(id, InFlight { signature, _permit: permit });
                        }
                    }
                }

                _ = timeout_tick.tick() => {
                    let timed_out = tracker.lock().await.scan_timeouts();
                    for signature in timed_out {
                        if let Some(resp) = waiting.remove(&signature) {
                            let _ = resp.send(Ok(SignatureOutcome::Timeout));
                        }
                        subid_to_flight.retain(|_, flight| flight.signature != signature);
                    }
                }
            }
        }

        info!("Signature WebSocket disconnected; reconnecting in 3s...");
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    }
}
