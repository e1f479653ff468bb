// Concrete websocket connection loop for the launchpad data feed. Owns the
// socket; all subscription bookkeeping and message decoding lives in
// `copytrader_core::event_feed`. Grounded in `pumpportal_ws.rs`'s outer
// reconnect loop, generalized to replay every active subscription (not just
// "new token") after a reconnect, using `ReconnectBackoff` instead of a fixed
// 2-second sleep.

use std::sync::Arc;

use futures_util::{stream::StreamExt, SinkExt};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use copytrader_core::event_feed::{EventFeedClient, FeedEvent, ReconnectBackoff};

/// Connects to `ws_url`, replays every subscription already registered on
/// `event_feed`, dispatches incoming frames through it, and forwards any
/// outgoing subscribe/unsubscribe payload enqueued on `outbox`. Runs until
/// the process exits or the backoff budget is exhausted.
pub async fn run_event_feed_ws(
    ws_url: &str,
    event_feed: Arc<Mutex<EventFeedClient>>,
    mut outbox: mpsc::UnboundedReceiver<serde_json::Value>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut backoff = ReconnectBackoff::new(3, 60, u32::MAX);

    loop {
        info!("Connecting to data feed at {}", ws_url);
        match connect_async(ws_url).await {
            Ok((ws_stream, _)) => {
                backoff.reset();
                let (mut write, mut read) = ws_stream.split();

                let replay = event_feed.lock().await.replay_payloads();
                for payload in replay {
                    if let Err(e) = write.send(Message::Text(payload.to_string())).await {
                        error!("Failed to replay subscription after reconnect: {}", e);
                    }
                }
                info!("Data feed connected; replayed {} subscriptions", event_feed.lock().await.active_subscriptions().len());

                loop {
                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    debug!("Data feed raw message: {}", text);
                                    match serde_json::from_str::<FeedEvent>(&text) {
                                        Ok(event) => {
                                            let mint = match &event {
                                                FeedEvent::Trade(trade) => Some(trade.mint.clone()),
                                                _ => None,
                                            };
                                            event_feed.lock().await.dispatch(mint.as_deref(), event);
                                        }
                                        Err(e) => debug!("Data feed message did not decode as FeedEvent: {}", e),
                                    }
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    if let Err(e) = write.send(Message::Pong(data)).await {
                                        warn!("Failed to send pong: {}", e);
                                    }
                                }
                                Some(Ok(Message::Close(_))) => {
                                    warn!("Data feed closed by server");
                                    break;
                                }
                                Some(Err(e)) => {
                                    error!("Data feed read error: {}", e);
                                    break;
                                }
                                None => {
                                    warn!("Data feed stream ended");
                                    break;
                                }
                                _ => {}
                            }
                        }
                        outgoing = outbox.recv() => {
                            match outgoing {
                                Some(payload) => {
                                    if let Err(e) = write.send(Message::Text(payload.to_string())).await {
                                        error!("Failed to send outgoing feed payload: {}", e);
                                    }
                                }
                                None => {
                                    warn!("Feed outbox closed; continuing to read only");
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!("Failed to connect to data feed: {}", e);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!("Data feed reconnect budget exhausted; giving up");
            return Err("data feed reconnect budget exhausted".into());
        };
        info!("Data feed disconnected; reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
