//! WebSocket transport for swap status updates.
//!
//! One multiplexed connection carries updates for every subscribed swap on
//! the `swap.update` channel. The connection is established lazily and its
//! updates are fanned out over a broadcast channel; per-swap filtering
//! happens in [`crate::boltz::BoltzClient::subscribe_push`].

use crate::boltz::SwapUpdate;
use crate::error::Error;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Requests sent to the counterparty over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub(crate) enum WsRequest {
    Subscribe { channel: String, args: Vec<String> },
    Unsubscribe { channel: String, args: Vec<String> },
    Ping,
}

/// Responses received from the counterparty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub(crate) enum WsResponse {
    Subscribe {
        channel: String,
        args: Vec<String>,
    },
    Unsubscribe {
        channel: String,
        args: Vec<String>,
    },
    Update {
        channel: String,
        args: Vec<SwapUpdate>,
    },
    Error {
        reason: String,
    },
    Pong,
}

const SWAP_UPDATE_CHANNEL: &str = "swap.update";

pub(crate) struct BoltzWebSocket {
    ws_url: String,
    sender: Mutex<Option<mpsc::UnboundedSender<WsRequest>>>,
    updates: broadcast::Sender<SwapUpdate>,
    connected_tx: watch::Sender<bool>,
}

impl BoltzWebSocket {
    pub(crate) fn new(ws_url: String) -> Self {
        let (updates, _) = broadcast::channel(256);
        let (connected_tx, _) = watch::channel(false);

        Self {
            ws_url,
            sender: Mutex::new(None),
            updates,
            connected_tx,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    pub(crate) fn connected_watch(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub(crate) fn updates(&self) -> broadcast::Receiver<SwapUpdate> {
        self.updates.subscribe()
    }

    /// Connect if there is no live connection.
    pub(crate) async fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            return Ok(());
        }

        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| Error::transport(format!("websocket connect failed: {e}")))?;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsRequest>();

        {
            let mut sender = self.sender.lock().expect("lock");
            *sender = Some(tx);
        }

        self.connected_tx.send_replace(true);

        tracing::debug!(url = self.ws_url, "Connected to counterparty websocket");

        // Outgoing messages.
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let msg = match serde_json::to_string(&request) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::error!("Failed to encode websocket request: {e}");
                        continue;
                    }
                };

                if let Err(e) = write.send(Message::Text(msg)).await {
                    tracing::warn!("Failed to send websocket message: {e}");
                    break;
                }
            }
        });

        // Incoming messages.
        let updates = self.updates.clone();
        let connected_tx = self.connected_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<WsResponse>(&text) {
                            Ok(WsResponse::Update { args, .. }) => {
                                for update in args {
                                    // Nobody listening is fine.
                                    let _ = updates.send(update);
                                }
                            }
                            Ok(WsResponse::Error { reason }) => {
                                tracing::warn!("Counterparty websocket error: {reason}");
                            }
                            Ok(WsResponse::Subscribe { .. })
                            | Ok(WsResponse::Unsubscribe { .. })
                            | Ok(WsResponse::Pong) => {}
                            Err(e) => {
                                tracing::debug!("Unparseable websocket message: {e}");
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::debug!("Counterparty closed the websocket");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Websocket error: {e}");
                        break;
                    }
                    Ok(Message::Binary(_))
                    | Ok(Message::Ping(_))
                    | Ok(Message::Pong(_))
                    | Ok(Message::Frame(_)) => {}
                }
            }

            connected_tx.send_replace(false);
        });

        Ok(())
    }

    pub(crate) fn subscribe_swap(&self, swap_id: &str) -> Result<(), Error> {
        self.send(WsRequest::Subscribe {
            channel: SWAP_UPDATE_CHANNEL.to_string(),
            args: vec![swap_id.to_string()],
        })
    }

    pub(crate) fn unsubscribe_swap(&self, swap_id: &str) -> Result<(), Error> {
        self.send(WsRequest::Unsubscribe {
            channel: SWAP_UPDATE_CHANNEL.to_string(),
            args: vec![swap_id.to_string()],
        })
    }

    fn send(&self, request: WsRequest) -> Result<(), Error> {
        let sender = self.sender.lock().expect("lock");

        match sender.as_ref() {
            Some(sender) => sender
                .send(request)
                .map_err(|_| Error::transport("websocket not connected")),
            None => Err(Error::transport("websocket not connected")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::SwapStatus;

    #[test]
    fn requests_serialize_to_the_wire_format() {
        let request = WsRequest::Subscribe {
            channel: "swap.update".to_string(),
            args: vec!["swap-1".to_string()],
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"op":"subscribe","channel":"swap.update","args":["swap-1"]}"#
        );
    }

    #[test]
    fn update_responses_parse() {
        let json = r#"{
  "event": "update",
  "channel": "swap.update",
  "args": [{ "id": "swap-1", "status": "transaction.mempool" }]
}"#;

        let response: WsResponse = serde_json::from_str(json).unwrap();
        match response {
            WsResponse::Update { args, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(args[0].id, "swap-1");
                assert_eq!(args[0].status, SwapStatus::TransactionMempool);
            }
            WsResponse::Subscribe { .. }
            | WsResponse::Unsubscribe { .. }
            | WsResponse::Error { .. }
            | WsResponse::Pong => panic!("wrong variant"),
        }
    }
}
