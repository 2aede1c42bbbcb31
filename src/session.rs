//! Subscription session: one per connected client.
//!
//! `AwaitingFilter -> Active -> Closed`. The first data frame must be a
//! subscribe message carrying a `[[lon, lat], [lon, lat]]` bounding box.
//! Once active, the session pushes a FeatureCollection every tick while a
//! separate task drains inbound frames to notice the peer leaving.

use std::net::SocketAddr;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    context::AppContext,
    geo::{BoundingBox, InvalidBoundingBox},
};

/// Client protocol violations; the message is sent to the client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubscribeError {
    #[error("Invalid subscription message format")]
    InvalidFormat,

    #[error("First message must be a subscribe message")]
    NotSubscribe,

    #[error(transparent)]
    InvalidBoundingBox(#[from] InvalidBoundingBox),
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "boundingBox", default)]
    bounding_box: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Reply {
    Status { status: &'static str },
    Error { error: String },
}

impl Reply {
    fn into_message(self) -> Option<Message> {
        match serde_json::to_string(&self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                warn!("Failed to serialize reply: {}", e);
                None
            }
        }
    }
}

/// Validate the first client message
pub fn parse_subscribe(payload: &[u8]) -> Result<BoundingBox, SubscribeError> {
    let request: SubscribeRequest =
        serde_json::from_slice(payload).map_err(|_| SubscribeError::InvalidFormat)?;

    if request.kind != "subscribe" {
        return Err(SubscribeError::NotSubscribe);
    }

    Ok(BoundingBox::try_from(request.bounding_box.as_slice())?)
}

/// Drive one client connection until it closes
pub async fn run(socket: WebSocket, ctx: AppContext, peer: SocketAddr) {
    info!(%peer, "Subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    let bbox = match await_filter(&mut receiver).await {
        Some(Ok(bbox)) => bbox,
        Some(Err(e)) => {
            info!(%peer, "Rejecting subscription: {}", e);
            reject(&mut sender, &e).await;
            return;
        }
        None => {
            info!(%peer, "Subscriber left before subscribing");
            return;
        }
    };

    info!(%peer, "Client subscribed with bounding box: {:?}", bbox.ring());
    let subscribed = Reply::Status {
        status: "subscribed",
    };
    if let Some(message) = subscribed.into_message() {
        if sender.send(message).await.is_err() {
            return;
        }
    }

    let mut reader = tokio::spawn(drain(receiver, peer));
    let period = ctx.settings.tick_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut reader => {
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = push_snapshot(&mut sender, &ctx, &bbox).await {
                    debug!(%peer, "Write error: {}", e);
                    break;
                }
            }
        }
    }

    reader.abort();
    info!(%peer, "Subscription closed");
}

/// Wait for the first data frame and parse it; None if the peer went away
async fn await_filter(
    receiver: &mut SplitStream<WebSocket>,
) -> Option<Result<BoundingBox, SubscribeError>> {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => return Some(parse_subscribe(text.as_str().as_bytes())),
            Ok(Message::Binary(data)) => return Some(parse_subscribe(&data)),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                debug!("Failed to read subscription message: {}", e);
                return None;
            }
        }
    }
    None
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, error: &SubscribeError) {
    let reply = Reply::Error {
        error: error.to_string(),
    };
    if let Some(message) = reply.into_message() {
        if sender.send(message).await.is_err() {
            return;
        }
    }

    let close = Message::Close(Some(CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static("invalid subscription"),
    }));
    let _ = sender.send(close).await;
}

/// Discard inbound frames until the peer closes or errors
async fn drain(mut receiver: SplitStream<WebSocket>, peer: SocketAddr) {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => debug!(%peer, "Ignoring message from subscriber"),
            Err(e) => {
                debug!(%peer, "Read error: {}", e);
                break;
            }
        }
    }
}

/// One tick: query, convert, push. Only a failed write is an error; a
/// failed query skips the tick.
async fn push_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    ctx: &AppContext,
    bbox: &BoundingBox,
) -> Result<(), axum::Error> {
    let collection = match ctx.snapshot(bbox).await {
        Ok(collection) => collection,
        Err(e) => {
            warn!("Position query failed, skipping tick: {}", e);
            return Ok(());
        }
    };

    let json = match serde_json::to_string(&collection) {
        Ok(json) => json,
        Err(e) => {
            warn!("Error serializing feature collection: {}", e);
            return Ok(());
        }
    };

    sender.send(Message::Text(json.into())).await
}
