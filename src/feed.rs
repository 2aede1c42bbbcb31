//! Feed client for the upstream AIS WebSocket stream

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::{config::FeedConfig, errors::AisLiveError};

/// Subscription sent once right after connecting.
///
/// NOTE: bounding boxes are `[[lat, lon], [lat, lon]]`, latitude first. This
/// is the feed's convention and differs from everywhere else in this crate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "Apikey")]
    pub api_key: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<[[f64; 2]; 2]>,
    #[serde(rename = "FilterMessageTypes")]
    pub filter_message_types: Vec<String>,
}

impl From<&FeedConfig> for SubscriptionRequest {
    fn from(config: &FeedConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            bounding_boxes: config.bounding_boxes.clone(),
            filter_message_types: config.message_types.clone(),
        }
    }
}

/// Source of raw feed frames
#[async_trait]
pub trait FeedSource: Send {
    /// Next raw message, None once the peer has closed the stream
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, AisLiveError>;

    /// Close handshake, waiting at most `wait` for the peer to acknowledge
    async fn close(&mut self, wait: Duration) -> Result<(), AisLiveError>;
}

pub struct FeedClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FeedClient {
    /// Connect to the feed and send the subscription
    pub async fn connect(config: &FeedConfig) -> Result<Self, AisLiveError> {
        info!("Connecting to feed at {}", config.url);
        let (mut stream, _) = connect_async(config.url.as_str()).await?;

        let subscription = serde_json::to_string(&SubscriptionRequest::from(config))?;
        stream.send(Message::Text(subscription.into())).await?;
        info!(
            "Subscribed to feed: {} bounding boxes, message types {:?}",
            config.bounding_boxes.len(),
            config.message_types
        );

        Ok(Self { stream })
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, AisLiveError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text.as_bytes().to_vec())),
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Close(frame) => {
                    info!("Feed closed by peer: {:?}", frame);
                    return Ok(None);
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Ok(None)
    }

    async fn close(&mut self, wait: Duration) -> Result<(), AisLiveError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            warn!("Failed to send close frame: {}", e);
            return Ok(());
        }

        // Drain until the peer acknowledges by ending the stream
        let drained = tokio::time::timeout(wait, async {
            while let Some(message) = self.stream.next().await {
                if let Err(e) = message {
                    debug!("Feed error while closing: {}", e);
                    break;
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Feed did not acknowledge close within {:?}", wait);
        }
        Ok(())
    }
}
