//! Feed ingestion: raw frame -> [`PositionRecord`] -> position store

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::{
    database::PositionStore,
    errors::AisLiveError,
    feed::FeedSource,
    models::{FeedMessage, PositionRecord},
};

/// Decode one raw feed message into a position record
pub fn normalize(frame: &[u8]) -> Result<PositionRecord, AisLiveError> {
    let message: FeedMessage = serde_json::from_slice(frame)?;
    PositionRecord::try_from(message)
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub stored: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Consume `feed` until it ends, fails, or `shutdown` resolves.
///
/// Undecodable messages and store errors are logged and skipped. A transport
/// error ends ingestion and is returned. On shutdown the feed is closed,
/// waiting at most `close_timeout` for the peer.
pub async fn run<F, S>(
    mut feed: F,
    store: &dyn PositionStore,
    shutdown: S,
    close_timeout: Duration,
) -> Result<IngestStats, AisLiveError>
where
    F: FeedSource,
    S: Future<Output = ()>,
{
    let mut stats = IngestStats::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            message = feed.recv() => {
                match message {
                    Ok(Some(frame)) => ingest_frame(&frame, store, &mut stats).await,
                    Ok(None) => {
                        info!("Feed ended after {:?}", stats);
                        return Ok(stats);
                    }
                    Err(e) => {
                        error!("Feed receive error: {}", e);
                        return Err(e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down ingestion, closing feed");
                feed.close(close_timeout).await?;
                return Ok(stats);
            }
        }
    }
}

async fn ingest_frame(frame: &[u8], store: &dyn PositionStore, stats: &mut IngestStats) {
    let record = match normalize(frame) {
        Ok(record) => record,
        Err(e) => {
            warn!("Failed to decode feed message: {}", e);
            stats.skipped += 1;
            return;
        }
    };

    match store.upsert(&record).await {
        Ok(()) => {
            debug!("Ingested {} for MMSI {}", record.message_type, record.mmsi());
            stats.stored += 1;
        }
        Err(e) => {
            error!("Failed to store position for MMSI {}: {}", record.mmsi(), e);
            stats.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::database::MemoryStore;
    use crate::geo::BoundingBox;
    use crate::models::Mmsi;

    /// Scripted feed: yields its frames, then either ends or stays silent
    struct FakeFeed {
        frames: VecDeque<Result<Vec<u8>, AisLiveError>>,
        hang_when_empty: bool,
        closed: Arc<AtomicBool>,
    }

    impl FakeFeed {
        fn new(frames: Vec<Result<Vec<u8>, AisLiveError>>) -> Self {
            Self {
                frames: frames.into(),
                hang_when_empty: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
        async fn recv(&mut self) -> Result<Option<Vec<u8>>, AisLiveError> {
            match self.frames.pop_front() {
                Some(frame) => frame.map(Some),
                None if self.hang_when_empty => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&mut self, _wait: Duration) -> Result<(), AisLiveError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Memory store that refuses writes for one MMSI
    struct RejectingStore {
        inner: MemoryStore,
        reject: u32,
    }

    #[async_trait]
    impl PositionStore for RejectingStore {
        async fn upsert(&self, record: &PositionRecord) -> Result<(), AisLiveError> {
            if u32::from(record.mmsi()) == self.reject {
                return Err(AisLiveError::IoError(std::io::Error::other(
                    "connection reset",
                )));
            }
            self.inner.upsert(record).await
        }

        async fn query_within(
            &self,
            bbox: &BoundingBox,
            since: chrono::DateTime<chrono::Utc>,
        ) -> Result<Vec<PositionRecord>, AisLiveError> {
            self.inner.query_within(bbox, since).await
        }
    }

    fn report(mmsi: u32, lat: f64, lon: f64) -> Result<Vec<u8>, AisLiveError> {
        Ok(json!({
            "MessageType": "PositionReport",
            "Message": {"PositionReport": {"TrueHeading": 180, "UserID": mmsi}},
            "MetaData": {
                "MMSI": mmsi,
                "ShipName": "TEST",
                "latitude": lat,
                "longitude": lon,
                "time_utc": "2024-06-01 12:00:00.000001 +0000 UTC"
            }
        })
        .to_string()
        .into_bytes())
    }

    #[test]
    fn normalize_derives_lon_lat_point() {
        let record = normalize(&report(123456789, 41.0, -71.0).unwrap()).unwrap();
        let point = record.geometry.unwrap();
        assert_eq!(point.coordinates, [-71.0, 41.0]);
    }

    #[test]
    fn normalize_rejects_bad_timestamp() {
        let frame = json!({
            "MessageType": "PositionReport",
            "Message": {},
            "MetaData": {
                "MMSI": 1, "ShipName": "", "latitude": 0.0, "longitude": 0.0,
                "time_utc": "yesterday"
            }
        })
        .to_string();
        assert!(matches!(
            normalize(frame.as_bytes()),
            Err(AisLiveError::SerdeError(_))
        ));
    }

    #[tokio::test]
    async fn bad_message_does_not_stop_ingestion() {
        let feed = FakeFeed::new(vec![
            report(111111111, 41.0, -71.0),
            Ok(b"{not json".to_vec()),
            report(222222222, 41.5, -70.5),
        ]);
        let store = MemoryStore::new();

        let stats = run(feed, &store, std::future::pending(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(stats.stored, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.len().await, 2);
        assert!(store
            .get(Mmsi::try_from(222222222u32).unwrap())
            .await
            .is_some());
    }

    #[tokio::test]
    async fn repeated_mmsi_keeps_latest() {
        let feed = FakeFeed::new(vec![
            report(123456789, 41.0, -71.0),
            report(123456789, 42.0, -70.0),
        ]);
        let store = MemoryStore::new();

        run(feed, &store, std::future::pending(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store
            .get(Mmsi::try_from(123456789u32).unwrap())
            .await
            .unwrap();
        assert_eq!(stored.metadata.latitude, 42.0);
    }

    #[tokio::test]
    async fn transport_error_ends_ingestion() {
        let feed = FakeFeed::new(vec![
            report(111111111, 41.0, -71.0),
            Err(AisLiveError::IoError(std::io::Error::other("reset"))),
            report(222222222, 41.5, -70.5),
        ]);
        let store = MemoryStore::new();

        let result = run(feed, &store, std::future::pending(), Duration::from_secs(1)).await;

        assert!(result.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn shutdown_closes_feed() {
        let mut feed = FakeFeed::new(vec![report(111111111, 41.0, -71.0)]);
        feed.hang_when_empty = true;
        let closed = feed.closed.clone();
        let store = MemoryStore::new();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = async move {
            let _ = rx.await;
        };
        let handle = tokio::spawn(async move {
            run(feed, &store, shutdown, Duration::from_secs(1)).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(stats.stored, 1);
    }

    #[tokio::test]
    async fn store_error_skips_only_that_record() {
        let feed = FakeFeed::new(vec![
            report(111111111, 41.0, -71.0),
            report(222222222, 41.5, -70.5),
            report(333333333, 42.0, -70.0),
        ]);
        let store = RejectingStore {
            inner: MemoryStore::new(),
            reject: 222222222,
        };

        let stats = run(feed, &store, std::future::pending(), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(stats.stored, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 0);
        assert_eq!(store.inner.len().await, 2);
        assert!(store
            .inner
            .get(Mmsi::try_from(222222222u32).unwrap())
            .await
            .is_none());
        assert!(store
            .inner
            .get(Mmsi::try_from(333333333u32).unwrap())
            .await
            .is_some());
    }
}
