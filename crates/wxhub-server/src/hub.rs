//! Push fan-out of the forecast series to connected subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use wxhub_forecast::{ForecastClient, ForecastPoint};

/// Identifies one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber connection closed")]
    Closed,

    #[error("delivery timed out")]
    TimedOut,

    #[error("delivery failed: {0}")]
    Transport(String),
}

/// Write side of one push connection.
#[async_trait]
pub trait SubscriberSink: Send {
    async fn deliver(&mut self, payload: &str) -> Result<(), DeliveryError>;

    /// Close the underlying connection. Errors are swallowed.
    async fn close(&mut self);
}

struct Subscriber {
    sink: Box<dyn SubscriberSink>,
    /// Cancelled once the hub has dropped this subscriber.
    removed: CancellationToken,
}

/// The set of connected subscribers.
///
/// Every mutation and every delivery pass go through one async mutex, so at
/// most one of connect, disconnect or broadcast touches the set at a time.
/// Removed subscribers are closed after the lock is released, and each close
/// is bounded by the send timeout.
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    send_timeout: Duration,
}

impl BroadcastHub {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            send_timeout,
        }
    }

    pub async fn connect(&self, sink: Box<dyn SubscriberSink>) -> SubscriberId {
        self.connect_watched(sink).await.0
    }

    /// Register `sink` and return a token that fires when the hub removes it,
    /// whether by pruning, `disconnect` or `close_all`.
    pub async fn connect_watched(&self, sink: Box<dyn SubscriberSink>) -> (SubscriberId, CancellationToken) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let removed = CancellationToken::new();
        let mut subs = self.subscribers.lock().await;
        subs.insert(
            id,
            Subscriber {
                sink,
                removed: removed.clone(),
            },
        );
        tracing::info!("Subscriber {} connected ({} total)", id, subs.len());
        (id, removed)
    }

    /// Remove and close a subscriber. Removing an unknown id is a no-op.
    pub async fn disconnect(&self, id: SubscriberId) {
        let removed = self.subscribers.lock().await.remove(&id);
        if let Some(subscriber) = removed {
            self.close_removed(vec![(id, subscriber)]).await;
            tracing::info!("Subscriber {} disconnected", id);
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Deliver `series` as one JSON array to every subscriber.
    ///
    /// Subscribers whose write fails or exceeds the send timeout are removed
    /// and closed; the rest still receive the payload. Returns the number
    /// removed.
    pub async fn broadcast_once(&self, series: &[ForecastPoint]) -> usize {
        let payload = match serde_json::to_string(series) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Failed to serialize forecast series: {}", e);
                return 0;
            }
        };

        let (pruned, remaining) = {
            let mut subs = self.subscribers.lock().await;
            let mut failed = Vec::new();

            for (id, subscriber) in subs.iter_mut() {
                let result =
                    match tokio::time::timeout(self.send_timeout, subscriber.sink.deliver(&payload)).await {
                        Ok(result) => result,
                        Err(_) => Err(DeliveryError::TimedOut),
                    };
                if let Err(e) = result {
                    tracing::warn!("Dropping subscriber {}: {}", id, e);
                    failed.push(*id);
                }
            }

            let pruned: Vec<_> = failed
                .into_iter()
                .filter_map(|id| subs.remove(&id).map(|s| (id, s)))
                .collect();
            (pruned, subs.len())
        };

        let count = pruned.len();
        self.close_removed(pruned).await;

        tracing::debug!(
            "Broadcast {} forecast points to {} subscriber(s), pruned {}",
            series.len(),
            remaining,
            count
        );
        count
    }

    /// Close and remove every subscriber.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.subscribers.lock().await.drain().collect();
        self.close_removed(drained).await;
    }

    /// Close subscribers already taken out of the set. Must be called without
    /// holding the subscriber lock.
    async fn close_removed(&self, removed: Vec<(SubscriberId, Subscriber)>) {
        let limit = self.send_timeout;
        join_all(removed.into_iter().map(|(id, mut subscriber)| async move {
            subscriber.removed.cancel();
            if tokio::time::timeout(limit, subscriber.sink.close()).await.is_err() {
                tracing::warn!("Subscriber {} did not close within {:?}", id, limit);
            }
        }))
        .await;
    }

    /// Fetch the series and broadcast it every `period` until `cancel` fires.
    ///
    /// A failed fetch skips the cycle and leaves the set untouched. A fetch
    /// in progress is abandoned on cancel. On exit all subscribers are closed.
    pub async fn run(self: Arc<Self>, forecast: ForecastClient, period: Duration, cancel: CancellationToken) {
        tracing::info!("Broadcast hub started: every {:?}", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = forecast.fetch_series() => result,
            };

            match result {
                Ok(series) => {
                    self.broadcast_once(&series).await;
                }
                Err(e) if e.is_transport() => {
                    tracing::warn!("Skipping broadcast, forecaster unreachable: {}", e)
                }
                Err(e) => tracing::warn!("Skipping broadcast, forecast unavailable: {}", e),
            }
        }

        self.close_all().await;
        tracing::info!("Broadcast hub stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type Log = std::sync::Mutex<Vec<String>>;

    const FOREVER: Duration = Duration::from_secs(3600);

    /// Records deliveries into a shared log; optionally fails or stalls.
    struct FakeSink {
        received: Arc<Log>,
        fail: bool,
        stall: bool,
        stall_close: bool,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl SubscriberSink for FakeSink {
        async fn deliver(&mut self, payload: &str) -> Result<(), DeliveryError> {
            if self.stall {
                tokio::time::sleep(FOREVER).await;
            }
            if self.fail {
                return Err(DeliveryError::Closed);
            }
            self.received.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn close(&mut self) {
            if self.stall_close {
                tokio::time::sleep(FOREVER).await;
            }
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Observed {
        received: Arc<Log>,
        closed: Arc<AtomicBool>,
    }

    fn fake_sink(fail: bool, stall: bool, stall_close: bool) -> (Box<dyn SubscriberSink>, Observed) {
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = FakeSink {
            received: received.clone(),
            fail,
            stall,
            stall_close,
            closed: closed.clone(),
        };
        (Box::new(sink), Observed { received, closed })
    }

    fn sink(fail: bool, stall: bool) -> (Box<dyn SubscriberSink>, Observed) {
        fake_sink(fail, stall, false)
    }

    /// A peer that neither reads nor acknowledges a close.
    fn wedged_sink() -> Box<dyn SubscriberSink> {
        fake_sink(false, true, true).0
    }

    fn series() -> Vec<ForecastPoint> {
        vec![
            ForecastPoint::new("2024-01-01", 10.0, 9.0, 11.0),
            ForecastPoint::new("2024-01-02", 12.0, 11.0, 13.0),
        ]
    }

    #[tokio::test]
    async fn test_failed_subscriber_is_pruned_others_receive() {
        let hub = BroadcastHub::new(Duration::from_secs(1));
        let (s1, o1) = sink(false, false);
        let (s2, o2) = sink(true, false);
        let (s3, o3) = sink(false, false);
        let id1 = hub.connect(s1).await;
        let id2 = hub.connect(s2).await;
        let id3 = hub.connect(s3).await;
        assert_ne!(id1, id2);
        assert_ne!(id2, id3);

        let pruned = hub.broadcast_once(&series()).await;

        assert_eq!(pruned, 1);
        assert_eq!(hub.subscriber_count().await, 2);
        assert_eq!(o1.received.lock().unwrap().len(), 1);
        assert_eq!(o3.received.lock().unwrap().len(), 1);
        assert!(o2.received.lock().unwrap().is_empty());
        assert!(o2.closed.load(Ordering::SeqCst));
        assert!(!o1.closed.load(Ordering::SeqCst));

        let payload: Vec<ForecastPoint> =
            serde_json::from_str(&o1.received.lock().unwrap()[0]).unwrap();
        assert_eq!(payload, series());

        // The pruned subscriber is gone; disconnecting it again is a no-op.
        hub.disconnect(id2).await;
        assert_eq!(hub.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_times_out() {
        let hub = BroadcastHub::new(Duration::from_millis(100));
        let (fast, fast_seen) = sink(false, false);
        let (slow, slow_seen) = sink(false, true);
        hub.connect(fast).await;
        hub.connect(slow).await;

        let pruned = hub.broadcast_once(&series()).await;

        assert_eq!(pruned, 1);
        assert_eq!(hub.subscriber_count().await, 1);
        assert_eq!(fast_seen.received.lock().unwrap().len(), 1);
        assert!(slow_seen.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_wedged_subscriber_does_not_hold_the_hub() {
        let hub = Arc::new(BroadcastHub::new(Duration::from_millis(100)));
        let (healthy, healthy_seen) = sink(false, false);
        hub.connect(healthy).await;
        hub.connect(wedged_sink()).await;

        // One timed-out delivery plus one timed-out close, with headroom.
        let pruned = tokio::time::timeout(Duration::from_secs(1), hub.broadcast_once(&series()))
            .await
            .expect("broadcast blocked on a wedged subscriber");
        assert_eq!(pruned, 1);
        assert_eq!(healthy_seen.received.lock().unwrap().len(), 1);

        let count = tokio::time::timeout(Duration::from_millis(50), hub.subscriber_count())
            .await
            .expect("subscriber lock still held");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_disconnect_and_close_all_bound_a_stuck_close() {
        let hub = BroadcastHub::new(Duration::from_millis(100));
        let id = hub.connect(wedged_sink()).await;
        hub.connect(wedged_sink()).await;

        tokio::time::timeout(Duration::from_secs(1), hub.disconnect(id))
            .await
            .expect("disconnect waited on close");
        assert_eq!(hub.subscriber_count().await, 1);

        tokio::time::timeout(Duration::from_secs(1), hub.close_all())
            .await
            .expect("close_all waited on close");
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_removal_token_fires_when_pruned() {
        let hub = BroadcastHub::new(Duration::from_secs(1));
        let (kept, _) = sink(false, false);
        let (dropped, _) = sink(true, false);
        let (_, kept_token) = hub.connect_watched(kept).await;
        let (_, dropped_token) = hub.connect_watched(dropped).await;

        hub.broadcast_once(&series()).await;

        assert!(dropped_token.is_cancelled());
        assert!(!kept_token.is_cancelled());

        hub.close_all().await;
        assert!(kept_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let hub = BroadcastHub::new(Duration::from_secs(1));
        let (s, seen) = sink(false, false);
        let (id, removed) = hub.connect_watched(s).await;

        hub.disconnect(id).await;
        hub.disconnect(id).await;

        assert_eq!(hub.subscriber_count().await, 0);
        assert!(seen.closed.load(Ordering::SeqCst));
        assert!(removed.is_cancelled());
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers() {
        let hub = BroadcastHub::new(Duration::from_secs(1));
        assert_eq!(hub.broadcast_once(&series()).await, 0);
    }

    #[tokio::test]
    async fn test_run_broadcasts_and_closes_on_cancel() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"date": "2024-01-01", "forecast_temp": 10, "forecast_temp_lower": 9, "forecast_temp_upper": 11}
            ])))
            .mount(&mock_server)
            .await;

        let forecast = ForecastClient::new(&mock_server.uri(), Duration::from_secs(2)).unwrap();
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let (s, seen) = sink(false, false);
        hub.connect(s).await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.clone().run(forecast, Duration::from_millis(50), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(!seen.received.lock().unwrap().is_empty());
        assert!(seen.closed.load(Ordering::SeqCst));
        assert_eq!(hub.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_skips_cycle_when_forecast_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let forecast = ForecastClient::new(&mock_server.uri(), Duration::from_secs(2)).unwrap();
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let (s, seen) = sink(false, false);
        hub.connect(s).await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.clone().run(forecast, Duration::from_millis(50), cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hub.subscriber_count().await, 1);
        assert!(seen.received.lock().unwrap().is_empty());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_during_slow_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&mock_server)
            .await;

        let forecast = ForecastClient::new(&mock_server.uri(), Duration::from_secs(60)).unwrap();
        let hub = Arc::new(BroadcastHub::new(Duration::from_secs(1)));
        let (s, seen) = sink(false, false);
        hub.connect(s).await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.clone().run(forecast, Duration::from_millis(50), cancel.clone()));

        // Let the first tick fire so the fetch is outstanding.
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("hub kept waiting on the forecaster after cancel")
            .unwrap();
        assert!(seen.closed.load(Ordering::SeqCst));
        assert!(seen.received.lock().unwrap().is_empty());
    }
}
