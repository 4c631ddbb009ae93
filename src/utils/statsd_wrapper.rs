use std::sync::Arc;

use cadence::{Counted, Gauged, NopMetricSink, StatsdClient, Timed};

/// Fire-and-forget statsd emission. Metric failures are never allowed to
/// affect the write path, so every result is dropped.
#[derive(Clone)]
pub struct StatsdClientWrapper {
    client: Arc<StatsdClient>,
}

impl StatsdClientWrapper {
    pub fn new(client: StatsdClient) -> Self {
        StatsdClientWrapper {
            client: Arc::new(client),
        }
    }

    /// A wrapper that swallows every metric; used by tests and when no
    /// statsd target is configured.
    pub fn noop() -> Self {
        StatsdClientWrapper {
            client: Arc::new(StatsdClient::from_sink("hubd", NopMetricSink)),
        }
    }

    pub fn count(&self, key: &str, value: u64) {
        let _ = self.client.count(key, value as i64);
    }

    pub fn gauge(&self, key: &str, value: u64) {
        let _ = self.client.gauge(key, value);
    }

    pub fn time(&self, key: &str, value: u64) {
        let _ = self.client.time(key, value);
    }
}
