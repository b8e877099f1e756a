//! Periodic backend liveness probing.

use crate::storage::DynBackend;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Default)]
pub struct ProbeStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl ProbeStats {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.succeeded() + self.failed()
    }
}

/// Background task pinging the backend once per interval. The first probe
/// fires one full interval after start. Failures are logged and never stop
/// the loop.
pub struct HealthProber {
    cancel: CancellationToken,
    stats: Arc<ProbeStats>,
    handle: Option<JoinHandle<()>>,
}

impl HealthProber {
    pub fn start(backend: DynBackend, interval: Duration) -> Self {
        let period = if interval.is_zero() {
            DEFAULT_PROBE_INTERVAL
        } else {
            interval
        };

        let cancel = CancellationToken::new();
        let stats = Arc::new(ProbeStats::default());
        let handle = tokio::spawn(probe_loop(backend, period, cancel.clone(), stats.clone()));

        Self {
            cancel,
            stats,
            handle: Some(handle),
        }
    }

    pub fn stats(&self) -> Arc<ProbeStats> {
        self.stats.clone()
    }

    /// Stops probing and waits for the loop to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "health prober exited abnormally");
            }
        }
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn probe_loop(
    backend: DynBackend,
    period: Duration,
    cancel: CancellationToken,
    stats: Arc<ProbeStats>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match backend.ping().await {
            Ok(()) => {
                stats.succeeded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(latency = ?started.elapsed(), "storage health probe ok");
            }
            Err(error) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(latency = ?started.elapsed(), %error, "storage health probe failed");
            }
        }
    }

    tracing::debug!("health prober stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectBackend;
    use crate::{GateError, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct FlakyPing {
        pings: AtomicUsize,
    }

    #[async_trait]
    impl ObjectBackend for FlakyPing {
        async fn put_object(&self, _key: &str, _payload: Bytes) -> Result<()> {
            Ok(())
        }

        async fn get_object(&self, _key: &str) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn delete_object(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            if self.pings.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(GateError::Backend("connection refused".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prober_survives_failed_probe() {
        let backend = Arc::new(FlakyPing::default());
        let prober = HealthProber::start(backend.clone(), Duration::from_secs(60));
        let stats = prober.stats();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(stats.total(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(stats.failed(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.succeeded(), 1);

        prober.stop().await;
        assert_eq!(backend.pings.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_probing() {
        let backend = Arc::new(FlakyPing::default());
        let prober = HealthProber::start(backend.clone(), Duration::from_secs(10));
        let stats = prober.stats();

        prober.stop().await;
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert_eq!(stats.total(), 0);
        assert_eq!(backend.pings.load(Ordering::SeqCst), 0);
    }
}
