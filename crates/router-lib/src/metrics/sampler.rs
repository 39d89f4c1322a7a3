//! Utilization sampling loop
//!
//! Periodically reads host CPU and memory utilization and appends one
//! sample per tick to the rolling store until shutdown is signalled.

use super::{RollingStore, SystemReader};
use crate::health::{components, HealthRegistry};
use crate::models::Sample;
use crate::observability::AgentMetrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Sampling interval (default: 2 seconds)
    pub interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

/// Background producer of utilization samples
pub struct Sampler {
    reader: Arc<dyn SystemReader>,
    store: Arc<RollingStore>,
    config: SamplerConfig,
    metrics: Option<AgentMetrics>,
    health: Option<HealthRegistry>,
}

impl Sampler {
    pub fn new(
        reader: Arc<dyn SystemReader>,
        store: Arc<RollingStore>,
        config: SamplerConfig,
    ) -> Self {
        Self {
            reader,
            store,
            config,
            metrics: None,
            health: None,
        }
    }

    /// Run until a shutdown message arrives or the sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting utilization sampler"
        );

        // The first CPU reading after process start has no baseline.
        if let Err(e) = self.reader.prime() {
            warn!(error = %e, "Failed to prime CPU measurement");
        }

        let mut ticker = interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failing = false;
        let mut sample_count = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sample_once() {
                        Ok(sample) => {
                            sample_count += 1;
                            if failing {
                                info!("Utilization reads recovered");
                                failing = false;
                                if let Some(health) = &self.health {
                                    health.set_healthy(components::SAMPLER).await;
                                }
                            }
                            if sample_count % 30 == 0 {
                                debug!(
                                    samples = self.store.len(),
                                    cpu_percent = sample.cpu_percent,
                                    memory_percent = sample.memory_percent,
                                    "Sampler progress"
                                );
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read utilization, skipping tick");
                            if let Some(metrics) = &self.metrics {
                                metrics.inc_sample_errors();
                            }
                            if !failing {
                                failing = true;
                                if let Some(health) = &self.health {
                                    health.set_degraded(components::SAMPLER, e.to_string()).await;
                                }
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(samples = self.store.len(), "Shutting down utilization sampler");
                    break;
                }
            }
        }
    }

    /// Take one reading and push it into the store
    fn sample_once(&self) -> Result<Sample> {
        let reading = self.reader.read()?;
        let sample = Sample::new(
            chrono::Utc::now(),
            reading.cpu_percent,
            reading.memory_percent,
        );
        self.store.add_sample(sample);

        if let Some(metrics) = &self.metrics {
            metrics.inc_samples_recorded();
            metrics.set_store_samples(self.store.len() as i64);
        }
        Ok(sample)
    }
}

/// Builder for creating the sampler
pub struct SamplerBuilder {
    reader: Option<Arc<dyn SystemReader>>,
    store: Option<Arc<RollingStore>>,
    config: SamplerConfig,
    metrics: Option<AgentMetrics>,
    health: Option<HealthRegistry>,
}

impl SamplerBuilder {
    pub fn new() -> Self {
        Self {
            reader: None,
            store: None,
            config: SamplerConfig::default(),
            metrics: None,
            health: None,
        }
    }

    /// Set the utilization reader
    pub fn reader(mut self, reader: Arc<dyn SystemReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Set the destination store
    pub fn store(mut self, store: Arc<RollingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the sampling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<Sampler> {
        let reader = self
            .reader
            .ok_or_else(|| anyhow::anyhow!("Reader is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Sampling interval must be positive");
        }

        let mut sampler = Sampler::new(reader, store, self.config);
        sampler.metrics = self.metrics;
        sampler.health = self.health;
        Ok(sampler)
    }
}

impl Default for SamplerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Utilization;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedReader {
        primes: AtomicUsize,
        reads: AtomicUsize,
    }

    impl FixedReader {
        fn new() -> Self {
            Self {
                primes: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl SystemReader for FixedReader {
        fn prime(&self) -> Result<()> {
            self.primes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read(&self) -> Result<Utilization> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(Utilization {
                cpu_percent: 12.5,
                memory_percent: 40.0,
            })
        }
    }

    #[test]
    fn test_sampler_config_default() {
        let config = SamplerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_builder_missing_reader() {
        let result = SamplerBuilder::new()
            .store(Arc::new(RollingStore::default()))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = SamplerBuilder::new()
            .reader(Arc::new(FixedReader::new()))
            .store(Arc::new(RollingStore::default()))
            .interval(Duration::ZERO)
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_sample_once_pushes_into_store() {
        let store = Arc::new(RollingStore::default());
        let sampler = SamplerBuilder::new()
            .reader(Arc::new(FixedReader::new()))
            .store(store.clone())
            .build()
            .unwrap();

        let sample = sampler.sample_once().unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.latest(), Some(sample));
        assert_eq!(sample.cpu_percent, 12.5);
    }

    #[tokio::test]
    async fn test_run_primes_once_and_stops_on_shutdown() {
        let reader = Arc::new(FixedReader::new());
        let store = Arc::new(RollingStore::default());
        let sampler = SamplerBuilder::new()
            .reader(reader.clone())
            .store(store.clone())
            .interval(Duration::from_millis(10))
            .build()
            .unwrap();

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(sampler.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sampler did not stop")
            .unwrap();

        assert_eq!(reader.primes.load(Ordering::SeqCst), 1);
        assert!(reader.reads.load(Ordering::SeqCst) >= 2);
        assert!(store.len() >= 2);
    }
}
