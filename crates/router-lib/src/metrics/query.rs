//! Human-readable utilization queries over the rolling store

use super::{RollingStore, SystemReader};
use crate::error::TimestampParseError;
use crate::models::Sample;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::debug;

const SECOND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Which utilization figure a query reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Cpu => "CPU",
            Metric::Memory => "Memory",
        }
    }

    fn value(&self, sample: &Sample) -> f32 {
        match self {
            Metric::Cpu => sample.cpu_percent,
            Metric::Memory => sample.memory_percent,
        }
    }
}

/// Parse a local wall-clock timestamp
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD HH:MM`. Times that do not exist locally (DST gaps) are
/// rejected; ambiguous times resolve to the earlier instant.
pub fn parse_local_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampParseError> {
    let normalized = input.trim().replacen('T', " ", 1);

    let naive = NaiveDateTime::parse_from_str(&normalized, SECOND_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, MINUTE_FORMAT))
        .map_err(|_| TimestampParseError::new(input))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TimestampParseError::new(input))
}

/// Format an instant as local wall-clock time, second precision
pub fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(SECOND_FORMAT).to_string()
}

/// Answers the metrics backend's questions
#[derive(Clone)]
pub struct MetricsQuery {
    store: Arc<RollingStore>,
    fallback: Option<Arc<dyn SystemReader>>,
}

impl MetricsQuery {
    pub fn new(store: Arc<RollingStore>) -> Self {
        Self {
            store,
            fallback: None,
        }
    }

    /// Read directly from this reader when the store has no samples yet
    ///
    /// Direct reads can block; call [`MetricsQuery::now`] off the async
    /// workers when a fallback is set.
    pub fn with_fallback(mut self, reader: Arc<dyn SystemReader>) -> Self {
        self.fallback = Some(reader);
        self
    }

    /// Current utilization
    pub fn now(&self, metric: Metric) -> String {
        let value = match self.store.latest() {
            Some(sample) => Some(metric.value(&sample)),
            None => self.read_direct(metric),
        };

        match value {
            Some(v) => format!(
                "{} utilization is approximately {:.1}% right now.",
                metric.label(),
                v
            ),
            None => format!("No {} sample available yet.", metric.label()),
        }
    }

    /// Utilization at the nearest sample at or before `timestamp`
    pub fn at(&self, metric: Metric, timestamp: &str) -> Result<String, TimestampParseError> {
        let when = parse_local_timestamp(timestamp)?;

        Ok(match self.store.at_or_before(when) {
            Some(sample) => format!(
                "{} utilization at {} was approximately {:.1}%.",
                metric.label(),
                format_local(sample.timestamp),
                metric.value(&sample)
            ),
            None => format!(
                "No {} sample available at or before the requested time.",
                metric.label()
            ),
        })
    }

    fn read_direct(&self, metric: Metric) -> Option<f32> {
        let reader = self.fallback.as_ref()?;
        match reader.read() {
            Ok(u) => Some(match metric {
                Metric::Cpu => u.cpu_percent,
                Metric::Memory => u.memory_percent,
            }),
            Err(e) => {
                debug!(error = %e, "Direct utilization read failed");
                None
            }
        }
    }
}
