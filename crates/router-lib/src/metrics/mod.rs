//! Host utilization sampling and the rolling sample store
//!
//! A single sampler task reads CPU and memory utilization on a fixed
//! interval and appends to a time-bounded store; the metrics backend answers
//! "now" and "at time T" questions from that store.

mod query;
mod reader;
mod sampler;
mod store;


pub use query::{format_local, parse_local_timestamp, Metric, MetricsQuery};
pub use reader::{SysinfoReader, SystemReader, Utilization};
pub use sampler::{Sampler, SamplerBuilder, SamplerConfig};
pub use store::{RollingStore, StoreStats, DEFAULT_MAX_SAMPLES, DEFAULT_WINDOW};
