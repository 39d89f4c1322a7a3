//! Host utilization readers

use anyhow::{bail, Result};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};

/// Instantaneous CPU and memory utilization, both in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utilization {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Source of instantaneous host utilization
pub trait SystemReader: Send + Sync {
    /// Take a throwaway CPU measurement so the next reading has a baseline
    fn prime(&self) -> Result<()>;

    /// Read current utilization. May block briefly while a CPU baseline
    /// settles.
    fn read(&self) -> Result<Utilization>;
}

struct SysinfoState {
    system: System,
    last_cpu_refresh: Option<Instant>,
}

/// Reader backed by `sysinfo`
///
/// CPU usage is computed between two refreshes, so the `System` instance is
/// kept alive for the lifetime of the reader. Two refreshes closer together
/// than [`MINIMUM_CPU_UPDATE_INTERVAL`] give a meaningless figure, so `read`
/// waits out the remainder of that interval since the previous refresh,
/// whoever made it.
pub struct SysinfoReader {
    state: Mutex<SysinfoState>,
}

impl SysinfoReader {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SysinfoState {
                system: System::new(),
                last_cpu_refresh: None,
            }),
        }
    }
}

/// How long to wait before the next CPU refresh is meaningful
fn settle_time(last_refresh: Option<Instant>, now: Instant, minimum: Duration) -> Duration {
    match last_refresh {
        Some(at) => minimum.saturating_sub(now.saturating_duration_since(at)),
        None => minimum,
    }
}

impl Default for SysinfoReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemReader for SysinfoReader {
    fn prime(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.system.refresh_cpu_usage();
        state.system.refresh_memory();
        state.last_cpu_refresh = Some(Instant::now());
        Ok(())
    }

    fn read(&self) -> Result<Utilization> {
        let mut state = self.state.lock();
        if state.last_cpu_refresh.is_none() {
            state.system.refresh_cpu_usage();
            state.last_cpu_refresh = Some(Instant::now());
        }
        let wait = settle_time(
            state.last_cpu_refresh,
            Instant::now(),
            MINIMUM_CPU_UPDATE_INTERVAL,
        );
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }

        state.system.refresh_cpu_usage();
        state.system.refresh_memory();
        state.last_cpu_refresh = Some(Instant::now());
        let sys = &state.system;

        let total = sys.total_memory();
        if total == 0 {
            bail!("total memory reported as zero");
        }
        let memory_percent = (sys.used_memory() as f64 / total as f64 * 100.0) as f32;

        let cpu_percent = sys.global_cpu_usage();
        if !cpu_percent.is_finite() {
            bail!("cpu usage is not a finite number");
        }

        Ok(Utilization {
            cpu_percent,
            memory_percent,
        })
    }
}
