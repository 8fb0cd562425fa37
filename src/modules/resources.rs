//! Host resource probe for chunked processing.
//!
//! A chunk-processing request compares the process RSS against a fraction of the
//! detected memory limit (cgroup limit when present, otherwise total memory) and its
//! own elapsed time against a soft budget. When either is exceeded the task is paused
//! and the client retries later.

use std::time::{Duration, Instant};

use sysinfo::{ProcessesToUpdate, System};

use crate::core::config::ProcessingConfig;

/// Below this memory limit the host is treated as constrained.
pub const LOW_RESOURCE_THRESHOLD: u64 = 256 * 1024 * 1024;
pub const LOW_RESOURCE_CHUNK_SIZE: usize = 512 * 1024;
pub const LOW_RESOURCE_MEMORY_FRACTION: f64 = 0.5;
pub const LOW_RESOURCE_TIME_BUDGET: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ResourceProfile {
    pub memory_limit_bytes: u64,
    pub low_resource: bool,
    pub memory_fraction: f64,
    pub time_budget: Duration,
}

impl ResourceProfile {
    /// Probe the host once.
    pub fn detect(config: &ProcessingConfig) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let limit = sys
            .cgroup_limits()
            .map(|c| c.total_memory)
            .filter(|&m| m > 0)
            .unwrap_or_else(|| sys.total_memory());

        let profile = Self::from_limit(limit, config);
        tracing::info!(
            "Resource profile: memory_limit={}MiB low_resource={} fraction={} budget={:?}",
            profile.memory_limit_bytes / (1024 * 1024),
            profile.low_resource,
            profile.memory_fraction,
            profile.time_budget
        );
        profile
    }

    pub fn from_limit(memory_limit_bytes: u64, config: &ProcessingConfig) -> Self {
        // A zero limit means detection failed; do not treat that as constrained.
        let low_resource = memory_limit_bytes > 0 && memory_limit_bytes < LOW_RESOURCE_THRESHOLD;
        if low_resource {
            Self {
                memory_limit_bytes,
                low_resource,
                memory_fraction: config.memory_fraction.min(LOW_RESOURCE_MEMORY_FRACTION),
                time_budget: config.batch_time_budget.min(LOW_RESOURCE_TIME_BUDGET),
            }
        } else {
            Self {
                memory_limit_bytes,
                low_resource,
                memory_fraction: config.memory_fraction,
                time_budget: config.batch_time_budget,
            }
        }
    }

    /// Chunk size to use for new tasks given the configured one.
    pub fn effective_chunk_size(&self, configured: usize) -> usize {
        if self.low_resource {
            configured.min(LOW_RESOURCE_CHUNK_SIZE)
        } else {
            configured
        }
    }

    pub fn memory_ceiling(&self) -> u64 {
        (self.memory_limit_bytes as f64 * self.memory_fraction) as u64
    }
}

/// Per-request watchdog started when a chunk call begins.
pub struct ResourceGuard {
    profile: ResourceProfile,
    started: Instant,
}

impl ResourceGuard {
    pub fn start(profile: ResourceProfile) -> Self {
        Self {
            profile,
            started: Instant::now(),
        }
    }

    pub fn is_low_resource(&self) -> bool {
        self.profile.low_resource
    }

    /// Check current RSS and elapsed time against the profile.
    pub fn should_pause(&self) -> bool {
        self.exceeds(current_rss(), self.started.elapsed())
    }

    pub fn exceeds(&self, rss_bytes: u64, elapsed: Duration) -> bool {
        if elapsed >= self.profile.time_budget {
            return true;
        }
        self.profile.memory_limit_bytes > 0 && rss_bytes > self.profile.memory_ceiling()
    }
}

fn current_rss() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    sys.process(pid).map(|p| p.memory()).unwrap_or(0)
}
