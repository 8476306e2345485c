//! Time and memory budget checks.
//!
//! Both thresholds are evaluated at every item boundary of the processing
//! loop; either one tripping halts the current pass. Both determinations
//! are override points (see [`Hooks`](super::hooks::Hooks)), so a
//! deployment can substitute its own logic or disable a check entirely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::hooks::Hooks;

/// Fraction of the memory ceiling at which the memory budget trips.
pub const MEMORY_FRACTION: f64 = 0.9;

/// Ceiling assumed when no limit can be discovered.
const DEFAULT_CEILING_BYTES: u64 = 128 * 1024 * 1024;

/// Sentinel ceiling used when the environment reports no limit.
const UNLIMITED_SENTINEL_BYTES: u64 = 32_000 * 1024 * 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Budget Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot of the budget state, passed to override hooks.
#[derive(Debug, Clone, Default)]
pub struct BudgetStatus {
    /// Time since the lock was acquired
    pub elapsed: Duration,
    /// Configured wall-clock limit
    pub time_limit: Duration,
    /// Current resident memory usage
    pub resident_bytes: u64,
    /// Usable memory ceiling
    pub memory_ceiling_bytes: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Budget Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-invocation budget guard.
///
/// `start_time` is the moment the process lock was acquired; the time
/// budget counts from there, not from when the first item starts.
pub struct BudgetGuard {
    start_time: Instant,
    time_limit: Duration,
    memory_ceiling_bytes: u64,
    hooks: Arc<Hooks>,
}

impl BudgetGuard {
    /// Create a guard for an invocation that started at `start_time`.
    pub fn new(start_time: Instant, time_limit: Duration, hooks: Arc<Hooks>) -> Self {
        let time_limit = hooks.apply_time_limit(time_limit);
        Self {
            start_time,
            time_limit,
            memory_ceiling_bytes: discover_memory_ceiling(),
            hooks,
        }
    }

    /// Snapshot the current budget state.
    pub fn status(&self) -> BudgetStatus {
        BudgetStatus {
            elapsed: self.start_time.elapsed(),
            time_limit: self.time_limit,
            resident_bytes: resident_memory_bytes(),
            memory_ceiling_bytes: self.memory_ceiling_bytes,
        }
    }

    /// Whether the wall-clock budget is exhausted.
    pub fn time_exceeded(&self) -> bool {
        let status = self.status();
        let default = status.elapsed >= status.time_limit;
        self.hooks.apply_time_exceeded(default, &status)
    }

    /// Whether resident memory has reached 90% of the usable ceiling.
    pub fn memory_exceeded(&self) -> bool {
        let status = self.status();
        let threshold = (status.memory_ceiling_bytes as f64 * MEMORY_FRACTION) as u64;
        let default = status.resident_bytes >= threshold;
        self.hooks.apply_memory_exceeded(default, &status)
    }

    /// Whether either threshold has tripped.
    pub fn exhausted(&self) -> bool {
        self.time_exceeded() || self.memory_exceeded()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Environment Probes
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a cgroup memory limit value.
///
/// Returns the sentinel for "max"/unlimited values and `None` for
/// unreadable ones.
fn parse_cgroup_limit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "max" {
        return Some(UNLIMITED_SENTINEL_BYTES);
    }
    let bytes: u64 = raw.parse().ok()?;
    // cgroup v1 reports "no limit" as a page-rounded i64::MAX
    if bytes >= i64::MAX as u64 / 2 {
        Some(UNLIMITED_SENTINEL_BYTES)
    } else {
        Some(bytes)
    }
}

/// Discover the usable memory ceiling from the cgroup limits.
#[cfg(target_os = "linux")]
fn discover_memory_ceiling() -> u64 {
    for path in [
        "/sys/fs/cgroup/memory.max",
        "/sys/fs/cgroup/memory/memory.limit_in_bytes",
    ] {
        if let Ok(raw) = std::fs::read_to_string(path) {
            if let Some(bytes) = parse_cgroup_limit(&raw) {
                return bytes;
            }
        }
    }
    DEFAULT_CEILING_BYTES
}

#[cfg(not(target_os = "linux"))]
fn discover_memory_ceiling() -> u64 {
    DEFAULT_CEILING_BYTES
}

/// Current resident set size of this process.
#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> u64 {
    let Ok(statm) = std::fs::read_to_string("/proc/self/statm") else {
        return 0;
    };
    let Some(resident_pages) = statm
        .split_whitespace()
        .nth(1)
        .and_then(|field| field.parse::<u64>().ok())
    else {
        return 0;
    };

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return 0;
    }
    resident_pages * page_size as u64
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> u64 {
    0
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
