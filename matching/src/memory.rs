//! The memory guard: resident-set snapshots between steps, transient
//! cleanup at the soft threshold, coordinated abort at the hard one.

use log::warn;

use crate::config::Memory;
use crate::error::EngineError;
use crate::state::StateStore;

/// Assumed page size for `/proc/self/statm`; right on every mainstream
/// Linux configuration, and the guard degrades to disabled elsewhere.
const PAGE_BYTES: u64 = 4096;

/// What one guard check did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardAction {
    /// Below the soft threshold, or disabled.
    Idle,
    /// Transient buffers were released.
    Relieved,
}

/// Watches resident memory against the configured budget.
pub struct MemoryGuard {
    limit: u64,
    soft: u64,
    hard: u64,
    /// Largest resident set seen so far.
    pub peak_rss: u64,
}

impl MemoryGuard {
    /// Creates a guard; a zero limit disables all checks.
    pub fn new(memory: &Memory) -> Self {
        MemoryGuard {
            limit: memory.limit_bytes,
            soft: (memory.limit_bytes as f64 * memory.soft_frac) as u64,
            hard: (memory.limit_bytes as f64 * memory.hard_frac) as u64,
            peak_rss: 0,
        }
    }

    /// The current resident set size, if the platform exposes it.
    pub fn rss_bytes() -> Option<u64> {
        let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
        let resident: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
        Some(resident * PAGE_BYTES)
    }

    /// Snapshots memory between steps and reacts to the thresholds.
    pub fn check(&mut self, state: &mut StateStore) -> Result<GuardAction, EngineError> {
        if self.limit == 0 {
            return Ok(GuardAction::Idle);
        }
        let rss = match Self::rss_bytes() {
            Some(rss) => rss,
            None => return Ok(GuardAction::Idle),
        };
        if rss > self.peak_rss {
            self.peak_rss = rss;
        }
        if rss >= self.hard {
            return Err(EngineError::BudgetExceeded {
                rss,
                limit: self.hard,
            });
        }
        if rss >= self.soft {
            warn!(
                "resident set {} bytes over soft limit {}, releasing transients",
                rss, self.soft
            );
            state.relieve();
            return Ok(GuardAction::Relieved);
        }
        Ok(GuardAction::Idle)
    }
}
