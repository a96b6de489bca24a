//! Engine configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default lookahead for conflict search: one year.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 365;

/// Default overlap comparison granularity: whole minutes.
pub const DEFAULT_OVERLAP_RESOLUTION_SECS: i64 = 60;

/// Tunables passed explicitly to operations that scan ahead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Horizon, in days from the candidate's start, for overlap search and
    /// other bulk scans.
    pub lookahead_days: i64,
    /// Granularity, in seconds, at which occurrence instants are compared
    /// for overlap. Instants are truncated down to this step first; an
    /// occurrence that would truncate to zero length is compared exactly.
    pub overlap_resolution_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            overlap_resolution_secs: DEFAULT_OVERLAP_RESOLUTION_SECS,
        }
    }
}

impl EngineConfig {
    pub fn lookahead(&self) -> Duration {
        Duration::days(self.lookahead_days.max(1))
    }

    pub fn overlap_resolution(&self) -> Duration {
        Duration::seconds(self.overlap_resolution_secs.max(1))
    }
}
