//! Analysis configuration.
//!
//! All knobs are explicit values passed through [`AnalysisConfig`]; there is
//! no global mutable state. The configuration can be layered from
//! environment variables for CLI use.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Reachability engine used to answer `ordered(a, b)` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Connectivity {
    /// Chain decomposition with vector clocks over chains. Fastest and the
    /// most memory-compact in practice.
    #[default]
    ChainDecomposition,
    /// Bit-vector transitive closure. `O(N^2 / 8)` memory.
    BitClocks,
    /// Plain breadth-first search on the graph. No precomputation.
    Bfs,
}

impl Connectivity {
    /// Parses the short option form used by the CLI and environment.
    ///
    /// Accepts `CD`, `BVC`, or `BFS` (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CD" => Ok(Self::ChainDecomposition),
            "BVC" => Ok(Self::BitClocks),
            "BFS" => Ok(Self::Bfs),
            other => Err(Error::invalid_config(format!(
                "unknown connectivity algorithm {other:?} (expected CD, BVC or BFS)"
            ))),
        }
    }

    /// The short option name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ChainDecomposition => "CD",
            Self::BitClocks => "BVC",
            Self::Bfs => "BFS",
        }
    }
}

/// Configuration for one analysis run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfig {
    /// Which reachability engine to build for race detection.
    pub connectivity: Connectivity,
    /// Wall-clock budget for race detection. `None` disables the budget.
    pub detection_timeout: Option<Duration>,
}

impl AnalysisConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connectivity engine.
    #[must_use]
    pub const fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Sets the race-detection wall-clock budget in seconds. Zero disables.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.detection_timeout = if seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(seconds))
        };
        self
    }

    /// Layers values from the environment on top of `self`.
    ///
    /// Recognized variables:
    /// - `EVENTRACE_CONNECTIVITY`: `CD` | `BVC` | `BFS`
    /// - `EVENTRACE_TIMEOUT_SECONDS`: non-negative integer, 0 disables
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(v) = std::env::var("EVENTRACE_CONNECTIVITY") {
            self.connectivity = Connectivity::parse(&v)?;
        }
        if let Ok(v) = std::env::var("EVENTRACE_TIMEOUT_SECONDS") {
            let seconds: u64 = v.parse().map_err(|_| {
                Error::invalid_config(format!("EVENTRACE_TIMEOUT_SECONDS={v:?} is not an integer"))
            })?;
            self = self.with_timeout_seconds(seconds);
        }
        Ok(self)
    }

    /// Starts a cooperative deadline for this configuration.
    #[must_use]
    pub fn start_budget(&self) -> TimeBudget {
        TimeBudget::starting_now(self.detection_timeout)
    }
}

/// A cooperative wall-clock deadline.
///
/// Long passes check [`TimeBudget::expired`] at outer-loop boundaries and
/// stop extending output when it trips. The flag is sticky: once expired,
/// it stays expired.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    start: Instant,
    limit: Option<Duration>,
    expired: bool,
}

impl TimeBudget {
    /// Creates a budget starting now. `None` never expires.
    #[must_use]
    pub fn starting_now(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
            expired: false,
        }
    }

    /// An inexhaustible budget.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::starting_now(None)
    }

    /// Checks the deadline, latching the expired flag.
    pub fn expired(&mut self) -> bool {
        if self.expired {
            return true;
        }
        if let Some(limit) = self.limit {
            if self.start.elapsed() > limit {
                self.expired = true;
            }
        }
        self.expired
    }

    /// Whether the budget has ever expired (without re-checking the clock).
    #[must_use]
    pub const fn has_expired(&self) -> bool {
        self.expired
    }
}
