//! Observation worker-thread count.
//!
//! The count is process-wide state with the lifecycle "parsed at sim init,
//! cached per sim": the `METTAGRID_OBS_THREADS` environment variable is read
//! once when a simulation is constructed, and changing it mid-episode has no
//! effect on that simulation.

use crate::{GwError, GwResult};

/// Environment variable naming the observation worker-thread count.
pub const OBS_THREADS_ENV: &str = "METTAGRID_OBS_THREADS";

/// Resolved observation thread count.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ObsThreads {
    /// Single-threaded reference path (the default).
    Serial,
    /// Fan out across exactly `n` worker threads (`n >= 2`).
    Workers(usize),
}

impl ObsThreads {
    /// Parse a raw setting: a positive integer or `"auto"` (all logical cores).
    ///
    /// `1` maps to [`ObsThreads::Serial`]; so does `auto` on a single-core
    /// host.  Anything else is a [`GwError::ThreadCount`] init error.
    pub fn parse(raw: &str) -> GwResult<ObsThreads> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("auto") {
            let n = std::thread::available_parallelism().map_or(1, |n| n.get());
            return Ok(ObsThreads::from_count(n));
        }
        match trimmed.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(ObsThreads::from_count(n)),
            _ => Err(GwError::ThreadCount(raw.to_string())),
        }
    }

    /// Read and parse the `METTAGRID_OBS_THREADS` environment variable.
    /// Unset means serial.
    pub fn from_env() -> GwResult<ObsThreads> {
        match std::env::var(OBS_THREADS_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Ok(ObsThreads::Serial),
        }
    }

    #[inline]
    fn from_count(n: usize) -> ObsThreads {
        if n <= 1 {
            ObsThreads::Serial
        } else {
            ObsThreads::Workers(n)
        }
    }

    /// Worker count as a plain number (1 for serial).
    #[inline]
    pub fn count(self) -> usize {
        match self {
            ObsThreads::Serial => 1,
            ObsThreads::Workers(n) => n,
        }
    }
}
