//! Clock abstraction for flowrider engines.

use std::time::{Duration, SystemTime};

/// The interface the engines use to read time.
///
/// # Implementations
///
/// - **Production**: `SystemContext` - wraps `Instant` and the system clock
/// - **Simulation**: `SimContext` (in `flowrider_sim`) - a manually advanced virtual clock
///
/// Sample times are plain `f64` seconds; this trait only supplies them when
/// an observation arrives without one.
pub trait FlowContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    fn seed(&self) -> u64;
}
