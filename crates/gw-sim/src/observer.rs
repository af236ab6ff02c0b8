//! Step-boundary observer hooks.

use gw_core::Tick;
use gw_world::World;

/// Callbacks invoked by [`Simulation::step_with`][crate::Simulation::step_with]
/// at step boundaries.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.  Replay writers and progress printers
/// read full snapshots through `on_snapshot` without the kernel knowing any
/// output format.
pub trait SimObserver {
    /// Called before any phase of the step runs.
    fn on_step_start(&mut self, _tick: Tick) {}

    /// Called after the step completes (buffers are fully written).
    fn on_step_end(&mut self, _tick: Tick) {}

    /// Called after the collective-bookkeeping phase with read-only world
    /// access — the stable point for external snapshot readers.
    fn on_snapshot(&mut self, _tick: Tick, _world: &World) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
