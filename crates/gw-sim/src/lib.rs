//! `gw-sim` — the simulation driver of the `rust_gw` kernel.
//!
//! This crate ties the layers together: it compiles a fully-resolved
//! [`GameConfig`] into a `World` + `Rules` + blueprints, owns the shared I/O
//! buffers, and runs the strictly-ordered per-step pipeline:
//!
//! 1. events → 2. actions → 3. on-tick handlers → 4. AOEs →
//! 5. collective bookkeeping → 6. observations → 7. rewards → 8. truncation.
//!
//! The step never suspends, takes no caller-visible locks, and swallows all
//! action-level faults into stats and per-agent success flags — `step()`
//! cannot fail on user-supplied action streams.
//!
//! | Module       | Contents                                            |
//! |--------------|-----------------------------------------------------|
//! | [`config`]   | plain-data resolved game config                     |
//! | [`action`]   | action registry, id spaces, movement/attack/vibe    |
//! | [`reward`]   | per-entry delta/per-tick reward engine, role gating |
//! | [`buffers`]  | the six caller-shared buffers                       |
//! | [`builder`]  | init: resolution, placement, compilation, baselines |
//! | [`sim`]      | `Simulation`: the step pipeline and accessors       |
//! | [`observer`] | step-boundary callbacks for external writers        |

pub mod action;
pub mod buffers;
pub mod builder;
pub mod config;
pub mod observer;
pub mod reward;
pub mod sim;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use action::{ActionRegistry, Direction8, CHANGE_VIBE_PREFIX};
pub use buffers::Buffers;
pub use config::{
    ActionConfig, ActionsConfig, AgentConfig, AttackActionConfig, ChangeVibeActionConfig,
    CollectiveConfig, GameConfig, InventoryConfig, LimitSpec, MoveActionConfig, ObjectConfig,
    ObsConfig, RewardSpec,
};
pub use observer::{NoopObserver, SimObserver};
pub use sim::{ObjectSnapshot, Simulation};
