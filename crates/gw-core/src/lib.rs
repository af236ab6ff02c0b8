//! `gw-core` — foundational types for the `rust_gw` grid-world simulation kernel.
//!
//! This crate is a dependency of every other `gw-*` crate.  It intentionally
//! has no `gw-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`ids`]     | `ObjectId`, `AgentId`, `TagId`, `ResourceId`, …           |
//! | [`tick`]    | `Tick` step counter                                       |
//! | [`rng`]     | `SimRng` (seeded, deterministic)                          |
//! | [`threads`] | Observation thread-count parsing (`METTAGRID_OBS_THREADS`)|
//! | [`error`]   | `GwError`, `GwResult`                                     |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                              |
//! |---------|-----------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types. |

pub mod error;
pub mod ids;
pub mod rng;
pub mod threads;
pub mod tick;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{GwError, GwResult};
pub use ids::{
    AgentId, AoeId, CollectiveId, EventId, FeatureId, MultiHandlerId, ObjectId, ResourceId, StatId,
    TagId, TypeId, VibeId,
};
pub use rng::SimRng;
pub use threads::ObsThreads;
pub use tick::Tick;
