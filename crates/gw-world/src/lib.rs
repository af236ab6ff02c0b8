//! `gw-world` — mutable simulation state for the `rust_gw` kernel.
//!
//! Everything the rule machine edits lives here: the cell map, the object
//! arena, the tag index, per-object and per-collective inventories, and the
//! three stat tables.  Rule *blueprints* (filters, mutations, handlers,
//! events) live in `gw-rules` and operate on `&mut World`, which keeps the
//! immutable-blueprint / mutable-state split that makes re-entrant handler
//! dispatch borrow-checker-clean.
//!
//! | Module         | Contents                                     |
//! |----------------|----------------------------------------------|
//! | [`object`]     | `GridObject`, `AgentState`                   |
//! | [`tags`]       | `TagSet` bitset, `TagIndex`                  |
//! | [`inventory`]  | `Inventory`, limit groups with modifiers     |
//! | [`collective`] | shared resource pools                        |
//! | [`stats`]      | interned stat names + game/agent/collective tables |
//! | [`world`]      | `World`: cell map, arena, neighborhood queries |

pub mod collective;
pub mod inventory;
pub mod object;
pub mod stats;
pub mod tags;
pub mod world;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use collective::Collective;
pub use inventory::{Inventory, InventoryLimits, LimitGroup};
pub use object::{AgentState, Facing, GridObject};
pub use stats::{StatScope, Stats};
pub use tags::{TagIndex, TagSet};
pub use world::{DistanceMetric, PlaceError, World};
