//! `gw-rules` — the declarative rule machine of the `rust_gw` kernel.
//!
//! Everything that *changes* simulation state flows through this crate:
//! filter-gated mutation bundles (handlers), per-tick area effects, scheduled
//! events, and the query system that feeds them.  Blueprints are compiled
//! once at init from name-carrying specs into dense-id form; at step time
//! there is no string work and no allocation beyond scratch vectors.
//!
//! # Blueprint / state split
//!
//! [`Rules`] owns every compiled blueprint and is immutable during an
//! episode.  All dispatch functions take `(&Rules, &mut World, …)`, which is
//! what makes re-entrant dispatch (a mutation adds a tag, the tag fires an
//! `on_tag_add` bundle, that bundle mutates again) borrow-checker-clean.
//!
//! | Module       | Contents                                            |
//! |--------------|-----------------------------------------------------|
//! | [`ctx`]      | call-time context and entity references             |
//! | [`resolve`]  | name → dense-id resolution tables used at compile   |
//! | [`value`]    | `GameValue` evaluator + stat baselines              |
//! | [`filter`]   | filter specs, compiled filters, evaluation          |
//! | [`mutation`] | mutation specs, compiled mutations, application     |
//! | [`handler`]  | `Handler`, `MultiHandler`, FirstMatch/All dispatch  |
//! | [`query`]    | queries, closure (BFS) queries, materialization     |
//! | [`aoe`]      | AOE blueprints + per-tick runtime (presence deltas) |
//! | [`event`]    | timestep-scheduled events with fallbacks            |

pub mod aoe;
pub mod ctx;
pub mod event;
pub mod filter;
pub mod handler;
pub mod mutation;
pub mod query;
pub mod resolve;
pub mod value;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use aoe::{AoeBlueprint, AoeSpec, AoeSystem};
pub use ctx::{Entity, EntityRef, RuleCtx};
pub use event::{run_events_for_tick, Event, EventSpec};
pub use filter::{eval_filter, eval_filters, AlignmentCondition, Filter, FilterSpec};
pub use handler::{run_multi_handler, DispatchMode, Handler, HandlerSpec, MultiHandler, Rules};
pub use mutation::{
    apply_mutation, resolve_attack, AlignTo, AttackParams, AttackSpec, Mutation, MutationSpec,
};
pub use query::{
    materialize, recompute, run_query, MaterializedQuery, MaterializedQuerySpec, OrderBy, Query,
    QuerySpec,
};
pub use resolve::ResolveCtx;
pub use value::{GameValue, Scope, StatBaselines, ValueSpec};
