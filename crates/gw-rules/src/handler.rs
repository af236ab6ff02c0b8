//! Handlers, multi-handlers, and the blueprint table (`Rules`).
//!
//! A handler is a filter-gated mutation bundle; a multi-handler is an ordered
//! list of handlers with a dispatch mode.  `FirstMatch` (on-use) applies the
//! first handler whose filters all pass and stops — user-authored order is
//! priority.  `All` (AOE, on-tick, tag hooks) applies every passing handler.
//!
//! `Rules` owns every compiled blueprint; it is built once at init and never
//! mutated during an episode.  Dispatch takes `(&Rules, &mut World)`, so a
//! mutation that adds a tag can re-enter dispatch for the `on_tag_add` bundle
//! without any borrow gymnastics.

use std::collections::BTreeMap;

use gw_core::{GwResult, MultiHandlerId, ObjectId, SimRng};
use gw_world::World;

use crate::aoe::AoeBlueprint;
use crate::ctx::RuleCtx;
use crate::event::Event;
use crate::filter::{compile_filters, eval_filters, Filter, FilterSpec};
use crate::mutation::{apply_mutation, Mutation, MutationSpec};
use crate::query::MaterializedQuery;
use crate::resolve::ResolveCtx;
use crate::value::StatBaselines;

// ── Dispatch mode ─────────────────────────────────────────────────────────────

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchMode {
    /// Stop after the first handler whose filters all pass.
    FirstMatch,
    /// Apply every handler whose filters pass.
    All,
}

// ── Specs ─────────────────────────────────────────────────────────────────────

/// Unresolved handler: named filter-gated mutation bundle.
///
/// Handler maps are carried as ordered `(name, handler)` lists everywhere —
/// config insertion order is the dispatch priority contract and must never
/// pass through a hash map.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandlerSpec {
    pub filters: Vec<FilterSpec>,
    pub mutations: Vec<MutationSpec>,
}

impl HandlerSpec {
    pub fn compile(&self, name: &str, resolve: &mut ResolveCtx<'_>) -> GwResult<Handler> {
        Ok(Handler {
            name: name.to_string(),
            filters: compile_filters(&self.filters, resolve)?,
            mutations: self
                .mutations
                .iter()
                .map(|m| m.compile(resolve))
                .collect::<GwResult<_>>()?,
        })
    }
}

// ── Compiled handlers ─────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Handler {
    pub name: String,
    pub filters: Vec<Filter>,
    pub mutations: Vec<Mutation>,
}

#[derive(Clone, Debug)]
pub struct MultiHandler {
    pub handlers: Vec<Handler>,
    pub mode: DispatchMode,
}

// ── Rules: the blueprint table ────────────────────────────────────────────────

/// Every compiled blueprint in the simulation.  Immutable during an episode.
#[derive(Default)]
pub struct Rules {
    pub multi_handlers: Vec<MultiHandler>,
    pub aoe_blueprints: Vec<AoeBlueprint>,
    pub events: Vec<Event>,
    /// tick → events firing at that tick.
    pub event_schedule: BTreeMap<u32, Vec<gw_core::EventId>>,
    pub materialized: Vec<MaterializedQuery>,
}

impl Rules {
    /// Intern a multi-handler, returning its dense id.
    pub fn add_multi_handler(&mut self, mh: MultiHandler) -> MultiHandlerId {
        let id = MultiHandlerId(self.multi_handlers.len() as u32);
        self.multi_handlers.push(mh);
        id
    }

    #[inline]
    pub fn multi_handler(&self, id: MultiHandlerId) -> &MultiHandler {
        &self.multi_handlers[id.index()]
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

/// Run a multi-handler in its dispatch mode.  Returns `true` if at least one
/// handler fired.
///
/// Mutations within a single handler observe each other's effects; filters
/// are all evaluated before the first mutation of that handler runs.
pub fn run_multi_handler(
    rules: &Rules,
    world: &mut World,
    id: MultiHandlerId,
    ctx: RuleCtx,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) -> bool {
    let mh = rules.multi_handler(id);
    let mut fired = false;
    for handler in &mh.handlers {
        if !eval_filters(&handler.filters, world, ctx, baselines) {
            continue;
        }
        for mutation in &handler.mutations {
            apply_mutation(rules, world, mutation, ctx, baselines, rng);
        }
        fired = true;
        if mh.mode == DispatchMode::FirstMatch {
            break;
        }
    }
    fired
}

/// Fire the object's `on_tag_add` bundle after a tag was newly added.
pub fn dispatch_tag_added(
    rules: &Rules,
    world: &mut World,
    obj: ObjectId,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    if let Some(mh) = world.object(obj).on_tag_add {
        run_multi_handler(rules, world, mh, RuleCtx::own(obj), baselines, rng);
    }
}

/// Fire the object's `on_tag_remove` bundle after a tag was removed.
pub fn dispatch_tag_removed(
    rules: &Rules,
    world: &mut World,
    obj: ObjectId,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    if let Some(mh) = world.object(obj).on_tag_remove {
        run_multi_handler(rules, world, mh, RuleCtx::own(obj), baselines, rng);
    }
}

/// Remove an object, firing `on_tag_remove` dispatch once per tag it carried.
pub fn remove_object_with_hooks(
    rules: &Rules,
    world: &mut World,
    id: ObjectId,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    let removed = world.remove_object(id);
    if removed.is_empty() {
        return;
    }
    if world.object(id).on_tag_remove.is_some() {
        for _tag in removed {
            dispatch_tag_removed(rules, world, id, baselines, rng);
        }
    }
}
