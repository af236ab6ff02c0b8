//! Typed game-value expressions.
//!
//! A `GameValue` is evaluated against `(world, subject)` and produces a
//! float.  The same expression type backs rewards, game-value filters,
//! observation values, and set-game-value mutations, so all four see
//! identical semantics.
//!
//! Delta-flagged stat values subtract a baseline captured once at simulation
//! init: state that existed before the first step contributes zero.

use rustc_hash::FxHashMap;

use gw_core::{AgentId, CollectiveId, GwError, GwResult, ObjectId, ResourceId, StatId, TagId, TypeId};
use gw_world::{StatScope, World};

use crate::resolve::ResolveCtx;

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Which instance an inventory/stat expression reads.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Scope {
    /// The subject object (an agent or any other carrier).
    #[default]
    Agent,
    /// The subject's collective pool.
    Collective,
    /// The whole game (summed inventory / the game stat table).
    Game,
}

impl Scope {
    pub(crate) fn stat_scope(self) -> StatScope {
        match self {
            Scope::Agent => StatScope::Agent,
            Scope::Collective => StatScope::Collective,
            Scope::Game => StatScope::Game,
        }
    }
}

// ── Specs (name-carrying, pre-resolution) ─────────────────────────────────────

/// Unresolved game-value expression as it appears in config.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueSpec {
    Const(f64),
    Inventory { item: String, scope: Scope },
    Stat { name: String, scope: Scope, delta: bool },
    NumObjects { type_name: String },
    TagCount { tag: String },
}

impl ValueSpec {
    /// Convenience constructors mirroring the config helpers.
    pub fn inventory(item: &str) -> Self {
        ValueSpec::Inventory {
            item: item.to_string(),
            scope: Scope::Agent,
        }
    }

    pub fn stat(name: &str) -> Self {
        ValueSpec::Stat {
            name: name.to_string(),
            scope: Scope::Agent,
            delta: false,
        }
    }

    pub fn game_stat(name: &str, delta: bool) -> Self {
        ValueSpec::Stat {
            name: name.to_string(),
            scope: Scope::Game,
            delta,
        }
    }

    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<GameValue> {
        Ok(match self {
            ValueSpec::Const(v) => GameValue::Const(*v),
            ValueSpec::Inventory { item, scope } => GameValue::Inventory {
                item: resolve.resource(item)?,
                scope: *scope,
            },
            ValueSpec::Stat { name, scope, delta } => GameValue::Stat {
                stat: resolve.stats.intern(name),
                scope: *scope,
                delta: *delta,
            },
            ValueSpec::NumObjects { type_name } => GameValue::NumObjects(resolve.type_id(type_name)?),
            ValueSpec::TagCount { tag } => GameValue::TagCount(resolve.tag(tag)?),
        })
    }
}

// ── Compiled values ───────────────────────────────────────────────────────────

/// Resolved game-value expression; all names are dense ids.
#[derive(Clone, Debug, PartialEq)]
pub enum GameValue {
    Const(f64),
    Inventory { item: ResourceId, scope: Scope },
    Stat { stat: StatId, scope: Scope, delta: bool },
    NumObjects(TypeId),
    TagCount(TagId),
}

impl GameValue {
    /// `true` if evaluation needs the init-time stat baseline table.
    pub fn needs_baseline(&self) -> bool {
        matches!(self, GameValue::Stat { delta: true, .. })
    }

    /// Evaluate against `subject` (the context object the value is scoped
    /// to; `None` only makes sense for `Const`/`NumObjects`/`TagCount` and
    /// `Game`-scoped reads).
    pub fn eval(
        &self,
        world: &World,
        subject: Option<ObjectId>,
        baselines: &StatBaselines,
    ) -> f64 {
        match self {
            GameValue::Const(v) => *v,

            GameValue::Inventory { item, scope } => match scope {
                Scope::Agent => subject
                    .map(|id| world.object(id).inventory.get(*item) as f64)
                    .unwrap_or(0.0),
                Scope::Collective => subject
                    .and_then(|id| world.object(id).collective)
                    .map(|c| world.collectives[c.index()].get(*item) as f64)
                    .unwrap_or(0.0),
                Scope::Game => world.game_inventory_total(*item) as f64,
            },

            GameValue::Stat { stat, scope, delta } => {
                let current = match scope {
                    Scope::Game => world.stats.game(*stat) as f64,
                    Scope::Agent => subject
                        .and_then(|id| world.object(id).agent.as_ref().map(|a| a.agent_id))
                        .map(|a| world.stats.agent(a, *stat) as f64)
                        .unwrap_or(0.0),
                    Scope::Collective => subject
                        .and_then(|id| world.object(id).collective)
                        .map(|c| world.stats.collective(c, *stat) as f64)
                        .unwrap_or(0.0),
                };
                if *delta {
                    current - baselines.baseline(world, *stat, *scope, subject)
                } else {
                    current
                }
            }

            GameValue::NumObjects(type_id) => world.count_of_type(*type_id) as f64,

            GameValue::TagCount(tag) => world.tag_index.count(*tag) as f64,
        }
    }
}

// ── Stat baselines ────────────────────────────────────────────────────────────

/// Init-time snapshot of every stat referenced by a delta-flagged value.
///
/// Captured after the world is fully built (objects placed, materialized
/// queries run, initial deposits made) and never updated afterwards.
#[derive(Default)]
pub struct StatBaselines {
    game: FxHashMap<StatId, f64>,
    agent: FxHashMap<(AgentId, StatId), f64>,
    collective: FxHashMap<(CollectiveId, StatId), f64>,
}

impl StatBaselines {
    /// Snapshot `stat` at its current value for every instance of `scope`.
    pub fn capture(&mut self, world: &World, stat: StatId, scope: Scope) {
        match scope {
            Scope::Game => {
                self.game.insert(stat, world.stats.game(stat) as f64);
            }
            Scope::Agent => {
                for i in 0..world.num_agents() {
                    let agent = AgentId(i as u32);
                    self.agent
                        .insert((agent, stat), world.stats.agent(agent, stat) as f64);
                }
            }
            Scope::Collective => {
                for i in 0..world.collectives.len() {
                    let c = CollectiveId(i as u16);
                    self.collective
                        .insert((c, stat), world.stats.collective(c, stat) as f64);
                }
            }
        }
    }

    fn baseline(
        &self,
        world: &World,
        stat: StatId,
        scope: Scope,
        subject: Option<ObjectId>,
    ) -> f64 {
        match scope {
            Scope::Game => self.game.get(&stat).copied().unwrap_or(0.0),
            Scope::Agent => subject
                .and_then(|id| world.object(id).agent.as_ref().map(|a| a.agent_id))
                .and_then(|a| self.agent.get(&(a, stat)).copied())
                .unwrap_or(0.0),
            Scope::Collective => subject
                .and_then(|id| world.object(id).collective)
                .and_then(|c| self.collective.get(&(c, stat)).copied())
                .unwrap_or(0.0),
        }
    }
}

/// Compile a list of value specs, capturing no baselines yet (the builder
/// snapshots after init).  Shared helper for rewards and obs values.
pub fn compile_values(specs: &[ValueSpec], resolve: &mut ResolveCtx<'_>) -> GwResult<Vec<GameValue>> {
    specs.iter().map(|s| s.compile(resolve)).collect()
}

/// Guard helper: reject a value kind that cannot be written through
/// (set-game-value targets must be inventory or stat expressions).
pub fn ensure_writable(value: &GameValue) -> GwResult<()> {
    match value {
        GameValue::Inventory { .. } | GameValue::Stat { .. } => Ok(()),
        other => Err(GwError::Config(format!(
            "set-game-value target must be an inventory or stat expression, got {other:?}"
        ))),
    }
}
