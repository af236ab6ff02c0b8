//! The mutation engine.
//!
//! Every state change in the simulation flows through `apply_mutation`, so
//! limit clamping, tag-index hooks, and stat accounting are enforced in one
//! place.  Mutations never fail: anything that cannot be applied (missing
//! entity, clamped inventory) degrades silently, bumping `inventory.clamped`
//! where a bound cut a request short.

use gw_core::{GwResult, ObjectId, ResourceId, SimRng, TagId, VibeId};
use gw_world::{StatScope, TagSet, World};

use crate::ctx::{Entity, EntityRef, RuleCtx};
use crate::handler::{
    dispatch_tag_added, dispatch_tag_removed, remove_object_with_hooks, Rules,
};
use crate::query::{recompute, run_query, Query, QuerySpec};
use crate::resolve::ResolveCtx;
use crate::value::{ensure_writable, GameValue, Scope, StatBaselines, ValueSpec};

// ── Align target ──────────────────────────────────────────────────────────────

/// What an alignment mutation sets the entity's collective to.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlignTo {
    /// Adopt the actor's collective (no-op if the actor has none).
    ActorCollective,
    /// Clear the entity's collective.
    None,
}

// ── Specs ─────────────────────────────────────────────────────────────────────

/// Unresolved mutation as it appears in config.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MutationSpec {
    /// Signed per-resource deltas, clamped at zero and at limits.
    ResourceDelta {
        entity: EntityRef,
        deltas: Vec<(String, i64)>,
        /// Remove the entity when any listed resource reaches zero after the
        /// deltas are applied (the withdraw-and-deplete pattern).
        remove_when_empty: bool,
    },
    /// Withdraw from `from` (clamped), deposit what was withdrawn into `to`
    /// (clamped; overflow is lost).
    ResourceTransfer {
        from: EntityRef,
        to: EntityRef,
        resources: Vec<(String, u32)>,
        /// Remove the source object when any listed resource reaches zero
        /// after the transfer (the depleting-extractor pattern).
        remove_when_empty: bool,
    },
    Alignment {
        entity: EntityRef,
        align_to: AlignTo,
        /// If set, overrides `align_to` with a specific collective.
        collective: Option<String>,
    },
    /// Set the target agent's freeze counter.
    Freeze { duration: u32 },
    /// Zero every resource of the named limit group on the entity.
    ClearInventory {
        entity: EntityRef,
        limit_group: String,
    },
    /// Accumulate into a stat table.
    Stats {
        stat: String,
        delta: f64,
        scope: Scope,
    },
    AddTag { entity: EntityRef, tag: String },
    RemoveTag { entity: EntityRef, tag: String },
    RemoveTagsWithPrefix { entity: EntityRef, prefix: String },
    /// Apply deltas to every object matched by the query.
    QueryInventory {
        query: QuerySpec,
        deltas: Vec<(String, i64)>,
    },
    /// Write through a game value: add `source` (evaluated) or the static
    /// `delta` to the value's storage.
    SetGameValue {
        value: ValueSpec,
        source: Option<ValueSpec>,
        delta: f64,
        entity: EntityRef,
    },
    /// Re-run the materialized query that owns the named tag.
    RecomputeQueryTag { tag: String },
    /// Run the attack sub-protocol from actor against target.
    Attack(AttackSpec),
}

impl MutationSpec {
    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<Mutation> {
        Ok(match self {
            MutationSpec::ResourceDelta {
                entity,
                deltas,
                remove_when_empty,
            } => Mutation::ResourceDelta {
                entity: *entity,
                deltas: deltas
                    .iter()
                    .map(|(name, d)| Ok((resolve.resource(name)?, *d)))
                    .collect::<GwResult<_>>()?,
                remove_when_empty: *remove_when_empty,
            },

            MutationSpec::ResourceTransfer {
                from,
                to,
                resources,
                remove_when_empty,
            } => Mutation::ResourceTransfer {
                from: *from,
                to: *to,
                resources: resources
                    .iter()
                    .map(|(name, a)| Ok((resolve.resource(name)?, *a)))
                    .collect::<GwResult<_>>()?,
                remove_when_empty: *remove_when_empty,
            },

            MutationSpec::Alignment {
                entity,
                align_to,
                collective,
            } => Mutation::Alignment {
                entity: *entity,
                align_to: *align_to,
                collective: collective
                    .as_deref()
                    .map(|name| resolve.collective(name))
                    .transpose()?,
            },

            MutationSpec::Freeze { duration } => Mutation::Freeze { duration: *duration },

            MutationSpec::ClearInventory { entity, limit_group } => Mutation::ClearInventory {
                entity: *entity,
                resources: resolve.limit_group(limit_group)?,
            },

            MutationSpec::Stats { stat, delta, scope } => Mutation::Stats {
                stat: resolve.stats.intern(stat),
                delta: *delta,
                scope: scope.stat_scope(),
            },

            MutationSpec::AddTag { entity, tag } => Mutation::AddTag {
                entity: *entity,
                tag: resolve.tag(tag)?,
            },

            MutationSpec::RemoveTag { entity, tag } => Mutation::RemoveTag {
                entity: *entity,
                tag: resolve.tag(tag)?,
            },

            MutationSpec::RemoveTagsWithPrefix { entity, prefix } => {
                Mutation::RemoveTagsWithPrefix {
                    entity: *entity,
                    mask: resolve.tag_prefix_mask(prefix),
                }
            }

            MutationSpec::QueryInventory { query, deltas } => Mutation::QueryInventory {
                query: Box::new(query.compile(resolve)?),
                deltas: deltas
                    .iter()
                    .map(|(name, d)| Ok((resolve.resource(name)?, *d)))
                    .collect::<GwResult<_>>()?,
            },

            MutationSpec::SetGameValue {
                value,
                source,
                delta,
                entity,
            } => {
                let value = value.compile(resolve)?;
                ensure_writable(&value)?;
                Mutation::SetGameValue {
                    value,
                    source: source.as_ref().map(|s| s.compile(resolve)).transpose()?,
                    delta: *delta,
                    entity: *entity,
                }
            }

            MutationSpec::RecomputeQueryTag { tag } => Mutation::RecomputeQueryTag {
                tag: resolve.tag(tag)?,
            },

            MutationSpec::Attack(spec) => Mutation::Attack(Box::new(spec.compile(resolve)?)),
        })
    }
}

// ── Attack parameters ─────────────────────────────────────────────────────────

/// Unresolved attack protocol parameters.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttackSpec {
    /// `(resource, weight)` — attacker weapon power per held unit.
    pub weapon_resources: Vec<(String, f64)>,
    /// `(resource, weight)` — defender passive armor per held unit.
    pub armor_resources: Vec<(String, f64)>,
    /// Consumable blockers: one held unit absorbs the attack outright.
    pub defense_resources: Vec<String>,
    pub actor_inv_delta: Vec<(String, i64)>,
    pub target_inv_delta: Vec<(String, i64)>,
    /// Resources fully looted from the defender on success.
    pub loot: Vec<String>,
    /// Freeze duration applied to a defeated agent.
    pub freeze: u32,
    /// Attacker vibes eligible for a bonus.
    pub vibes: Vec<String>,
    /// vibe → extra weapon power.
    pub vibe_bonus: Vec<(String, f64)>,
}

impl AttackSpec {
    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<AttackParams> {
        Ok(AttackParams {
            weapon_resources: self
                .weapon_resources
                .iter()
                .map(|(n, w)| Ok((resolve.resource(n)?, *w)))
                .collect::<GwResult<_>>()?,
            armor_resources: self
                .armor_resources
                .iter()
                .map(|(n, w)| Ok((resolve.resource(n)?, *w)))
                .collect::<GwResult<_>>()?,
            defense_resources: self
                .defense_resources
                .iter()
                .map(|n| resolve.resource(n))
                .collect::<GwResult<_>>()?,
            actor_inv_delta: self
                .actor_inv_delta
                .iter()
                .map(|(n, d)| Ok((resolve.resource(n)?, *d)))
                .collect::<GwResult<_>>()?,
            target_inv_delta: self
                .target_inv_delta
                .iter()
                .map(|(n, d)| Ok((resolve.resource(n)?, *d)))
                .collect::<GwResult<_>>()?,
            loot: self
                .loot
                .iter()
                .map(|n| resolve.resource(n))
                .collect::<GwResult<_>>()?,
            freeze: self.freeze,
            vibes: self
                .vibes
                .iter()
                .map(|n| resolve.vibe(n))
                .collect::<GwResult<_>>()?,
            vibe_bonus: self
                .vibe_bonus
                .iter()
                .map(|(n, b)| Ok((resolve.vibe(n)?, *b)))
                .collect::<GwResult<_>>()?,
        })
    }
}

/// Resolved attack parameters shared by the attack action and the attack
/// mutation.
#[derive(Clone, Debug, Default)]
pub struct AttackParams {
    pub weapon_resources: Vec<(ResourceId, f64)>,
    pub armor_resources: Vec<(ResourceId, f64)>,
    pub defense_resources: Vec<ResourceId>,
    pub actor_inv_delta: Vec<(ResourceId, i64)>,
    pub target_inv_delta: Vec<(ResourceId, i64)>,
    pub loot: Vec<ResourceId>,
    pub freeze: u32,
    pub vibes: Vec<VibeId>,
    pub vibe_bonus: Vec<(VibeId, f64)>,
}

// ── Compiled mutations ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum Mutation {
    ResourceDelta {
        entity: EntityRef,
        deltas: Vec<(ResourceId, i64)>,
        remove_when_empty: bool,
    },
    ResourceTransfer {
        from: EntityRef,
        to: EntityRef,
        resources: Vec<(ResourceId, u32)>,
        remove_when_empty: bool,
    },
    Alignment {
        entity: EntityRef,
        align_to: AlignTo,
        collective: Option<gw_core::CollectiveId>,
    },
    Freeze {
        duration: u32,
    },
    ClearInventory {
        entity: EntityRef,
        resources: Vec<ResourceId>,
    },
    Stats {
        stat: gw_core::StatId,
        delta: f64,
        scope: StatScope,
    },
    AddTag {
        entity: EntityRef,
        tag: TagId,
    },
    RemoveTag {
        entity: EntityRef,
        tag: TagId,
    },
    RemoveTagsWithPrefix {
        entity: EntityRef,
        mask: TagSet,
    },
    QueryInventory {
        query: Box<Query>,
        deltas: Vec<(ResourceId, i64)>,
    },
    SetGameValue {
        value: GameValue,
        source: Option<GameValue>,
        delta: f64,
        entity: EntityRef,
    },
    RecomputeQueryTag {
        tag: TagId,
    },
    Attack(Box<AttackParams>),
}

// ── Application ───────────────────────────────────────────────────────────────

/// Signed inventory edit on an object or a collective pool, with clamp
/// accounting.
fn entity_delta(world: &mut World, entity: Entity, resource: ResourceId, delta: i64) -> i64 {
    let outcome = match entity {
        Entity::Object(id) => world.object_mut(id).inventory.apply_delta(resource, delta),
        Entity::Collective(id) => world.collectives[id.index()]
            .inventory
            .apply_delta(resource, delta),
    };
    if outcome.clamped {
        world.stats.bump_game("inventory.clamped", 1.0);
    }
    outcome.applied
}

/// Apply one mutation in context.  Never fails; unresolvable references are
/// silent no-ops.
pub fn apply_mutation(
    rules: &Rules,
    world: &mut World,
    mutation: &Mutation,
    ctx: RuleCtx,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    match mutation {
        Mutation::ResourceDelta {
            entity,
            deltas,
            remove_when_empty,
        } => {
            let Some(resolved) = entity.resolve(world, ctx) else {
                return;
            };
            for &(resource, delta) in deltas {
                entity_delta(world, resolved, resource, delta);
            }
            if *remove_when_empty {
                if let Entity::Object(id) = resolved {
                    let depleted = deltas
                        .iter()
                        .any(|&(r, _)| world.object(id).inventory.get(r) == 0);
                    if depleted {
                        remove_object_with_hooks(rules, world, id, baselines, rng);
                    }
                }
            }
        }

        Mutation::ResourceTransfer {
            from,
            to,
            resources,
            remove_when_empty,
        } => {
            let (Some(src), Some(dst)) = (from.resolve(world, ctx), to.resolve(world, ctx)) else {
                return;
            };
            for &(resource, amount) in resources {
                let withdrawn = -entity_delta(world, src, resource, -(amount as i64));
                if withdrawn > 0 {
                    entity_delta(world, dst, resource, withdrawn);
                }
            }
            if *remove_when_empty {
                if let Entity::Object(id) = src {
                    let depleted = resources
                        .iter()
                        .any(|&(r, _)| world.object(id).inventory.get(r) == 0);
                    if depleted {
                        remove_object_with_hooks(rules, world, id, baselines, rng);
                    }
                }
            }
        }

        Mutation::Alignment {
            entity,
            align_to,
            collective,
        } => {
            let Some(obj) = entity.resolve_object(ctx) else {
                return;
            };
            let new = if let Some(c) = collective {
                Some(*c)
            } else {
                match align_to {
                    AlignTo::ActorCollective => match ctx.actor {
                        Some(actor) => world.object(actor).collective,
                        None => return,
                    },
                    AlignTo::None => None,
                }
            };
            world.object_mut(obj).collective = new;
        }

        Mutation::Freeze { duration } => {
            let Some(target) = ctx.target else { return };
            if let Some(agent) = world.object_mut(target).agent.as_mut() {
                agent.freeze_remaining = *duration;
            }
        }

        Mutation::ClearInventory { entity, resources } => {
            match entity.resolve(world, ctx) {
                Some(Entity::Object(id)) => {
                    world.object_mut(id).inventory.clear(resources);
                }
                Some(Entity::Collective(id)) => {
                    world.collectives[id.index()].clear(resources);
                }
                None => {}
            }
        }

        Mutation::Stats { stat, delta, scope } => match scope {
            StatScope::Game => world.stats.add_game(*stat, *delta as f32),
            StatScope::Agent => {
                // The context agent: the target if it is one, else the actor.
                let agent = [ctx.target, ctx.actor]
                    .into_iter()
                    .flatten()
                    .find_map(|id| world.object(id).agent.as_ref().map(|a| a.agent_id));
                if let Some(agent) = agent {
                    world.stats.add_agent(agent, *stat, *delta as f32);
                }
            }
            StatScope::Collective => {
                let collective = [ctx.target, ctx.actor]
                    .into_iter()
                    .flatten()
                    .find_map(|id| world.object(id).collective);
                if let Some(c) = collective {
                    world.stats.add_collective(c, *stat, *delta as f32);
                }
            }
        },

        Mutation::AddTag { entity, tag } => {
            let Some(obj) = entity.resolve_object(ctx) else {
                return;
            };
            if world.add_tag_raw(obj, *tag) {
                dispatch_tag_added(rules, world, obj, baselines, rng);
            }
        }

        Mutation::RemoveTag { entity, tag } => {
            let Some(obj) = entity.resolve_object(ctx) else {
                return;
            };
            if world.remove_tag_raw(obj, *tag) {
                dispatch_tag_removed(rules, world, obj, baselines, rng);
            }
        }

        Mutation::RemoveTagsWithPrefix { entity, mask } => {
            let Some(obj) = entity.resolve_object(ctx) else {
                return;
            };
            let carried = world.object(obj).tags.and(mask);
            for tag in carried.iter() {
                if world.remove_tag_raw(obj, tag) {
                    dispatch_tag_removed(rules, world, obj, baselines, rng);
                }
            }
        }

        Mutation::QueryInventory { query, deltas } => {
            let matches = run_query(world, query, baselines, Some(rng));
            for id in matches {
                for &(resource, delta) in deltas {
                    entity_delta(world, Entity::Object(id), resource, delta);
                }
            }
        }

        Mutation::SetGameValue {
            value,
            source,
            delta,
            entity,
        } => {
            let subject = entity.resolve_object(ctx);
            let d = match source {
                Some(src) => src.eval(world, subject, baselines),
                None => *delta,
            };
            apply_game_value_delta(world, value, subject, d);
        }

        Mutation::RecomputeQueryTag { tag } => {
            if let Some(mq) = rules.materialized.iter().find(|m| m.tag == *tag) {
                let mq = mq.clone();
                recompute(rules, world, &mq, baselines, rng);
            }
        }

        Mutation::Attack(params) => {
            let (Some(attacker), Some(defender)) = (ctx.actor, ctx.target) else {
                return;
            };
            resolve_attack(world, attacker, defender, params);
        }
    }
}

/// Write `d` through a game value's storage.
fn apply_game_value_delta(world: &mut World, value: &GameValue, subject: Option<ObjectId>, d: f64) {
    match value {
        GameValue::Inventory { item, scope } => {
            let delta = d.round() as i64;
            if delta == 0 {
                return;
            }
            let entity = match scope {
                Scope::Collective => subject
                    .and_then(|id| world.object(id).collective)
                    .map(Entity::Collective),
                // Game-scoped inventory has no single owner; fall through to
                // the subject object, matching the agent-scoped write.
                Scope::Agent | Scope::Game => subject.map(Entity::Object),
            };
            if let Some(entity) = entity {
                entity_delta(world, entity, *item, delta);
            }
        }
        GameValue::Stat { stat, scope, .. } => match scope {
            Scope::Game => world.stats.add_game(*stat, d as f32),
            Scope::Agent => {
                let agent = subject.and_then(|id| world.object(id).agent.as_ref().map(|a| a.agent_id));
                if let Some(agent) = agent {
                    world.stats.add_agent(agent, *stat, d as f32);
                }
            }
            Scope::Collective => {
                let collective = subject.and_then(|id| world.object(id).collective);
                if let Some(c) = collective {
                    world.stats.add_collective(c, *stat, d as f32);
                }
            }
        },
        // Rejected at compile time by `ensure_writable`.
        GameValue::Const(_) | GameValue::NumObjects(_) | GameValue::TagCount(_) => {}
    }
}

// ── Attack protocol ───────────────────────────────────────────────────────────

/// Run the attack sub-protocol.  Returns `true` on a landed attack.
///
/// Order: consumable defense check, then weapon-vs-armor comparison, then the
/// success outcome (inventory deltas, loot, freeze) — all through the same
/// clamped-edit path as every other mutation.
pub fn resolve_attack(
    world: &mut World,
    attacker: ObjectId,
    defender: ObjectId,
    params: &AttackParams,
) -> bool {
    // Consumable block: one held unit of the lowest-id defense resource
    // absorbs the attack.
    for &defense in &params.defense_resources {
        if world.object(defender).inventory.get(defense) > 0 {
            world
                .object_mut(defender)
                .inventory
                .apply_delta(defense, -1);
            world.stats.bump_game("attack.blocked", 1.0);
            return false;
        }
    }

    let weapon = {
        let inv = &world.object(attacker).inventory;
        let mut power: f64 = params
            .weapon_resources
            .iter()
            .map(|&(r, w)| inv.get(r) as f64 * w)
            .sum();
        let vibe = world.object(attacker).vibe;
        if params.vibes.contains(&vibe) {
            power += params
                .vibe_bonus
                .iter()
                .find(|&&(v, _)| v == vibe)
                .map(|&(_, b)| b)
                .unwrap_or(0.0);
        }
        power
    };

    let armor = {
        let inv = &world.object(defender).inventory;
        params
            .armor_resources
            .iter()
            .map(|&(r, w)| inv.get(r) as f64 * w)
            .sum::<f64>()
    };

    if weapon <= armor {
        world.stats.bump_game("attack.blocked", 1.0);
        return false;
    }

    for &(resource, delta) in &params.actor_inv_delta {
        entity_delta(world, Entity::Object(attacker), resource, delta);
    }
    for &(resource, delta) in &params.target_inv_delta {
        entity_delta(world, Entity::Object(defender), resource, delta);
    }
    for &resource in &params.loot {
        let held = world.object(defender).inventory.get(resource);
        if held > 0 {
            let withdrawn =
                -entity_delta(world, Entity::Object(defender), resource, -(held as i64));
            entity_delta(world, Entity::Object(attacker), resource, withdrawn);
        }
    }
    if params.freeze > 0 {
        if let Some(agent) = world.object_mut(defender).agent.as_mut() {
            agent.freeze_remaining = params.freeze;
        }
    }
    true
}
