//! Call-time context for filter and mutation evaluation.
//!
//! Every handler invocation carries an actor (the object that triggered the
//! bundle — the using agent, the AOE source, or nothing for scheduled events)
//! and a target (the object being acted on).  Blueprints reference the pair
//! through [`EntityRef`], which also reaches through to either side's
//! collective.

use gw_core::{CollectiveId, ObjectId};
use gw_world::World;

/// The `{actor, target}` pair a rule evaluates against.
#[derive(Copy, Clone, Debug)]
pub struct RuleCtx {
    /// The triggering object.  `None` for scheduled events, which have no
    /// game-defined actor.
    pub actor: Option<ObjectId>,
    /// The object being acted on.
    pub target: Option<ObjectId>,
}

impl RuleCtx {
    /// Actor uses target: `actor = user, target = used`.
    pub fn acting(actor: ObjectId, target: ObjectId) -> Self {
        Self {
            actor: Some(actor),
            target: Some(target),
        }
    }

    /// Event context: no actor.
    pub fn event(target: ObjectId) -> Self {
        Self {
            actor: None,
            target: Some(target),
        }
    }

    /// Self-directed context (`on_tick`, tag hooks): the object is both
    /// actor and target.
    pub fn own(obj: ObjectId) -> Self {
        Self {
            actor: Some(obj),
            target: Some(obj),
        }
    }
}

// ── Entity references ─────────────────────────────────────────────────────────

/// Which side of the context a filter checks or a mutation edits.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityRef {
    Actor,
    #[default]
    Target,
    ActorCollective,
    TargetCollective,
}

/// A resolved entity: either an object or a collective pool.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Entity {
    Object(ObjectId),
    Collective(CollectiveId),
}

impl EntityRef {
    /// Resolve against the context.  `None` when the referenced side is
    /// absent (no actor, or the object has no collective) — callers treat
    /// that as a failed filter / skipped mutation rather than an error.
    pub fn resolve(self, world: &World, ctx: RuleCtx) -> Option<Entity> {
        match self {
            EntityRef::Actor => ctx.actor.map(Entity::Object),
            EntityRef::Target => ctx.target.map(Entity::Object),
            EntityRef::ActorCollective => {
                let actor = ctx.actor?;
                world.object(actor).collective.map(Entity::Collective)
            }
            EntityRef::TargetCollective => {
                let target = ctx.target?;
                world.object(target).collective.map(Entity::Collective)
            }
        }
    }

    /// Resolve to an object id, ignoring collective references.
    pub fn resolve_object(self, ctx: RuleCtx) -> Option<ObjectId> {
        match self {
            EntityRef::Actor | EntityRef::ActorCollective => ctx.actor,
            EntityRef::Target | EntityRef::TargetCollective => ctx.target,
        }
    }
}

/// Resource amount held by an entity (object inventory or collective pool).
pub fn entity_resource(world: &World, entity: Entity, resource: gw_core::ResourceId) -> u32 {
    match entity {
        Entity::Object(id) => world.object(id).inventory.get(resource),
        Entity::Collective(id) => world.collectives[id.index()].get(resource),
    }
}
