//! The filter engine.
//!
//! Filters are pure predicates over the call-time context; evaluation never
//! touches mutable state.  Multi-resource specs keep AND semantics through
//! negation and disjunction exactly as the config model defines them:
//!
//! - `Not(resource{a, b})` compiles to a single `Neg([a, b])` — the negation
//!   of the AND block, so it passes when the target lacks *any* listed
//!   resource.
//! - A multi-resource filter inside `Or` compiles to `Neg([Neg([a, b])])` —
//!   double negation keeps the inner AND intact inside the disjunction.

use gw_core::{GwResult, ResourceId, TagId, VibeId};
use gw_world::{TagSet, World};

use crate::ctx::{entity_resource, Entity, EntityRef, RuleCtx};
use crate::query::{run_query, Query, QuerySpec};
use crate::resolve::ResolveCtx;
use crate::value::{GameValue, StatBaselines, ValueSpec};

// ── Alignment conditions ──────────────────────────────────────────────────────

/// Collective-membership relations a filter can require.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlignmentCondition {
    /// Entity belongs to any collective.
    Aligned,
    /// Entity belongs to none.
    Unaligned,
    /// Entity shares the actor's collective.
    SameCollective,
    /// Entity and actor are both aligned, to different collectives.
    DifferentCollective,
    /// Entity is unaligned OR aligned to a different collective.
    NotSameCollective,
}

// ── Specs (name-carrying, pre-resolution) ─────────────────────────────────────

/// Unresolved filter as it appears in config.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterSpec {
    Alignment {
        entity: EntityRef,
        condition: AlignmentCondition,
        /// If set, membership in this specific collective is required and
        /// `condition` is ignored.
        collective: Option<String>,
    },
    /// AND over every listed `(resource, min)` pair.
    Resource {
        entity: EntityRef,
        resources: Vec<(String, u32)>,
    },
    Vibe {
        entity: EntityRef,
        vibe: String,
    },
    Tag {
        entity: EntityRef,
        tag: String,
    },
    /// Entity carries any tag whose name starts with `prefix`.
    TagPrefix {
        entity: EntityRef,
        prefix: String,
    },
    /// Actor and target share at least one tag with the prefix.
    SharedTagPrefix { prefix: String },
    /// An object carrying `target_tag` (and passing `filters`) exists within
    /// Chebyshev `radius` of the entity.
    Near {
        entity: EntityRef,
        radius: u16,
        target_tag: String,
        filters: Vec<FilterSpec>,
    },
    /// An object matching `query` exists within Chebyshev `radius`.
    MaxDistance {
        entity: EntityRef,
        query: QuerySpec,
        radius: u16,
    },
    GameValue {
        entity: EntityRef,
        value: ValueSpec,
        min: f64,
    },
    Not(Box<FilterSpec>),
    Or(Vec<FilterSpec>),
}

impl FilterSpec {
    /// Compile into zero or more conjunct filters.  Multi-resource specs
    /// expand into one compiled filter per resource (AND semantics at the
    /// handler level).
    pub fn compile_into(&self, resolve: &mut ResolveCtx<'_>, out: &mut Vec<Filter>) -> GwResult<()> {
        match self {
            FilterSpec::Alignment {
                entity,
                condition,
                collective,
            } => {
                let collective = collective
                    .as_deref()
                    .map(|name| resolve.collective(name))
                    .transpose()?;
                out.push(Filter::Alignment {
                    entity: *entity,
                    condition: *condition,
                    collective,
                });
            }

            FilterSpec::Resource { entity, resources } => {
                for (name, min) in resources {
                    out.push(Filter::Resource {
                        entity: *entity,
                        resource: resolve.resource(name)?,
                        min: *min,
                    });
                }
            }

            FilterSpec::Vibe { entity, vibe } => out.push(Filter::Vibe {
                entity: *entity,
                vibe: resolve.vibe(vibe)?,
            }),

            FilterSpec::Tag { entity, tag } => out.push(Filter::Tag {
                entity: *entity,
                tag: resolve.tag(tag)?,
            }),

            FilterSpec::TagPrefix { entity, prefix } => out.push(Filter::TagPrefix {
                entity: *entity,
                mask: resolve.tag_prefix_mask(prefix),
            }),

            FilterSpec::SharedTagPrefix { prefix } => out.push(Filter::SharedTagPrefix {
                mask: resolve.tag_prefix_mask(prefix),
            }),

            FilterSpec::Near {
                entity,
                radius,
                target_tag,
                filters,
            } => {
                let mut inner = Vec::new();
                for f in filters {
                    f.compile_into(resolve, &mut inner)?;
                }
                out.push(Filter::Near {
                    entity: *entity,
                    radius: *radius,
                    tag: resolve.tag(target_tag)?,
                    filters: inner,
                });
            }

            FilterSpec::MaxDistance {
                entity,
                query,
                radius,
            } => out.push(Filter::MaxDistance {
                entity: *entity,
                query: Box::new(query.compile(resolve)?),
                radius: *radius,
            }),

            FilterSpec::GameValue { entity, value, min } => out.push(Filter::GameValue {
                entity: *entity,
                value: value.compile(resolve)?,
                threshold: *min,
            }),

            // NOT(inner): the inner spec may expand to several conjuncts
            // (multi-resource AND); a single Neg wraps the whole block.
            FilterSpec::Not(inner) => {
                let mut block = Vec::new();
                inner.compile_into(resolve, &mut block)?;
                out.push(Filter::Neg(block));
            }

            FilterSpec::Or(inners) => {
                let mut arms = Vec::new();
                for inner in inners {
                    let mut block = Vec::new();
                    inner.compile_into(resolve, &mut block)?;
                    if block.len() == 1 {
                        arms.push(block.pop().unwrap());
                    } else {
                        // Multi-conjunct arm: double negation preserves the
                        // AND inside the disjunction.
                        arms.push(Filter::Neg(vec![Filter::Neg(block)]));
                    }
                }
                out.push(Filter::Or(arms));
            }
        }
        Ok(())
    }
}

/// Compile a spec list into a compiled conjunct list.
pub fn compile_filters(specs: &[FilterSpec], resolve: &mut ResolveCtx<'_>) -> GwResult<Vec<Filter>> {
    let mut out = Vec::new();
    for spec in specs {
        spec.compile_into(resolve, &mut out)?;
    }
    Ok(out)
}

// ── Compiled filters ──────────────────────────────────────────────────────────

/// Resolved filter; evaluation is string-free and allocation-free except for
/// nested query execution.
#[derive(Clone, Debug)]
pub enum Filter {
    Alignment {
        entity: EntityRef,
        condition: AlignmentCondition,
        collective: Option<gw_core::CollectiveId>,
    },
    Resource {
        entity: EntityRef,
        resource: ResourceId,
        min: u32,
    },
    Vibe {
        entity: EntityRef,
        vibe: VibeId,
    },
    Tag {
        entity: EntityRef,
        tag: TagId,
    },
    TagPrefix {
        entity: EntityRef,
        mask: TagSet,
    },
    SharedTagPrefix {
        mask: TagSet,
    },
    Near {
        entity: EntityRef,
        radius: u16,
        tag: TagId,
        filters: Vec<Filter>,
    },
    MaxDistance {
        entity: EntityRef,
        query: Box<Query>,
        radius: u16,
    },
    GameValue {
        entity: EntityRef,
        value: GameValue,
        threshold: f64,
    },
    /// Negated conjunction: passes iff NOT every inner filter passes.
    Neg(Vec<Filter>),
    /// Disjunction: passes iff any inner filter passes.
    Or(Vec<Filter>),
}

/// `true` iff every filter in `filters` passes (the handler gate).
pub fn eval_filters(
    filters: &[Filter],
    world: &World,
    ctx: RuleCtx,
    baselines: &StatBaselines,
) -> bool {
    filters.iter().all(|f| eval_filter(f, world, ctx, baselines))
}

/// Evaluate one filter.  Side-effect-free by construction.
pub fn eval_filter(filter: &Filter, world: &World, ctx: RuleCtx, baselines: &StatBaselines) -> bool {
    match filter {
        Filter::Alignment {
            entity,
            condition,
            collective,
        } => {
            let Some(obj) = entity.resolve_object(ctx) else {
                return false;
            };
            let subject = world.object(obj).collective;
            if let Some(required) = collective {
                return subject == Some(*required);
            }
            let actor_collective = ctx.actor.and_then(|a| world.object(a).collective);
            match condition {
                AlignmentCondition::Aligned => subject.is_some(),
                AlignmentCondition::Unaligned => subject.is_none(),
                AlignmentCondition::SameCollective => {
                    subject.is_some() && subject == actor_collective
                }
                AlignmentCondition::DifferentCollective => matches!(
                    (subject, actor_collective),
                    (Some(a), Some(b)) if a != b
                ),
                AlignmentCondition::NotSameCollective => {
                    !(subject.is_some() && subject == actor_collective)
                }
            }
        }

        Filter::Resource {
            entity,
            resource,
            min,
        } => match entity.resolve(world, ctx) {
            Some(e) => entity_resource(world, e, *resource) >= *min,
            None => false,
        },

        Filter::Vibe { entity, vibe } => entity
            .resolve_object(ctx)
            .map(|id| world.object(id).vibe == *vibe)
            .unwrap_or(false),

        Filter::Tag { entity, tag } => entity
            .resolve_object(ctx)
            .map(|id| world.object(id).has_tag(*tag))
            .unwrap_or(false),

        Filter::TagPrefix { entity, mask } => entity
            .resolve_object(ctx)
            .map(|id| world.object(id).tags.intersects(mask))
            .unwrap_or(false),

        Filter::SharedTagPrefix { mask } => {
            let (Some(actor), Some(target)) = (ctx.actor, ctx.target) else {
                return false;
            };
            let shared = world
                .object(actor)
                .tags
                .and(&world.object(target).tags);
            shared.intersects(mask)
        }

        Filter::Near {
            entity,
            radius,
            tag,
            filters,
        } => {
            let Some(anchor) = entity.resolve_object(ctx) else {
                return false;
            };
            let anchor = world.object(anchor);
            // Tag index gives the candidate set; the distance check prunes.
            world.tag_index.objects(*tag).iter().any(|&cand| {
                let Some(obj) = world.live_object(cand) else {
                    return false;
                };
                anchor.chebyshev_to(obj) <= *radius
                    && eval_filters(
                        filters,
                        world,
                        RuleCtx {
                            actor: ctx.actor,
                            target: Some(cand),
                        },
                        baselines,
                    )
            })
        }

        Filter::MaxDistance {
            entity,
            query,
            radius,
        } => {
            let Some(anchor) = entity.resolve_object(ctx) else {
                return false;
            };
            let anchor = world.object(anchor);
            run_query(world, query, baselines, None)
                .iter()
                .any(|&id| anchor.chebyshev_to(world.object(id)) <= *radius)
        }

        Filter::GameValue {
            entity,
            value,
            threshold,
        } => {
            let subject = entity.resolve_object(ctx);
            value.eval(world, subject, baselines) >= *threshold
        }

        Filter::Neg(block) => !block.iter().all(|f| eval_filter(f, world, ctx, baselines)),

        Filter::Or(arms) => arms.iter().any(|f| eval_filter(f, world, ctx, baselines)),
    }
}
