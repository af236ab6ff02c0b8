//! The query system: tag-sourced selectors, closure (reachability) queries,
//! and init-time materialization.
//!
//! A query enumerates candidates from the tag index (insertion order —
//! deterministic), applies filters, optionally reorders, and truncates to
//! `max_items`.  `ClosureQuery` floods from the source set through the
//! candidate set using a per-hop distance cap and per-hop edge filters; the
//! closure includes the sources themselves.
//!
//! `MaterializedQuery` runs once at init and stamps every match with a named
//! tag, so runtime membership tests are a single bitset probe.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use gw_core::{GwResult, ObjectId, SimRng, TagId};
use gw_world::World;

use crate::ctx::RuleCtx;
use crate::filter::{compile_filters, eval_filters, Filter, FilterSpec};
use crate::handler::{dispatch_tag_added, Rules};
use crate::resolve::ResolveCtx;
use crate::value::StatBaselines;

// ── Order ─────────────────────────────────────────────────────────────────────

/// Result ordering before `max_items` truncation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrderBy {
    /// Tag-index insertion order (the deterministic default).
    #[default]
    First,
    /// Reverse insertion order.
    Last,
    /// Seeded shuffle.  Falls back to insertion order in contexts that have
    /// no RNG (filter-existence checks, where order cannot matter).
    Random,
}

// ── Specs ─────────────────────────────────────────────────────────────────────

/// Unresolved query.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuerySpec {
    pub source: QuerySourceSpec,
    pub filters: Vec<FilterSpec>,
    /// `None` or `Some(0)` = unlimited.
    pub max_items: Option<usize>,
    pub order_by: OrderBy,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QuerySourceSpec {
    /// All objects carrying the named tag.
    Tag(String),
    /// The result of another query.
    Nested(Box<QuerySpec>),
    /// Flood from `source` through `candidates` using `edge_filters`; a
    /// `MaxDistance` among the edge filters sets the hop-distance cap
    /// (default 1; 0 = unlimited).
    Closure {
        source: Box<QuerySpec>,
        candidates: Box<QuerySpec>,
        edge_filters: Vec<FilterSpec>,
    },
}

impl QuerySpec {
    /// Select by tag with no filters and no limit.
    pub fn tag(name: &str) -> Self {
        Self {
            source: QuerySourceSpec::Tag(name.to_string()),
            filters: Vec::new(),
            max_items: None,
            order_by: OrderBy::First,
        }
    }

    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<Query> {
        let source = match &self.source {
            QuerySourceSpec::Tag(name) => QuerySource::Tag(resolve.tag(name)?),
            QuerySourceSpec::Nested(inner) => QuerySource::Nested(Box::new(inner.compile(resolve)?)),
            QuerySourceSpec::Closure {
                source,
                candidates,
                edge_filters,
            } => {
                // A MaxDistance edge filter is the hop cap, not a predicate.
                let mut hop_radius = 1u16;
                let mut predicate_specs = Vec::new();
                for f in edge_filters {
                    if let FilterSpec::MaxDistance { radius, .. } = f {
                        hop_radius = *radius;
                    } else {
                        predicate_specs.push(f.clone());
                    }
                }
                QuerySource::Closure(ClosureQuery {
                    source: Box::new(source.compile(resolve)?),
                    candidates: Box::new(candidates.compile(resolve)?),
                    edge_filters: compile_filters(&predicate_specs, resolve)?,
                    hop_radius,
                })
            }
        };
        let max_items = match self.max_items {
            None | Some(0) => None,
            Some(n) => Some(n),
        };
        Ok(Query {
            source,
            filters: compile_filters(&self.filters, resolve)?,
            max_items,
            order_by: self.order_by,
        })
    }
}

// ── Compiled queries ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Query {
    pub source: QuerySource,
    pub filters: Vec<Filter>,
    pub max_items: Option<usize>,
    pub order_by: OrderBy,
}

#[derive(Clone, Debug)]
pub enum QuerySource {
    Tag(TagId),
    Nested(Box<Query>),
    Closure(ClosureQuery),
}

#[derive(Clone, Debug)]
pub struct ClosureQuery {
    pub source: Box<Query>,
    pub candidates: Box<Query>,
    pub edge_filters: Vec<Filter>,
    /// Chebyshev hop cap; 0 = unlimited.
    pub hop_radius: u16,
}

/// Run a query.  `rng` is only consulted for `order_by: Random`; passing
/// `None` (filter-existence contexts) degrades to insertion order.
pub fn run_query(
    world: &World,
    query: &Query,
    baselines: &StatBaselines,
    mut rng: Option<&mut SimRng>,
) -> Vec<ObjectId> {
    let mut items: Vec<ObjectId> = match &query.source {
        QuerySource::Tag(tag) => world.tag_index.objects(*tag).to_vec(),
        QuerySource::Nested(inner) => run_query(world, inner, baselines, rng.as_deref_mut()),
        QuerySource::Closure(closure) => run_closure(world, closure, baselines, rng.as_deref_mut()),
    };

    items.retain(|&id| {
        world.live_object(id).is_some()
            && eval_filters(&query.filters, world, RuleCtx::event(id), baselines)
    });

    match query.order_by {
        OrderBy::First => {}
        OrderBy::Last => items.reverse(),
        OrderBy::Random => {
            if let Some(rng) = rng {
                rng.shuffle(&mut items);
            }
        }
    }

    if let Some(max) = query.max_items {
        items.truncate(max);
    }
    items
}

/// Breadth-first flood from the source set through the candidate set.
///
/// FIFO expansion keeps discovery order nearest-first (by hop count), which
/// `max_items` truncation and `first`/`last` ordering rely on.
fn run_closure(
    world: &World,
    closure: &ClosureQuery,
    baselines: &StatBaselines,
    mut rng: Option<&mut SimRng>,
) -> Vec<ObjectId> {
    let sources = run_query(world, &closure.source, baselines, rng.as_deref_mut());
    let candidates = run_query(world, &closure.candidates, baselines, rng.as_deref_mut());

    let mut visited: FxHashSet<ObjectId> = sources.iter().copied().collect();
    let mut result = sources.clone();
    let mut frontier: VecDeque<ObjectId> = sources.into();

    while let Some(from) = frontier.pop_front() {
        let from_obj = world.object(from);
        for &cand in &candidates {
            if visited.contains(&cand) {
                continue;
            }
            let cand_obj = world.object(cand);
            if closure.hop_radius > 0 && from_obj.chebyshev_to(cand_obj) > closure.hop_radius {
                continue;
            }
            let edge_ctx = RuleCtx {
                actor: Some(from),
                target: Some(cand),
            };
            if !eval_filters(&closure.edge_filters, world, edge_ctx, baselines) {
                continue;
            }
            visited.insert(cand);
            result.push(cand);
            frontier.push_back(cand);
        }
    }
    result
}

// ── Materialized queries ──────────────────────────────────────────────────────

/// Unresolved materialized query.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterializedQuerySpec {
    /// Tag stamped onto every match.
    pub tag: String,
    pub query: QuerySpec,
}

/// Compiled materialized query.
#[derive(Clone, Debug)]
pub struct MaterializedQuery {
    pub tag: TagId,
    pub query: Query,
}

impl MaterializedQuerySpec {
    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<MaterializedQuery> {
        Ok(MaterializedQuery {
            tag: resolve.tag(&self.tag)?,
            query: self.query.compile(resolve)?,
        })
    }
}

/// Run a materialized query and stamp matches.  Tag hooks fire normally.
pub fn materialize(
    rules: &Rules,
    world: &mut World,
    mq: &MaterializedQuery,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    let matches = run_query(world, &mq.query, baselines, Some(rng));
    for id in matches {
        if world.add_tag_raw(id, mq.tag) {
            dispatch_tag_added(rules, world, id, baselines, rng);
        }
    }
}

/// Clear the materialized tag everywhere and re-run the query.
pub fn recompute(
    rules: &Rules,
    world: &mut World,
    mq: &MaterializedQuery,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    let holders: Vec<ObjectId> = world.tag_index.objects(mq.tag).to_vec();
    for id in holders {
        if world.remove_tag_raw(id, mq.tag) {
            crate::handler::dispatch_tag_removed(rules, world, id, baselines, rng);
        }
    }
    materialize(rules, world, mq, baselines, rng);
}
