//! Area-of-effect blueprints and the per-tick AOE runtime.
//!
//! Static AOEs enumerate their affected cells once at registration; mobile
//! AOEs recompute the region from the source's current position each tick.
//! Coverage is Euclidean (`distance ≤ radius`), and the source's own cell is
//! skipped unless `effect_self` is set.
//!
//! Presence deltas are one-time inventory changes on region entry (+delta)
//! and exit (−delta), computed as the set difference between last tick's and
//! this tick's membership — filters do not gate them, only the region does.

use rustc_hash::{FxHashMap, FxHashSet};

use gw_core::{AoeId, GwResult, ObjectId, ResourceId, SimRng};
use gw_world::{DistanceMetric, World};

use crate::ctx::RuleCtx;
use crate::filter::{compile_filters, eval_filters, Filter, FilterSpec};
use crate::handler::Rules;
use crate::mutation::{apply_mutation, Mutation, MutationSpec};
use crate::resolve::ResolveCtx;
use crate::value::StatBaselines;

// ── Specs ─────────────────────────────────────────────────────────────────────

/// Unresolved AOE config.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AoeSpec {
    pub radius: u16,
    /// Pre-register cells at placement (stationary sources).  `false`
    /// re-evaluates each tick for moving sources.
    pub is_static: bool,
    /// Include the source's own cell in the region.
    pub effect_self: bool,
    pub filters: Vec<FilterSpec>,
    pub mutations: Vec<MutationSpec>,
    pub presence_deltas: Vec<(String, i64)>,
}

impl Default for AoeSpec {
    fn default() -> Self {
        Self {
            radius: 1,
            is_static: true,
            effect_self: false,
            filters: Vec::new(),
            mutations: Vec::new(),
            presence_deltas: Vec::new(),
        }
    }
}

impl AoeSpec {
    pub fn compile(&self, resolve: &mut ResolveCtx<'_>) -> GwResult<AoeBlueprint> {
        Ok(AoeBlueprint {
            radius: self.radius,
            is_static: self.is_static,
            effect_self: self.effect_self,
            filters: compile_filters(&self.filters, resolve)?,
            mutations: self
                .mutations
                .iter()
                .map(|m| m.compile(resolve))
                .collect::<GwResult<_>>()?,
            presence_deltas: self
                .presence_deltas
                .iter()
                .map(|(name, d)| Ok((resolve.resource(name)?, *d)))
                .collect::<GwResult<_>>()?,
        })
    }
}

// ── Compiled blueprint ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct AoeBlueprint {
    pub radius: u16,
    pub is_static: bool,
    pub effect_self: bool,
    pub filters: Vec<Filter>,
    pub mutations: Vec<Mutation>,
    pub presence_deltas: Vec<(ResourceId, i64)>,
}

impl AoeBlueprint {
    /// Mutation-free AOEs are territory sources; mutating ones never
    /// contribute influence (see the observation encoder).
    #[inline]
    pub fn is_mutating(&self) -> bool {
        !self.mutations.is_empty()
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// Per-episode AOE state: registered sources, static regions, and last-tick
/// presence sets.
#[derive(Default)]
pub struct AoeSystem {
    /// `(source, aoe)` pairs in registration order — ascending source id,
    /// because sources register at placement time.
    sources: Vec<(ObjectId, AoeId)>,
    static_regions: FxHashMap<(ObjectId, AoeId), Vec<(u16, u16)>>,
    presence: FxHashMap<(ObjectId, AoeId), FxHashSet<ObjectId>>,
}

impl AoeSystem {
    /// Register one AOE on a placed source.  Static blueprints capture their
    /// region here, once.
    pub fn register(&mut self, world: &World, source: ObjectId, aoe: AoeId, bp: &AoeBlueprint) {
        if bp.is_static {
            let obj = world.object(source);
            self.static_regions
                .insert((source, aoe), region_cells(world, obj.row, obj.col, bp));
        }
        self.sources.push((source, aoe));
    }

    /// All registered `(source, aoe)` pairs, for the observation encoder's
    /// territory pass.
    pub fn sources(&self) -> &[(ObjectId, AoeId)] {
        &self.sources
    }

    /// Run one AOE tick: presence enter/exit deltas, then handler dispatch
    /// for every object in range, source-by-source in ascending id order.
    pub fn tick(
        &mut self,
        rules: &Rules,
        world: &mut World,
        baselines: &StatBaselines,
        rng: &mut SimRng,
    ) {
        for &(source, aoe) in &self.sources.clone() {
            let bp = &rules.aoe_blueprints[aoe.index()];

            // Membership this tick, in row-major cell order.  A dead source
            // covers nothing (so presence exits still fire once).
            let members: Vec<ObjectId> = match world.live_object(source) {
                None => Vec::new(),
                Some(obj) => {
                    let cells = if bp.is_static {
                        self.static_regions
                            .get(&(source, aoe))
                            .cloned()
                            .unwrap_or_default()
                    } else {
                        region_cells(world, obj.row, obj.col, bp)
                    };
                    cells
                        .into_iter()
                        .filter_map(|(r, c)| world.at(r, c))
                        .filter(|&id| bp.effect_self || id != source)
                        .collect()
                }
            };

            // ── Presence enter/exit ───────────────────────────────────────
            if !bp.presence_deltas.is_empty() {
                let previous = self.presence.entry((source, aoe)).or_default().clone();
                let current: FxHashSet<ObjectId> = members.iter().copied().collect();
                for &entering in members.iter().filter(|m| !previous.contains(m)) {
                    apply_presence(world, entering, &bp.presence_deltas, 1);
                }
                let mut leavers: Vec<ObjectId> =
                    previous.difference(&current).copied().collect();
                leavers.sort_unstable();
                for leaver in leavers {
                    apply_presence(world, leaver, &bp.presence_deltas, -1);
                }
                self.presence.insert((source, aoe), current);
            }

            // ── Handler dispatch (All mode) ───────────────────────────────
            if bp.mutations.is_empty() {
                continue;
            }
            for target in members {
                if world.live_object(target).is_none() {
                    continue;
                }
                let ctx = RuleCtx::acting(source, target);
                if !eval_filters(&bp.filters, world, ctx, baselines) {
                    continue;
                }
                for mutation in &bp.mutations {
                    apply_mutation(rules, world, mutation, ctx, baselines, rng);
                }
            }
        }
    }
}

/// Cells covered by an AOE centered at `(row, col)`: Euclidean disc,
/// optionally minus the center.
fn region_cells(world: &World, row: u16, col: u16, bp: &AoeBlueprint) -> Vec<(u16, u16)> {
    world
        .cells_within(row, col, bp.radius, DistanceMetric::Euclidean)
        .into_iter()
        .filter(|&(r, c)| bp.effect_self || (r, c) != (row, col))
        .collect()
}

fn apply_presence(world: &mut World, target: ObjectId, deltas: &[(ResourceId, i64)], sign: i64) {
    if world.live_object(target).is_none() {
        return;
    }
    for &(resource, delta) in deltas {
        world
            .object_mut(target)
            .inventory
            .apply_delta(resource, delta * sign);
    }
}
