//! Territory ownership from overlapping non-mutating AOEs.
//!
//! Influence of one source on a cell is `radius − euclidean_distance`,
//! counted only while strictly positive — a cell exactly on the cardinal
//! radius boundary has zero influence and is outside coverage.  Influences
//! from sources of the same collective sum; the collective with strictly the
//! greatest total owns the cell.
//!
//! The two observation layers reading this field break exact ties
//! differently (load-bearing for replay compatibility; do not generalize):
//! the `territory` layer resolves a two-way tie for the non-`clips` side
//! when exactly one of the tied collectives is the canonical `clips`
//! collective, while the `aoe_mask` layer leaves every tie neutral.

use gw_core::CollectiveId;
use gw_rules::{AoeSystem, Rules};
use gw_world::World;

const TIE_EPS: f64 = 1e-9;

/// How an exact influence tie between collectives resolves.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TieBreak {
    /// Two-way tie against the canonical `clips` collective goes to the
    /// other side; every other tie is neutral.  (The `territory` layer.)
    NonClipsWins,
    /// Every tie is neutral.  (The `aoe_mask` layer.)
    Neutral,
}

/// One influence source: a live, aligned object with a mutation-free AOE.
#[derive(Copy, Clone, Debug)]
struct Source {
    collective: CollectiveId,
    row: u16,
    col: u16,
    radius: u16,
}

/// Per-tick snapshot of every territory source, queried per window cell.
pub struct TerritoryField {
    sources: Vec<Source>,
    clips: Option<CollectiveId>,
}

impl TerritoryField {
    /// Collect territory sources for this tick.  Mutating AOEs and sources
    /// without a collective contribute nothing.
    pub fn build(world: &World, rules: &Rules, aoes: &AoeSystem) -> TerritoryField {
        let mut sources = Vec::new();
        for &(source_id, aoe_id) in aoes.sources() {
            let bp = &rules.aoe_blueprints[aoe_id.index()];
            if bp.is_mutating() {
                continue;
            }
            let Some(obj) = world.live_object(source_id) else {
                continue;
            };
            let Some(collective) = obj.collective else {
                continue;
            };
            sources.push(Source {
                collective,
                row: obj.row,
                col: obj.col,
                radius: bp.radius,
            });
        }
        let clips = world
            .collectives
            .iter()
            .position(|c| c.name == "clips")
            .map(|i| CollectiveId(i as u16));
        TerritoryField { sources, clips }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The collective owning `(row, col)` under the given tie rule, if any.
    pub fn owner_at(&self, row: u16, col: u16, tie: TieBreak) -> Option<CollectiveId> {
        // Tiny per-cell accumulator; the collective count is single-digit in
        // practice, so a flat vec beats a hash map.
        let mut influence: Vec<(CollectiveId, f64)> = Vec::new();
        for source in &self.sources {
            let dr = source.row as f64 - row as f64;
            let dc = source.col as f64 - col as f64;
            let w = source.radius as f64 - (dr * dr + dc * dc).sqrt();
            if w <= TIE_EPS {
                continue;
            }
            match influence.iter_mut().find(|(c, _)| *c == source.collective) {
                Some((_, total)) => *total += w,
                None => influence.push((source.collective, w)),
            }
        }

        let (best, best_influence) = influence
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        let tied: Vec<CollectiveId> = influence
            .iter()
            .filter(|(_, w)| (w - best_influence).abs() <= TIE_EPS)
            .map(|(c, _)| *c)
            .collect();

        match tied.as_slice() {
            [_] => Some(best),
            [a, b] if tie == TieBreak::NonClipsWins => match self.clips {
                Some(clips) if *a == clips && *b != clips => Some(*b),
                Some(clips) if *b == clips && *a != clips => Some(*a),
                _ => None,
            },
            _ => None,
        }
    }
}
