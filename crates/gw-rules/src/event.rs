//! Timestep-scheduled events.
//!
//! An event fires at each listed timestep: candidates come from the tag
//! index (insertion order), filters prune them (context: no actor), and up
//! to `max_targets` of the passing set receive the mutations.  If *nothing*
//! passed and a fallback is named, the fallback event fires once in the same
//! tick.

use std::collections::BTreeMap;

use gw_core::{EventId, GwError, GwResult, ObjectId, SimRng};
use gw_world::World;

use crate::ctx::RuleCtx;
use crate::filter::{compile_filters, eval_filters, Filter, FilterSpec};
use crate::handler::Rules;
use crate::mutation::{apply_mutation, Mutation, MutationSpec};
use crate::resolve::ResolveCtx;
use crate::value::StatBaselines;

// ── Specs ─────────────────────────────────────────────────────────────────────

/// Unresolved event config.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventSpec {
    pub name: String,
    pub timesteps: Vec<u32>,
    /// Candidates are enumerated through the tag index by this tag.
    pub target_tag: String,
    pub filters: Vec<FilterSpec>,
    pub mutations: Vec<MutationSpec>,
    /// `None` = unlimited.  `Some(0)` is accepted as unlimited too (two
    /// spellings coexist in the wild); a warning notes the `0` form.
    pub max_targets: Option<usize>,
    /// Event fired once when zero candidates pass the filters.
    pub fallback: Option<String>,
}

/// Compile an ordered event list, resolving fallback names in a second pass.
pub fn compile_events(
    specs: &[EventSpec],
    resolve: &mut ResolveCtx<'_>,
) -> GwResult<(Vec<Event>, BTreeMap<u32, Vec<EventId>>)> {
    let mut ids: rustc_hash::FxHashMap<&str, EventId> = rustc_hash::FxHashMap::default();
    for (i, spec) in specs.iter().enumerate() {
        ids.insert(spec.name.as_str(), EventId(i as u32));
    }

    let mut events = Vec::with_capacity(specs.len());
    let mut schedule: BTreeMap<u32, Vec<EventId>> = BTreeMap::new();
    for (i, spec) in specs.iter().enumerate() {
        let id = EventId(i as u32);
        let max_targets = match spec.max_targets {
            Some(0) => {
                log::warn!(
                    "event '{}': max_targets=0 treated as unlimited (prefer leaving it unset)",
                    spec.name
                );
                None
            }
            other => other,
        };
        let fallback = spec
            .fallback
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| {
                ids.get(name)
                    .copied()
                    .ok_or_else(|| GwError::UnknownEvent(name.to_string()))
            })
            .transpose()?;

        for &t in &spec.timesteps {
            schedule.entry(t).or_default().push(id);
        }
        events.push(Event {
            name: spec.name.clone(),
            target_tag: resolve.tag(&spec.target_tag)?,
            filters: compile_filters(&spec.filters, resolve)?,
            mutations: spec
                .mutations
                .iter()
                .map(|m| m.compile(resolve))
                .collect::<GwResult<_>>()?,
            max_targets,
            fallback,
        });
    }
    Ok((events, schedule))
}

// ── Compiled events ───────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Event {
    pub name: String,
    pub target_tag: gw_core::TagId,
    pub filters: Vec<Filter>,
    pub mutations: Vec<Mutation>,
    /// `None` = unlimited.
    pub max_targets: Option<usize>,
    pub fallback: Option<EventId>,
}

// ── Firing ────────────────────────────────────────────────────────────────────

/// Fire every event scheduled for `tick`.
pub fn run_events_for_tick(
    rules: &Rules,
    world: &mut World,
    tick: u32,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) {
    let Some(scheduled) = rules.event_schedule.get(&tick) else {
        return;
    };
    for &id in scheduled {
        let mut visited = vec![false; rules.events.len()];
        visited[id.index()] = true;
        fire_event(rules, world, id, baselines, rng, &mut visited);
    }
}

fn fire_event(
    rules: &Rules,
    world: &mut World,
    id: EventId,
    baselines: &StatBaselines,
    rng: &mut SimRng,
    visited: &mut [bool],
) {
    let event = &rules.events[id.index()];

    let candidates: Vec<ObjectId> = world.tag_index.objects(event.target_tag).to_vec();
    let passing: Vec<ObjectId> = candidates
        .into_iter()
        .filter(|&cand| {
            world.live_object(cand).is_some()
                && eval_filters(&event.filters, world, RuleCtx::event(cand), baselines)
        })
        .collect();

    let selected: &[ObjectId] = match event.max_targets {
        None => &passing,
        Some(n) => &passing[..passing.len().min(n)],
    };

    for &target in selected {
        for mutation in &event.mutations {
            apply_mutation(rules, world, mutation, RuleCtx::event(target), baselines, rng);
        }
    }

    // The fallback keys off "nothing passed", not "nothing selected".
    if passing.is_empty() {
        if let Some(fallback) = event.fallback {
            if !visited[fallback.index()] {
                visited[fallback.index()] = true;
                fire_event(rules, world, fallback, baselines, rng, visited);
            }
        }
    }
}
