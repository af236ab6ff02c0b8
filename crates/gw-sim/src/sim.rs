//! The `Simulation`: shared buffers plus the strictly-ordered step pipeline.
//!
//! Within one step the phases run in this fixed order, each completing
//! before the next begins:
//!
//! 1. `events` — scheduled firings for the current tick.
//! 2. `actions` — per agent in ascending id: the non-vibe action, then the
//!    vibe action.
//! 3. `on_tick` — All-mode bundles, ascending object id.
//! 4. `aoe` — static + mobile sources, ascending object id, presence deltas
//!    against last tick's membership.
//! 5. `collectives` — pool snapshots into the collective stat tables.
//! 6. `observations` — per-agent token streams (may fan out over threads).
//! 7. `rewards` — per-agent reward entries into the shared buffer.
//! 8. `truncation` — horizon check.
//!
//! Step-time faults (occupied cells, missing resources, invalid ids) are
//! swallowed into stats and `last_action_success`; `step()` cannot fail.

use gw_core::{AgentId, GwResult, ObjectId, SimRng, Tick};
use gw_obs::{FeatureTable, ObsEncoder};
use gw_rules::{
    resolve_attack, run_events_for_tick, run_multi_handler, AoeSystem, RuleCtx, Rules,
    StatBaselines,
};
use gw_world::{Facing, World};

use crate::action::{ActionDef, ActionKind, ActionRegistry, CHANGE_VIBE_PREFIX};
use crate::buffers::Buffers;
use crate::builder::{build, Built};
use crate::config::GameConfig;
use crate::observer::{NoopObserver, SimObserver};
use crate::reward::RewardEngine;

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct Simulation {
    config: GameConfig,
    world: World,
    rules: Rules,
    aoes: AoeSystem,
    baselines: StatBaselines,
    registry: ActionRegistry,
    rewards: RewardEngine,
    encoder: ObsEncoder,
    rng: SimRng,
    buffers: Buffers,
    tick: Tick,
}

impl Simulation {
    /// Build all tables, place the map, run materialized queries and static
    /// AOE registration, snapshot reward baselines, and bind the buffers.
    ///
    /// The initial observations are computed here so callers see a valid
    /// frame before the first `step()`.
    pub fn new(config: GameConfig, seed: u64, buffers: Buffers) -> GwResult<Simulation> {
        buffers.validate(config.num_agents, config.obs.num_tokens)?;
        let Built {
            world,
            rules,
            aoes,
            baselines,
            registry,
            rewards,
            encoder,
            rng,
        } = build(&config, seed)?;

        let mut sim = Simulation {
            config,
            world,
            rules,
            aoes,
            baselines,
            registry,
            rewards,
            encoder,
            rng,
            buffers,
            tick: Tick::ZERO,
        };
        sim.write_observations();
        sim.write_masks();
        Ok(sim)
    }

    /// Rebuild the episode in place with a fresh seed.  Buffer bindings are
    /// kept; outputs are zeroed.
    pub fn reset(&mut self, seed: u64) -> GwResult<()> {
        let Built {
            world,
            rules,
            aoes,
            baselines,
            registry,
            rewards,
            encoder,
            rng,
        } = build(&self.config, seed)?;
        self.world = world;
        self.rules = rules;
        self.aoes = aoes;
        self.baselines = baselines;
        self.registry = registry;
        self.rewards = rewards;
        self.encoder = encoder;
        self.rng = rng;
        self.tick = Tick::ZERO;
        self.buffers.rewards.fill(0.0);
        self.buffers.terminals.fill(false);
        self.buffers.truncations.fill(false);
        self.write_observations();
        self.write_masks();
        Ok(())
    }

    /// Advance one tick.
    pub fn step(&mut self) {
        self.step_with(&mut NoopObserver);
    }

    /// Advance one tick with observer callbacks at the step boundaries.
    pub fn step_with<O: SimObserver>(&mut self, observer: &mut O) {
        observer.on_step_start(self.tick);
        let now = self.tick.0;

        // ── Phase 1: events ───────────────────────────────────────────────
        run_events_for_tick(&self.rules, &mut self.world, now, &self.baselines, &mut self.rng);

        // ── Phase 2: actions, ascending agent id ──────────────────────────
        for i in 0..self.world.num_agents() {
            resolve_agent_actions(
                AgentId(i as u32),
                &mut self.world,
                &self.rules,
                &self.registry,
                &self.baselines,
                &mut self.rng,
                &self.buffers.actions,
                &self.buffers.vibe_actions,
            );
        }

        // ── Phase 3: on-tick bundles, ascending object id ─────────────────
        for id in self.world.live_object_ids() {
            let Some(obj) = self.world.live_object(id) else {
                continue;
            };
            if let Some(mh) = obj.on_tick {
                run_multi_handler(
                    &self.rules,
                    &mut self.world,
                    mh,
                    RuleCtx::own(id),
                    &self.baselines,
                    &mut self.rng,
                );
            }
        }

        // ── Phase 4: AOEs ─────────────────────────────────────────────────
        self.aoes
            .tick(&self.rules, &mut self.world, &self.baselines, &mut self.rng);

        // ── Phase 5: collective bookkeeping ───────────────────────────────
        self.snapshot_collectives();
        observer.on_snapshot(self.tick, &self.world);

        // ── Phase 6: observations ─────────────────────────────────────────
        self.write_observations();

        // ── Phase 7: rewards, terminals, masks ────────────────────────────
        for i in 0..self.world.num_agents() {
            let agent = AgentId(i as u32);
            let obj_id = self.world.agent_object_id(agent);
            let alive = self.world.live_object(obj_id).is_some();
            let reward =
                self.rewards
                    .tick_agent(&self.world, &self.baselines, agent, alive.then_some(obj_id));
            self.buffers.rewards[i] = reward;
            self.buffers.terminals[i] = !alive;
            self.buffers.masks[i] = alive;
            if alive {
                let state = self.world.object_mut(obj_id).agent.as_mut().expect("agent object");
                state.last_reward = reward;
                state.episode_reward += reward;
            }
        }

        // ── Phase 8: truncation ───────────────────────────────────────────
        let truncated = self.config.max_steps > 0 && now + 1 >= self.config.max_steps;
        self.buffers.truncations.fill(truncated);

        // Freeze counters run down at end of tick.
        for i in 0..self.world.num_agents() {
            let obj_id = self.world.agent_object_id(AgentId(i as u32));
            if let Some(obj) = self.world.live_object(obj_id) {
                if obj.agent.as_ref().is_some_and(|a| a.freeze_remaining > 0) {
                    let state = self.world.object_mut(obj_id).agent.as_mut().expect("agent object");
                    state.freeze_remaining -= 1;
                }
            }
        }

        self.tick.advance();
        observer.on_step_end(self.tick);
    }

    // ── Output phases ─────────────────────────────────────────────────────

    fn write_observations(&mut self) {
        self.encoder.encode_all(
            &self.world,
            &self.rules,
            &self.aoes,
            &self.baselines,
            self.tick.0,
            self.config.max_steps,
            &mut self.buffers.observations,
        );
    }

    fn write_masks(&mut self) {
        for i in 0..self.world.num_agents() {
            let obj_id = self.world.agent_object_id(AgentId(i as u32));
            self.buffers.masks[i] = self.world.live_object(obj_id).is_some();
        }
    }

    /// Mirror every pool into its collective stat table so observers and
    /// stat-backed values read a consistent per-tick snapshot.
    fn snapshot_collectives(&mut self) {
        for ci in 0..self.world.collectives.len() {
            let amounts: Vec<(String, u32)> = self.world.collectives[ci]
                .inventory
                .iter_nonzero()
                .map(|(r, amount)| {
                    (format!("inventory.{}", self.world.resource_names()[r.index()]), amount)
                })
                .collect();
            for (stat_name, amount) in amounts {
                let stat = self.world.stats.intern(&stat_name);
                self.world
                    .stats
                    .set_collective(gw_core::CollectiveId(ci as u16), stat, amount as f32);
            }
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn num_agents(&self) -> usize {
        self.world.num_agents()
    }

    pub fn current_step(&self) -> Tick {
        self.tick
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut Buffers {
        &mut self.buffers
    }

    pub fn observations(&self) -> &[u8] {
        &self.buffers.observations
    }

    /// One agent's token bytes.
    pub fn agent_observation(&self, agent: AgentId) -> &[u8] {
        let stride = self.encoder.stride();
        &self.buffers.observations[agent.index() * stride..(agent.index() + 1) * stride]
    }

    pub fn rewards(&self) -> &[f32] {
        &self.buffers.rewards
    }

    pub fn terminals(&self) -> &[bool] {
        &self.buffers.terminals
    }

    pub fn truncations(&self) -> &[bool] {
        &self.buffers.truncations
    }

    pub fn masks(&self) -> &[bool] {
        &self.buffers.masks
    }

    pub fn features(&self) -> &FeatureTable {
        self.encoder.features()
    }

    pub fn non_vibe_action_names(&self) -> Vec<&str> {
        self.registry.non_vibe_names()
    }

    pub fn vibe_action_names(&self) -> Vec<&str> {
        self.registry.vibe_names()
    }

    /// Route an action by name into the right buffer for `agent` —
    /// `change_vibe_*` names go to the vibe space, the rest to the non-vibe
    /// space.
    pub fn set_action(&mut self, agent: AgentId, name: &str) -> GwResult<()> {
        if name.starts_with(CHANGE_VIBE_PREFIX) {
            let id = self.registry.vibe_id(name).ok_or_else(|| {
                gw_core::GwError::Config(format!("unknown vibe action '{name}'"))
            })?;
            self.buffers.vibe_actions[agent.index()] = id as i32;
        } else {
            let id = self.registry.non_vibe_id(name).ok_or_else(|| {
                gw_core::GwError::Config(format!("unknown action '{name}'"))
            })?;
            self.buffers.actions[agent.index()] = id as i32;
        }
        Ok(())
    }

    pub fn episode_reward(&self, agent: AgentId) -> f32 {
        self.world
            .agent_object(agent)
            .agent
            .as_ref()
            .map(|a| a.episode_reward)
            .unwrap_or(0.0)
    }

    pub fn agent_position(&self, agent: AgentId) -> (u16, u16) {
        let obj = self.world.agent_object(agent);
        (obj.row, obj.col)
    }

    pub fn agent_inventory(&self, agent: AgentId, resource: &str) -> u32 {
        let Some(id) = self
            .world
            .resource_names()
            .iter()
            .position(|r| r == resource)
        else {
            return 0;
        };
        self.world
            .agent_object(agent)
            .inventory
            .get(gw_core::ResourceId(id as u16))
    }

    // ── Stat reads (pure) ─────────────────────────────────────────────────

    pub fn get_game_stat(&self, name: &str) -> f32 {
        self.world
            .stats
            .lookup(name)
            .map(|id| self.world.stats.game(id))
            .unwrap_or(0.0)
    }

    pub fn get_agent_stat(&self, agent: AgentId, name: &str) -> f32 {
        self.world
            .stats
            .lookup(name)
            .map(|id| self.world.stats.agent(agent, id))
            .unwrap_or(0.0)
    }

    pub fn get_collective_stat(&self, collective: &str, name: &str) -> f32 {
        let Some(ci) = self
            .world
            .collectives
            .iter()
            .position(|c| c.name == collective)
        else {
            return 0.0;
        };
        self.world
            .stats
            .lookup(name)
            .map(|id| self.world.stats.collective(gw_core::CollectiveId(ci as u16), id))
            .unwrap_or(0.0)
    }

    /// Read-only snapshot of every live object, for external observers and
    /// replay writers.
    pub fn grid_objects(&self) -> Vec<ObjectSnapshot> {
        self.world
            .live_objects()
            .map(|obj| ObjectSnapshot {
                id: obj.id,
                type_name: self.world.type_name(obj.type_id).to_string(),
                row: obj.row,
                col: obj.col,
                tags: obj.tags.iter().map(|t| self.world.tag_name(t).to_string()).collect(),
                inventory: obj
                    .inventory
                    .iter_nonzero()
                    .map(|(r, amount)| {
                        (self.world.resource_names()[r.index()].clone(), amount)
                    })
                    .collect(),
                vibe: obj.vibe.0,
                collective: obj
                    .collective
                    .map(|c| self.world.collectives[c.index()].name.clone()),
                agent_id: obj.agent.as_ref().map(|a| a.agent_id.0),
            })
            .collect()
    }
}

/// One row of the `grid_objects` snapshot.
#[derive(Clone, Debug)]
pub struct ObjectSnapshot {
    pub id: ObjectId,
    pub type_name: String,
    pub row: u16,
    pub col: u16,
    pub tags: Vec<String>,
    pub inventory: Vec<(String, u32)>,
    pub vibe: u16,
    pub collective: Option<String>,
    pub agent_id: Option<u32>,
}

// ── Action resolution ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn resolve_agent_actions(
    agent: AgentId,
    world: &mut World,
    rules: &Rules,
    registry: &ActionRegistry,
    baselines: &StatBaselines,
    rng: &mut SimRng,
    actions: &[i32],
    vibe_actions: &[i32],
) {
    let obj_id = world.agent_object_id(agent);
    if world.live_object(obj_id).is_none() {
        return;
    }

    // Frozen agents are forced to noop in both spaces.
    let frozen = world
        .object(obj_id)
        .agent
        .as_ref()
        .is_some_and(|a| a.freeze_remaining > 0);
    if frozen {
        record_action(world, obj_id, agent, 0, "noop", false);
        world.stats.bump_agent(agent, "action.frozen", 1.0);
        return;
    }

    // ── Non-vibe action ───────────────────────────────────────────────────
    let raw = actions[agent.index()];
    match usize::try_from(raw).ok().and_then(|id| registry.non_vibe(id)) {
        None => {
            record_action(world, obj_id, agent, 0, "noop", false);
            world.stats.bump_agent(agent, "action.invalid", 1.0);
        }
        Some(def) => {
            let success = if !affordable(world, obj_id, def) {
                false
            } else {
                let effect_ok = perform(world, rules, registry, obj_id, def, baselines, rng);
                if effect_ok {
                    pay(world, obj_id, def);
                }
                effect_ok
            };
            record_action(world, obj_id, agent, raw as u16, &def.name, success);
        }
    }

    // ── Vibe action ───────────────────────────────────────────────────────
    if registry.has_vibe_actions() {
        if world.live_object(obj_id).is_none() {
            return;
        }
        let raw = vibe_actions[agent.index()];
        if let Some(def) = usize::try_from(raw).ok().and_then(|id| registry.vibe(id)) {
            let ActionKind::ChangeVibe(vibe) = def.kind else {
                return;
            };
            // Re-selecting the current vibe is an idempotent no-op: no
            // resource cost, no stat churn.
            if world.object(obj_id).vibe == vibe {
                return;
            }
            if affordable(world, obj_id, def) {
                world.object_mut(obj_id).vibe = vibe;
                pay(world, obj_id, def);
                world.stats.bump_agent(agent, &format!("action.{}.success", def.name), 1.0);
            } else {
                world.stats.bump_agent(agent, &format!("action.{}.failed", def.name), 1.0);
            }
        }
    }
}

fn affordable(world: &World, obj: ObjectId, def: &ActionDef) -> bool {
    let inventory = &world.object(obj).inventory;
    def.required
        .iter()
        .chain(def.consumed.iter())
        .all(|&(resource, amount)| inventory.get(resource) >= amount)
}

fn pay(world: &mut World, obj: ObjectId, def: &ActionDef) {
    for &(resource, amount) in &def.consumed {
        world
            .object_mut(obj)
            .inventory
            .apply_delta(resource, -(amount as i64));
    }
}

fn record_action(
    world: &mut World,
    obj: ObjectId,
    agent: AgentId,
    action_id: u16,
    name: &str,
    success: bool,
) {
    if let Some(state) = world.object_mut(obj).agent.as_mut() {
        state.last_action = action_id;
        state.last_action_success = success;
    }
    let outcome = if success { "success" } else { "failed" };
    world
        .stats
        .bump_agent(agent, &format!("action.{name}.{outcome}"), 1.0);
    world.stats.bump_game(&format!("action.{name}.{outcome}"), 1.0);
}

/// Run the action effect.  Returns `true` on success.
fn perform(
    world: &mut World,
    rules: &Rules,
    registry: &ActionRegistry,
    obj_id: ObjectId,
    def: &ActionDef,
    baselines: &StatBaselines,
    rng: &mut SimRng,
) -> bool {
    match def.kind {
        ActionKind::Noop => true,

        ActionKind::Move(dir) => {
            let (dr, dc) = dir.delta();
            let (row, col) = {
                let obj = world.object(obj_id);
                (obj.row as i32, obj.col as i32)
            };
            let (nr, nc) = (row + dr as i32, col + dc as i32);
            if !world.in_bounds(nr, nc) {
                return false;
            }

            // Walking into an occupied cell uses the occupant first; if a
            // handler removed it, the mover enters.
            let mut used = false;
            if let Some(occupant) = world.at(nr as u16, nc as u16) {
                if let Some(mh) = world.object(occupant).on_use {
                    used = run_multi_handler(
                        rules,
                        world,
                        mh,
                        RuleCtx::acting(obj_id, occupant),
                        baselines,
                        rng,
                    );
                }
            }
            let moved = world.move_object(obj_id, nr, nc).is_ok();
            if moved {
                if let Some(state) = world.object_mut(obj_id).agent.as_mut() {
                    state.facing = Facing { d_row: dr, d_col: dc };
                }
            }
            moved || used
        }

        ActionKind::Attack { distance, offset } => {
            let (row, col, facing) = {
                let obj = world.object(obj_id);
                let facing = obj.agent.as_ref().map(|a| a.facing).unwrap_or(Facing::NORTH);
                (obj.row as i32, obj.col as i32, facing)
            };
            let perp = facing.perpendicular();
            let tr = row + facing.d_row as i32 * distance as i32 + perp.d_row as i32 * offset as i32;
            let tc = col + facing.d_col as i32 * distance as i32 + perp.d_col as i32 * offset as i32;
            if !world.in_bounds(tr, tc) {
                return false;
            }
            match world.at(tr as u16, tc as u16) {
                // Only agents can be attacked.
                Some(defender) if world.object(defender).is_agent() => {
                    resolve_attack(world, obj_id, defender, &registry.attack)
                }
                _ => false,
            }
        }

        // Vibe actions never reach the non-vibe path.
        ActionKind::ChangeVibe(_) => false,
    }
}
