//! Stat tables: `game`, `agent[i]`, and `collective[c]`.
//!
//! Stat names are open-ended strings ("action.noop.success",
//! "inventory.clamped", user-configured stats), so they are interned into a
//! growing dense id space rather than resolved against a closed table.
//! Config-referenced names are interned at init; mutations may intern new
//! names at runtime (an O(1) amortized hash probe — the hot path for already
//! known stats is a dense `Vec` index).
//!
//! All three tables share the id space, so `StatId` is meaningful across
//! scopes and the tables are plain `Vec<f32>` rows grown on demand.

use rustc_hash::FxHashMap;

use gw_core::{AgentId, CollectiveId, StatId};

/// Which table a stat read/write targets.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatScope {
    Game,
    Agent,
    Collective,
}

/// Interner plus the three tables.
pub struct Stats {
    names: Vec<String>,
    by_name: FxHashMap<String, StatId>,
    game: Vec<f32>,
    agents: Vec<Vec<f32>>,
    collectives: Vec<Vec<f32>>,
}

impl Stats {
    pub fn new(num_agents: usize, num_collectives: usize) -> Self {
        Self {
            names: Vec::new(),
            by_name: FxHashMap::default(),
            game: Vec::new(),
            agents: vec![Vec::new(); num_agents],
            collectives: vec![Vec::new(); num_collectives],
        }
    }

    /// Intern `name`, returning its dense id.
    pub fn intern(&mut self, name: &str) -> StatId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = StatId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Id of an already interned name.
    pub fn lookup(&self, name: &str) -> Option<StatId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: StatId) -> &str {
        &self.names[id.index()]
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    #[inline]
    pub fn game(&self, stat: StatId) -> f32 {
        self.game.get(stat.index()).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn agent(&self, agent: AgentId, stat: StatId) -> f32 {
        self.agents[agent.index()]
            .get(stat.index())
            .copied()
            .unwrap_or(0.0)
    }

    #[inline]
    pub fn collective(&self, collective: CollectiveId, stat: StatId) -> f32 {
        self.collectives[collective.index()]
            .get(stat.index())
            .copied()
            .unwrap_or(0.0)
    }

    // ── Writes ────────────────────────────────────────────────────────────

    pub fn add_game(&mut self, stat: StatId, delta: f32) {
        grow(&mut self.game, stat);
        self.game[stat.index()] += delta;
    }

    pub fn add_agent(&mut self, agent: AgentId, stat: StatId, delta: f32) {
        let row = &mut self.agents[agent.index()];
        grow(row, stat);
        row[stat.index()] += delta;
    }

    pub fn add_collective(&mut self, collective: CollectiveId, stat: StatId, delta: f32) {
        let row = &mut self.collectives[collective.index()];
        grow(row, stat);
        row[stat.index()] += delta;
    }

    /// Overwrite (not accumulate) a collective stat — used by the per-tick
    /// inventory snapshot so the value tracks the pool instead of integrating.
    pub fn set_collective(&mut self, collective: CollectiveId, stat: StatId, value: f32) {
        let row = &mut self.collectives[collective.index()];
        grow(row, stat);
        row[stat.index()] = value;
    }

    /// Intern-and-add convenience for built-in hooks.
    pub fn bump_game(&mut self, name: &str, delta: f32) {
        let id = self.intern(name);
        self.add_game(id, delta);
    }

    pub fn bump_agent(&mut self, agent: AgentId, name: &str, delta: f32) {
        let id = self.intern(name);
        self.add_agent(agent, id, delta);
    }
}

#[inline]
fn grow(row: &mut Vec<f32>, stat: StatId) {
    if row.len() <= stat.index() {
        row.resize(stat.index() + 1, 0.0);
    }
}
