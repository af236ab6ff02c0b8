//! The reward engine.
//!
//! Each agent carries compiled reward entries; at the end of every tick the
//! engine evaluates them and writes the per-tick reward into the shared
//! buffer.  Two accumulation modes:
//!
//! - `per_tick = false` (default, "delta"): the contribution is
//!   `value − last_value`, with `last_value` starting at the init baseline
//!   of zero — constant state pays out exactly once, on the first tick.
//! - `per_tick = true`: the contribution is `value`, every tick.
//!
//! Role-gated entries (`role:<role>:<label>` keys) scale by the agent's
//! weight for that role in `[0, 255] / 255`; weights are resolved once at
//! init from `role_order` / `role_mix_order` (default: the four built-in
//! roles round-robin by agent id).  Malformed role keys reject at init.

use gw_core::{AgentId, GwError, GwResult, ObjectId};
use gw_rules::{GameValue, ResolveCtx, StatBaselines};
use gw_world::World;

use crate::config::{AgentConfig, RewardSpec};

/// Roles assigned when no explicit order is configured, round-robin by
/// agent id.
pub const DEFAULT_ROLE_ORDER: [&str; 4] = ["miner", "aligner", "scout", "defender"];

// ── Role resolution ───────────────────────────────────────────────────────────

/// Per-simulation role name table; role id = index.  Seeded with the
/// built-in roles so default ids stay stable under overrides.
pub struct RoleTable {
    names: Vec<String>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self {
            names: DEFAULT_ROLE_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn intern(&mut self, name: &str) -> usize {
        match self.names.iter().position(|n| n == name) {
            Some(i) => i,
            None => {
                self.names.push(name.to_string());
                self.names.len() - 1
            }
        }
    }

    pub fn name(&self, id: usize) -> &str {
        &self.names[id]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The agent's weights over all roles, resolved at init.
pub struct RoleWeights {
    weights: Vec<u8>,
}

impl RoleWeights {
    /// Resolve one agent's role weights from its config.
    pub fn for_agent(agent: AgentId, config: &AgentConfig, roles: &mut RoleTable) -> RoleWeights {
        let mut weights = vec![0u8; roles.len()];
        let mut set = |roles: &mut RoleTable, weights: &mut Vec<u8>, name: &str, w: u8| {
            let id = roles.intern(name);
            if id >= weights.len() {
                weights.resize(id + 1, 0);
            }
            weights[id] = w;
        };

        if let Some(mix) = &config.role_mix_order {
            if !mix.is_empty() {
                for (name, w) in &mix[agent.index() % mix.len()] {
                    set(roles, &mut weights, name, *w);
                }
                return RoleWeights { weights };
            }
        }
        if let Some(order) = &config.role_order {
            if !order.is_empty() {
                set(roles, &mut weights, &order[agent.index() % order.len()], 255);
                return RoleWeights { weights };
            }
        }
        set(
            roles,
            &mut weights,
            DEFAULT_ROLE_ORDER[agent.index() % DEFAULT_ROLE_ORDER.len()],
            255,
        );
        RoleWeights { weights }
    }

    #[inline]
    pub fn weight(&self, role: usize) -> u8 {
        self.weights.get(role).copied().unwrap_or(0)
    }

    /// The single fully-weighted role, when the assignment is hard.
    pub fn sole_role(&self) -> Option<usize> {
        let mut sole = None;
        for (i, &w) in self.weights.iter().enumerate() {
            match w {
                0 => {}
                255 if sole.is_none() => sole = Some(i),
                _ => return None,
            }
        }
        sole
    }
}

/// Split a reward key into its role gate, validating the strict
/// `role:<role>:<label>` form.
pub fn parse_role_key(key: &str) -> GwResult<Option<&str>> {
    let Some(rest) = key.strip_prefix("role:") else {
        return Ok(None);
    };
    match rest.split_once(':') {
        Some((role, label)) if !role.is_empty() && !label.is_empty() => Ok(Some(role)),
        _ => Err(GwError::Config(format!(
            "Invalid role-gated reward key '{key}': expected 'role:<role>:<label>'"
        ))),
    }
}

// ── Compiled entries ──────────────────────────────────────────────────────────

struct Entry {
    numerator: GameValue,
    denominators: Vec<GameValue>,
    weight: f32,
    max: Option<f32>,
    per_tick: bool,
    /// Role scale in `[0, 1]`, resolved at init (1.0 for ungated entries).
    scale: f32,
    /// Delta-mode cache; init baseline is zero.
    last: f32,
}

/// All agents' compiled reward entries plus their delta caches.
pub struct RewardEngine {
    entries: Vec<Vec<Entry>>,
}

impl RewardEngine {
    /// Compile one agent's reward specs.  `weights` are the agent's resolved
    /// role weights.
    pub fn compile_agent(
        specs: &[(String, RewardSpec)],
        weights: &RoleWeights,
        roles: &mut RoleTable,
        resolve: &mut ResolveCtx<'_>,
    ) -> GwResult<Vec<(GameValue, Vec<GameValue>, f32, Option<f32>, bool, f32)>> {
        let mut out = Vec::with_capacity(specs.len());
        for (key, spec) in specs {
            let scale = match parse_role_key(key)? {
                None => 1.0,
                Some(role) => {
                    let id = roles.intern(role);
                    weights.weight(id) as f32 / 255.0
                }
            };
            out.push((
                spec.num.compile(resolve)?,
                spec.denoms
                    .iter()
                    .map(|d| d.compile(resolve))
                    .collect::<GwResult<_>>()?,
                spec.weight,
                spec.max,
                spec.per_tick,
                scale,
            ));
        }
        Ok(out)
    }

    pub fn new(
        compiled: Vec<Vec<(GameValue, Vec<GameValue>, f32, Option<f32>, bool, f32)>>,
    ) -> RewardEngine {
        RewardEngine {
            entries: compiled
                .into_iter()
                .map(|agent_entries| {
                    agent_entries
                        .into_iter()
                        .map(|(numerator, denominators, weight, max, per_tick, scale)| Entry {
                            numerator,
                            denominators,
                            weight,
                            max,
                            per_tick,
                            scale,
                            last: 0.0,
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// Snapshot the init-time baseline of every delta-flagged stat value
    /// referenced by any entry.
    pub fn capture_baselines(&self, world: &World, baselines: &mut StatBaselines) {
        for entry in self.entries.iter().flatten() {
            for value in std::iter::once(&entry.numerator).chain(entry.denominators.iter()) {
                if let GameValue::Stat {
                    stat,
                    scope,
                    delta: true,
                } = value
                {
                    baselines.capture(world, *stat, *scope);
                }
            }
        }
    }

    /// Compute this tick's reward for `agent` (backed by `subject`, its grid
    /// object) and update the delta caches.
    pub fn tick_agent(
        &mut self,
        world: &World,
        baselines: &StatBaselines,
        agent: AgentId,
        subject: Option<ObjectId>,
    ) -> f32 {
        let mut total = 0.0f32;
        for entry in &mut self.entries[agent.index()] {
            let num = entry.numerator.eval(world, subject, baselines) as f32;
            let mut value = if entry.denominators.is_empty() {
                entry.weight * num
            } else {
                let denom: f32 = entry
                    .denominators
                    .iter()
                    .map(|d| d.eval(world, subject, baselines) as f32)
                    .product();
                if denom == 0.0 {
                    0.0
                } else {
                    entry.weight * num / denom
                }
            };
            if let Some(max) = entry.max {
                value = value.min(max);
            }
            let contribution = if entry.per_tick {
                value
            } else {
                value - entry.last
            };
            entry.last = value;
            total += contribution * entry.scale;
        }
        total
    }
}
