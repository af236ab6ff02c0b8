//! The fully-resolved game configuration.
//!
//! Everything arriving here is plain data: user-level config loading,
//! merging, and validation happen outside the kernel, and map generation has
//! already produced a 2-D grid of cell names.  Names (resources, tags,
//! collectives, vibes, stats) are still strings at this level — the builder
//! resolves them into dense ids exactly once, failing init on any unknown
//! reference.
//!
//! Ordered pairs (`Vec<(String, …)>`) stand in for maps throughout: config
//! insertion order is a behavioral contract (handler priority, event
//! registration), so nothing here may round-trip through a hash map.

use gw_rules::{AoeSpec, EventSpec, HandlerSpec, MaterializedQuerySpec, ValueSpec};

// ── Inventory ─────────────────────────────────────────────────────────────────

/// One limit group over named resources.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitSpec {
    pub resources: Vec<String>,
    /// Base capacity of the group.
    pub min: u32,
    /// Hard ceiling (modifiers never push past it).
    pub max: u32,
    /// `(resource, amount)` — extra capacity per held unit.
    pub modifiers: Vec<(String, i64)>,
}

impl LimitSpec {
    pub fn flat(resource: &str, limit: u32) -> Self {
        Self {
            resources: vec![resource.to_string()],
            min: limit,
            max: u16::MAX as u32,
            modifiers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryConfig {
    pub initial: Vec<(String, u32)>,
    /// Named limit groups, config order.
    pub limits: Vec<(String, LimitSpec)>,
    /// Limit for resources not covered by any group.
    pub default_limit: u32,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            initial: Vec::new(),
            limits: Vec::new(),
            default_limit: u16::MAX as u32,
        }
    }
}

// ── Rewards ───────────────────────────────────────────────────────────────────

/// One reward entry: `weight · num / Π denoms`, optionally capped, delta or
/// per-tick accumulation.  Entries named `role:<role>:<label>` scale by the
/// agent's weight for that role.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RewardSpec {
    pub num: ValueSpec,
    pub denoms: Vec<ValueSpec>,
    pub weight: f32,
    pub max: Option<f32>,
    pub per_tick: bool,
}

impl RewardSpec {
    /// Inventory-backed reward with default delta accumulation.
    pub fn inventory(item: &str, weight: f32) -> Self {
        Self {
            num: ValueSpec::inventory(item),
            denoms: Vec::new(),
            weight,
            max: None,
            per_tick: false,
        }
    }

    /// Agent-stat-backed reward.
    pub fn stat(name: &str, weight: f32) -> Self {
        Self {
            num: ValueSpec::stat(name),
            denoms: Vec::new(),
            weight,
            max: None,
            per_tick: false,
        }
    }

    pub fn per_tick(mut self) -> Self {
        self.per_tick = true;
        self
    }
}

// ── Agents & objects ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentConfig {
    /// Type name; also the `type:<name>` auto tag.
    pub name: String,
    pub team_id: u16,
    pub collective: Option<String>,
    pub tags: Vec<String>,
    /// Initial vibe index into the configured vibe table.
    pub vibe: u16,
    pub inventory: InventoryConfig,
    /// `(key, spec)`; role-gated keys use the `role:<role>:<label>` form.
    pub rewards: Vec<(String, RewardSpec)>,
    pub aoes: Vec<(String, AoeSpec)>,
    pub on_tick: Vec<(String, HandlerSpec)>,
    /// Hard role assignment: `order[agent_id % len]` gets weight 255.
    pub role_order: Option<Vec<String>>,
    /// Soft role assignment: per-slot role → weight maps.
    pub role_mix_order: Option<Vec<Vec<(String, u8)>>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            team_id: 0,
            collective: None,
            tags: Vec::new(),
            vibe: 0,
            inventory: InventoryConfig::default(),
            rewards: Vec::new(),
            aoes: Vec::new(),
            on_tick: Vec::new(),
            role_order: None,
            role_mix_order: None,
        }
    }
}

/// A non-agent object template, keyed on the map by `map_name`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectConfig {
    pub name: String,
    /// Cell name in the map grid; defaults to `name`.
    pub map_name: Option<String>,
    pub tags: Vec<String>,
    pub collective: Option<String>,
    pub vibe: u16,
    pub inventory: InventoryConfig,
    pub on_use: Vec<(String, HandlerSpec)>,
    pub on_tick: Vec<(String, HandlerSpec)>,
    pub on_tag_add: Vec<(String, HandlerSpec)>,
    pub on_tag_remove: Vec<(String, HandlerSpec)>,
    pub aoes: Vec<(String, AoeSpec)>,
}

impl ObjectConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            map_name: None,
            tags: Vec::new(),
            collective: None,
            vibe: 0,
            inventory: InventoryConfig::default(),
            on_use: Vec::new(),
            on_tick: Vec::new(),
            on_tag_add: Vec::new(),
            on_tag_remove: Vec::new(),
            aoes: Vec::new(),
        }
    }

    pub fn map_name(&self) -> &str {
        self.map_name.as_deref().unwrap_or(&self.name)
    }
}

/// A named shared pool.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectiveConfig {
    pub inventory: InventoryConfig,
}

// ── Actions ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionConfig {
    pub enabled: bool,
    /// Must be held for the action to run.  Empty = fall back to consumed.
    pub required_resources: Vec<(String, u32)>,
    /// Deducted on success.
    pub consumed_resources: Vec<(String, u32)>,
}

impl ActionConfig {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveActionConfig {
    pub base: ActionConfig,
    /// Direction names, config order; each becomes a `move_<dir>` action.
    pub allowed_directions: Vec<String>,
}

impl Default for MoveActionConfig {
    fn default() -> Self {
        Self {
            base: ActionConfig::default(),
            allowed_directions: ["north", "south", "east", "west"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttackActionConfig {
    pub base: ActionConfig,
    pub protocol: gw_rules::AttackSpec,
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeVibeActionConfig {
    pub base: ActionConfig,
    /// The vibe table; index = vibe id, each becomes `change_vibe_<name>`.
    pub vibes: Vec<String>,
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActionsConfig {
    pub noop: ActionConfig,
    pub r#move: MoveActionConfig,
    pub attack: AttackActionConfig,
    pub change_vibe: ChangeVibeActionConfig,
}

impl ActionsConfig {
    /// Noop + 4-direction movement, the minimal useful action set.
    pub fn noop_and_move() -> Self {
        Self {
            noop: ActionConfig::enabled(),
            r#move: MoveActionConfig {
                base: ActionConfig::enabled(),
                ..MoveActionConfig::default()
            },
            ..Default::default()
        }
    }
}

// ── Observations ──────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObsConfig {
    pub width: u16,
    pub height: u16,
    pub num_tokens: usize,
    pub global_obs: gw_obs::GlobalObsFlags,
    pub territory: bool,
    pub aoe_mask: bool,
    /// Tags emitted as 1-bit spatial features.
    pub tag_features: Vec<String>,
    /// Extra global tokens backed by game values.
    pub obs_values: Vec<ValueSpec>,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            width: 11,
            height: 11,
            num_tokens: 64,
            global_obs: gw_obs::GlobalObsFlags::default(),
            territory: false,
            aoe_mask: false,
            tag_features: Vec::new(),
            obs_values: Vec::new(),
        }
    }
}

// ── Game config ───────────────────────────────────────────────────────────────

/// The complete resolved input to [`Simulation::new`][crate::Simulation::new].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GameConfig {
    /// Truncation horizon; 0 = unbounded.
    pub max_steps: u32,
    /// Dense resource table: id = index.
    pub resource_names: Vec<String>,
    pub num_agents: usize,
    /// Template used when `agents` is empty.
    pub agent: AgentConfig,
    /// Explicit per-agent configs (length `num_agents` when non-empty).
    pub agents: Vec<AgentConfig>,
    pub objects: Vec<ObjectConfig>,
    /// `(name, config)`; ids are assigned from sorted names.
    pub collectives: Vec<(String, CollectiveConfig)>,
    pub actions: ActionsConfig,
    pub obs: ObsConfig,
    pub events: Vec<EventSpec>,
    pub materialize_queries: Vec<MaterializedQuerySpec>,
    /// Extra tags beyond those on objects/agents (filter-only tags).
    pub tags: Vec<String>,
    /// The pre-built map: `map[row][col]` is a cell name (`empty`/`.` for
    /// vacant cells), resolved against object `map_name`s and agent cells.
    pub map: Vec<Vec<String>>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            resource_names: Vec::new(),
            num_agents: 1,
            agent: AgentConfig::default(),
            agents: Vec::new(),
            objects: Vec::new(),
            collectives: Vec::new(),
            actions: ActionsConfig::noop_and_move(),
            obs: ObsConfig::default(),
            events: Vec::new(),
            materialize_queries: Vec::new(),
            tags: Vec::new(),
            map: Vec::new(),
        }
    }
}

impl GameConfig {
    /// Map dimensions `(height, width)`.
    pub fn map_dims(&self) -> (u16, u16) {
        let height = self.map.len() as u16;
        let width = self.map.first().map_or(0, |row| row.len()) as u16;
        (height, width)
    }
}
