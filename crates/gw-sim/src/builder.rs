//! Init: name resolution, blueprint compilation, placement, baselines.
//!
//! Everything fatal happens here — unknown names, malformed role keys, tag
//! overflow, bad map cells, buffer mismatches are all caught before the
//! first step.  The build runs in two halves:
//!
//! 1. **Compile** (string work): resolve every name table, compile object
//!    and agent templates, handlers, AOEs, events, queries, rewards, and the
//!    action registry.
//! 2. **Place** (id work): walk the map row-major, place objects and agents,
//!    register static AOEs, run materialized queries, deposit initial
//!    inventories, and snapshot stat baselines.

use rustc_hash::FxHashMap;

use gw_core::{
    AgentId, AoeId, CollectiveId, GwError, GwResult, MultiHandlerId, ObsThreads, ResourceId, SimRng,
    TagId, TypeId, VibeId,
};
use gw_obs::{ObsEncoder, ObsSpec};
use gw_rules::{
    materialize, AoeSystem, DispatchMode, HandlerSpec, MultiHandler, ResolveCtx, Rules, Scope,
    StatBaselines, ValueSpec,
};
use gw_world::{
    AgentState, Collective, GridObject, Inventory, InventoryLimits, LimitGroup, TagSet, World,
};

use crate::action::ActionRegistry;
use crate::config::{GameConfig, InventoryConfig};
use crate::reward::{RewardEngine, RoleTable, RoleWeights};

/// Everything `Simulation` owns after a successful build.
pub(crate) struct Built {
    pub world: World,
    pub rules: Rules,
    pub aoes: AoeSystem,
    pub baselines: StatBaselines,
    pub registry: ActionRegistry,
    pub rewards: RewardEngine,
    pub encoder: ObsEncoder,
    pub rng: SimRng,
}

/// The auto tag every object type carries.
fn type_tag(name: &str) -> String {
    format!("type:{name}")
}

// ── Templates ─────────────────────────────────────────────────────────────────

struct AgentSeed {
    agent_id: AgentId,
    group_id: u16,
    role_token: Option<u8>,
}

struct Template {
    type_id: TypeId,
    tags: Vec<TagId>,
    collective: Option<CollectiveId>,
    vibe: VibeId,
    limits: InventoryLimits,
    initial: Vec<(ResourceId, u32)>,
    on_use: Option<MultiHandlerId>,
    on_tick: Option<MultiHandlerId>,
    on_tag_add: Option<MultiHandlerId>,
    on_tag_remove: Option<MultiHandlerId>,
    aoes: Vec<AoeId>,
    agent: Option<AgentSeed>,
}

impl Template {
    fn instantiate(&self, row: u16, col: u16, num_resources: usize) -> GridObject {
        GridObject {
            id: gw_core::ObjectId::INVALID,
            type_id: self.type_id,
            row,
            col,
            tags: self.tags.iter().copied().collect::<TagSet>(),
            inventory: Inventory::new(num_resources, self.limits.clone()),
            vibe: self.vibe,
            collective: self.collective,
            alive: false,
            on_use: self.on_use,
            on_tick: self.on_tick,
            on_tag_add: self.on_tag_add,
            on_tag_remove: self.on_tag_remove,
            aoes: self.aoes.clone(),
            agent: self.agent.as_ref().map(|seed| {
                let mut state = AgentState::new(seed.agent_id, seed.group_id);
                state.role_token = seed.role_token;
                state
            }),
        }
    }
}

/// What a map cell name resolves to.
enum CellTarget {
    Empty,
    /// Index into the object template table.
    Object(usize),
    /// A specific agent (index into the agent template table).
    AgentSlot(usize),
    /// The next unplaced agent of a group, row-major.
    AgentGroup(usize),
}

// ── Build ─────────────────────────────────────────────────────────────────────

pub(crate) fn build(config: &GameConfig, seed: u64) -> GwResult<Built> {
    // ── Normalize the agent list ──────────────────────────────────────────
    let agents: Vec<crate::config::AgentConfig> = if config.agents.is_empty() {
        (0..config.num_agents).map(|_| config.agent.clone()).collect()
    } else {
        if config.agents.len() != config.num_agents {
            return Err(GwError::Config(format!(
                "agents list length {} does not match num_agents {}",
                config.agents.len(),
                config.num_agents
            )));
        }
        config.agents.clone()
    };

    // ── Map sanity ────────────────────────────────────────────────────────
    let (height, width) = config.map_dims();
    if height == 0 || width == 0 {
        return Err(GwError::Config("map grid is empty".to_string()));
    }
    if config.map.iter().any(|row| row.len() != width as usize) {
        return Err(GwError::Config("map grid rows have unequal widths".to_string()));
    }

    // ── Name tables ───────────────────────────────────────────────────────
    let resource_names = config.resource_names.clone();
    let resources: FxHashMap<String, ResourceId> = resource_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), ResourceId(i as u16)))
        .collect();

    let mut type_names: Vec<String> = config
        .objects
        .iter()
        .map(|o| o.name.clone())
        .chain(agents.iter().map(|a| a.name.clone()))
        .collect();
    type_names.sort();
    type_names.dedup();
    let types: FxHashMap<String, TypeId> = type_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), TypeId(i as u16)))
        .collect();

    let mut tag_names: Vec<String> = config
        .tags
        .iter()
        .cloned()
        .chain(config.objects.iter().flat_map(|o| {
            o.tags.iter().cloned().chain(std::iter::once(type_tag(&o.name)))
        }))
        .chain(agents.iter().flat_map(|a| {
            a.tags.iter().cloned().chain(std::iter::once(type_tag(&a.name)))
        }))
        .chain(config.materialize_queries.iter().map(|mq| mq.tag.clone()))
        .collect();
    tag_names.sort();
    tag_names.dedup();
    if tag_names.len() > gw_world::tags::MAX_TAGS {
        return Err(GwError::TableOverflow {
            what: "tags",
            got: tag_names.len(),
            max: gw_world::tags::MAX_TAGS,
        });
    }
    let tags: FxHashMap<String, TagId> = tag_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), TagId(i as u16)))
        .collect();

    let mut collective_names: Vec<String> =
        config.collectives.iter().map(|(n, _)| n.clone()).collect();
    collective_names.sort();
    let collectives_map: FxHashMap<String, CollectiveId> = collective_names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), CollectiveId(i as u16)))
        .collect();

    let vibes: FxHashMap<String, VibeId> = config
        .actions
        .change_vibe
        .vibes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.clone(), VibeId(i as u16)))
        .collect();

    // Limit-group names (for clear-inventory mutations): first definition
    // wins, across agents, objects, and collectives.
    let mut limit_groups: FxHashMap<String, Vec<ResourceId>> = FxHashMap::default();
    let all_inventories = agents
        .iter()
        .map(|a| &a.inventory)
        .chain(config.objects.iter().map(|o| &o.inventory))
        .chain(config.collectives.iter().map(|(_, c)| &c.inventory));
    for inventory in all_inventories {
        for (group_name, limit) in &inventory.limits {
            limit_groups.entry(group_name.clone()).or_insert_with(|| {
                limit
                    .resources
                    .iter()
                    .filter_map(|r| resources.get(r))
                    .copied()
                    .collect()
            });
        }
    }

    // ── World shell ───────────────────────────────────────────────────────
    let mut world = World::new(
        width,
        height,
        type_names.clone(),
        tag_names.clone(),
        resource_names.clone(),
        {
            let mut pools = Vec::with_capacity(collective_names.len());
            for name in &collective_names {
                let cfg = &config
                    .collectives
                    .iter()
                    .find(|(n, _)| n == name)
                    .expect("sorted from this list")
                    .1;
                let limits = compile_limits(&cfg.inventory, &resources, &resource_names)?;
                pools.push(Collective::new(
                    name.clone(),
                    Inventory::new(resource_names.len(), limits),
                ));
            }
            pools
        },
        config.num_agents,
    );

    // ── Compile half ──────────────────────────────────────────────────────
    let mut rules = Rules::default();
    let mut roles = RoleTable::new();

    // Agent groups: keyed by collective name (or team id), first-appearance
    // order; the group name feeds the map cell aliases.
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (i, agent) in agents.iter().enumerate() {
        let key = agent
            .collective
            .clone()
            .unwrap_or_else(|| team_group_name(agent.team_id));
        match groups.iter_mut().find(|(name, _)| *name == key) {
            Some((_, members)) => members.push(i),
            None => groups.push((key, vec![i])),
        }
    }

    let (templates, agent_templates, reward_entries, registry, obs_values, obs_tag_features) = {
        let mut resolve = ResolveCtx {
            resources: &resources,
            tags: &tags,
            tag_names: &tag_names,
            collectives: &collectives_map,
            vibes: &vibes,
            types: &types,
            limit_groups: &limit_groups,
            stats: &mut world.stats,
        };

        // Object templates.
        let mut templates = Vec::with_capacity(config.objects.len());
        for object in &config.objects {
            let mut template = compile_common(
                &object.name,
                &object.tags,
                object.collective.as_deref(),
                object.vibe,
                &object.inventory,
                &object.aoes,
                &resources,
                &resource_names,
                &mut rules,
                &mut resolve,
            )?;
            template.on_use = compile_bundle(&object.on_use, DispatchMode::FirstMatch, &mut rules, &mut resolve)?;
            template.on_tick = compile_bundle(&object.on_tick, DispatchMode::All, &mut rules, &mut resolve)?;
            template.on_tag_add = compile_bundle(&object.on_tag_add, DispatchMode::All, &mut rules, &mut resolve)?;
            template.on_tag_remove = compile_bundle(&object.on_tag_remove, DispatchMode::All, &mut rules, &mut resolve)?;
            templates.push(template);
        }

        // Agent templates + rewards.
        let mut agent_templates = Vec::with_capacity(agents.len());
        let mut reward_entries = Vec::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            let agent_id = AgentId(i as u32);
            let weights = RoleWeights::for_agent(agent_id, agent, &mut roles);
            reward_entries.push(RewardEngine::compile_agent(
                &agent.rewards,
                &weights,
                &mut roles,
                &mut resolve,
            )?);

            let mut template = compile_common(
                &agent.name,
                &agent.tags,
                agent.collective.as_deref(),
                agent.vibe,
                &agent.inventory,
                &agent.aoes,
                &resources,
                &resource_names,
                &mut rules,
                &mut resolve,
            )?;
            template.on_tick = compile_bundle(&agent.on_tick, DispatchMode::All, &mut rules, &mut resolve)?;
            let group_id = groups
                .iter()
                .position(|(_, members)| members.contains(&i))
                .unwrap_or(0) as u16;
            template.agent = Some(AgentSeed {
                agent_id,
                group_id,
                role_token: weights.sole_role().map(|r| r.min(255) as u8),
            });
            agent_templates.push(template);
        }

        // Events.
        let (events, schedule) = gw_rules::event::compile_events(&config.events, &mut resolve)?;
        rules.events = events;
        rules.event_schedule = schedule;

        // Materialized queries.
        rules.materialized = config
            .materialize_queries
            .iter()
            .map(|mq| mq.compile(&mut resolve))
            .collect::<GwResult<_>>()?;

        // Observation extras.
        let mut obs_values = Vec::with_capacity(config.obs.obs_values.len());
        for spec in &config.obs.obs_values {
            obs_values.push((obs_value_feature_name(spec)?, spec.compile(&mut resolve)?));
        }
        let obs_tag_features: Vec<(TagId, String)> = config
            .obs
            .tag_features
            .iter()
            .map(|name| Ok((resolve.tag(name)?, name.clone())))
            .collect::<GwResult<_>>()?;

        // Actions.
        let registry = ActionRegistry::build(&config.actions, &mut resolve)?;

        (templates, agent_templates, reward_entries, registry, obs_values, obs_tag_features)
    };

    // ── Cell resolution table ─────────────────────────────────────────────
    let mut cells: FxHashMap<String, CellTarget> = FxHashMap::default();
    cells.insert("empty".to_string(), CellTarget::Empty);
    cells.insert(".".to_string(), CellTarget::Empty);
    for (i, object) in config.objects.iter().enumerate() {
        cells.insert(object.map_name().to_string(), CellTarget::Object(i));
    }
    for (group_id, (group_name, members)) in groups.iter().enumerate() {
        for (slot, &agent_index) in members.iter().enumerate() {
            cells.insert(
                format!("agent.{group_name}.{slot}"),
                CellTarget::AgentSlot(agent_index),
            );
        }
        let mut aliases = vec![
            format!("agent.{group_name}"),
            format!("agent.team_{group_id}"),
        ];
        if let Some(color) = TEAM_COLORS.get(group_id) {
            aliases.push(format!("agent.{color}"));
        }
        if group_id == 0 {
            aliases.push("agent.default".to_string());
            aliases.push("agent.agent".to_string());
        }
        for alias in aliases {
            cells.entry(alias).or_insert(CellTarget::AgentGroup(group_id));
        }
    }

    // ── Place half ────────────────────────────────────────────────────────
    let num_resources = resource_names.len();
    let mut group_cursor: Vec<usize> = vec![0; groups.len()];
    let mut aoes = AoeSystem::default();
    let mut placed_agents = 0usize;

    for (r, row) in config.map.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            let target = cells.get(cell.as_str()).ok_or_else(|| {
                GwError::Config(format!("map cell ({r}, {c}) names unknown object '{cell}'"))
            })?;
            let template = match target {
                CellTarget::Empty => continue,
                CellTarget::Object(i) => &templates[*i],
                CellTarget::AgentSlot(i) => {
                    placed_agents += 1;
                    &agent_templates[*i]
                }
                CellTarget::AgentGroup(g) => {
                    let members = &groups[*g].1;
                    let slot = group_cursor[*g];
                    if slot >= members.len() {
                        return Err(GwError::Config(format!(
                            "map has more 'agent.{}' cells than agents in the group ({})",
                            groups[*g].0,
                            members.len()
                        )));
                    }
                    group_cursor[*g] += 1;
                    placed_agents += 1;
                    &agent_templates[members[slot]]
                }
            };

            let mut object = template.instantiate(r as u16, c as u16, num_resources);
            for &(resource, amount) in &template.initial {
                object.inventory.apply_delta(resource, amount as i64);
            }
            let id = world
                .place(object)
                .map_err(|e| GwError::Config(format!("map cell ({r}, {c}): {e}")))?;
            for &aoe in &template.aoes {
                aoes.register(&world, id, aoe, &rules.aoe_blueprints[aoe.index()]);
            }
        }
    }

    if placed_agents != config.num_agents {
        return Err(GwError::Config(format!(
            "map placed {placed_agents} agents, config expects {}",
            config.num_agents
        )));
    }

    // Collective pools start with their configured deposits.
    for (name, cfg) in &config.collectives {
        let id = collectives_map[name];
        for (resource, amount) in &cfg.inventory.initial {
            let resource = resources
                .get(resource)
                .copied()
                .ok_or_else(|| GwError::UnknownResource(resource.clone()))?;
            world.collectives[id.index()].deposit(resource, *amount);
        }
    }

    // ── Materialize, baselines, encoder ───────────────────────────────────
    let mut rng = SimRng::new(seed);
    let empty_baselines = StatBaselines::default();
    for mq in rules.materialized.clone() {
        materialize(&rules, &mut world, &mq, &empty_baselines, &mut rng);
    }

    let rewards = RewardEngine::new(reward_entries);
    let mut baselines = StatBaselines::default();
    rewards.capture_baselines(&world, &mut baselines);
    for (_, value) in &obs_values {
        if let gw_rules::GameValue::Stat {
            stat,
            scope,
            delta: true,
        } = value
        {
            baselines.capture(&world, *stat, *scope);
        }
    }

    let threads = ObsThreads::from_env()?;
    let encoder = ObsEncoder::new(
        ObsSpec {
            width: config.obs.width,
            height: config.obs.height,
            num_tokens: config.obs.num_tokens,
            global: config.obs.global_obs,
            territory: config.obs.territory,
            aoe_mask: config.obs.aoe_mask,
            tag_features: obs_tag_features,
            obs_values,
            threads,
        },
        &resource_names,
    )?;

    log::info!(
        "built {}×{} world: {} objects, {} agents, {} tags, {} resources, {} collectives, obs threads {}",
        width,
        height,
        world.live_objects().count(),
        config.num_agents,
        tag_names.len(),
        resource_names.len(),
        collective_names.len(),
        threads.count(),
    );

    Ok(Built {
        world,
        rules,
        aoes,
        baselines,
        registry,
        rewards,
        encoder,
        rng,
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Legacy team names for agents grouped by bare team id.
const TEAM_COLORS: [&str; 6] = ["red", "blue", "green", "yellow", "purple", "orange"];

fn team_group_name(team_id: u16) -> String {
    TEAM_COLORS
        .get(team_id as usize)
        .map(|c| c.to_string())
        .unwrap_or_else(|| format!("group_{team_id}"))
}

fn compile_limits(
    inventory: &InventoryConfig,
    resources: &FxHashMap<String, ResourceId>,
    resource_names: &[String],
) -> GwResult<InventoryLimits> {
    let mut groups = Vec::with_capacity(inventory.limits.len());
    for (_, limit) in &inventory.limits {
        let ids: Vec<ResourceId> = limit
            .resources
            .iter()
            .map(|name| {
                resources
                    .get(name)
                    .copied()
                    .ok_or_else(|| GwError::UnknownResource(name.clone()))
            })
            .collect::<GwResult<_>>()?;
        let modifiers: Vec<(ResourceId, i64)> = limit
            .modifiers
            .iter()
            .filter_map(|(name, amount)| resources.get(name).map(|id| (*id, *amount)))
            .collect();
        groups.push(LimitGroup {
            resources: ids,
            min: limit.min,
            max: limit.max,
            modifiers,
        });
    }
    Ok(InventoryLimits::new(
        resource_names.len(),
        groups,
        inventory.default_limit,
    ))
}

/// Compile the fields shared by object and agent templates.
#[allow(clippy::too_many_arguments)]
fn compile_common(
    name: &str,
    tags: &[String],
    collective: Option<&str>,
    vibe: u16,
    inventory: &InventoryConfig,
    aoe_specs: &[(String, gw_rules::AoeSpec)],
    resources: &FxHashMap<String, ResourceId>,
    resource_names: &[String],
    rules: &mut Rules,
    resolve: &mut ResolveCtx<'_>,
) -> GwResult<Template> {
    let mut tag_ids: Vec<TagId> = Vec::with_capacity(tags.len() + 1);
    for tag in tags.iter().chain(std::iter::once(&type_tag(name))) {
        tag_ids.push(resolve.tag(tag)?);
    }

    let mut aoe_ids = Vec::with_capacity(aoe_specs.len());
    for (_, aoe) in aoe_specs {
        let id = AoeId(rules.aoe_blueprints.len() as u32);
        rules.aoe_blueprints.push(aoe.compile(resolve)?);
        aoe_ids.push(id);
    }

    let initial: Vec<(ResourceId, u32)> = inventory
        .initial
        .iter()
        .map(|(resource, amount)| Ok((resolve.resource(resource)?, *amount)))
        .collect::<GwResult<_>>()?;

    Ok(Template {
        type_id: resolve.type_id(name)?,
        tags: tag_ids,
        collective: collective.map(|c| resolve.collective(c)).transpose()?,
        vibe: VibeId(vibe),
        limits: compile_limits(inventory, resources, resource_names)?,
        initial,
        on_use: None,
        on_tick: None,
        on_tag_add: None,
        on_tag_remove: None,
        aoes: aoe_ids,
        agent: None,
    })
}

/// Compile an ordered handler map into one multi-handler.
fn compile_bundle(
    handlers: &[(String, HandlerSpec)],
    mode: DispatchMode,
    rules: &mut Rules,
    resolve: &mut ResolveCtx<'_>,
) -> GwResult<Option<MultiHandlerId>> {
    if handlers.is_empty() {
        return Ok(None);
    }
    let compiled = handlers
        .iter()
        .map(|(name, spec)| spec.compile(name, resolve))
        .collect::<GwResult<Vec<_>>>()?;
    Ok(Some(rules.add_multi_handler(MultiHandler {
        handlers: compiled,
        mode,
    })))
}

/// Feature name for a configured game-value observation, mirroring the
/// replay naming contract.
fn obs_value_feature_name(spec: &ValueSpec) -> GwResult<String> {
    let scope_str = |scope: &Scope| match scope {
        Scope::Agent => "own",
        Scope::Collective => "collective",
        Scope::Game => "global",
    };
    match spec {
        ValueSpec::Inventory { item, scope } => Ok(format!("inv:{}:{item}", scope_str(scope))),
        ValueSpec::Stat { name, scope, delta } => {
            let mut feature = format!("stat:{}:{name}", scope_str(scope));
            if *delta {
                feature.push_str(":delta");
            }
            Ok(feature)
        }
        other => Err(GwError::Config(format!(
            "only inventory and stat values can back observations, got {other:?}"
        ))),
    }
}
