//! Integration tests for gw-sim: the end-to-end scenarios the kernel must
//! reproduce exactly.

use std::sync::Mutex;

use gw_core::{AgentId, GwError, ObsThreads, SimRng};
use gw_rules::{
    AlignmentCondition, AoeSpec, EntityRef, EventSpec, FilterSpec, HandlerSpec, MutationSpec,
    ValueSpec,
};

use crate::buffers::Buffers;
use crate::config::{
    ActionConfig, AttackActionConfig, ChangeVibeActionConfig, CollectiveConfig, GameConfig,
    InventoryConfig, ObjectConfig, RewardSpec,
};
use crate::sim::Simulation;

/// Env-var mutations are process-global; serialize the tests that touch
/// `METTAGRID_OBS_THREADS`.
static ENV_LOCK: Mutex<()> = Mutex::new(());

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Translate rows of single chars into a cell-name grid.
/// Built-ins: `#` wall, `@` agent.agent, `.` empty.
fn ascii_map(rows: &[&str], legend: &[(char, &str)]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            row.chars()
                .map(|ch| match ch {
                    '#' => "wall".to_string(),
                    '@' => "agent.agent".to_string(),
                    '.' => "empty".to_string(),
                    other => legend
                        .iter()
                        .find(|(c, _)| *c == other)
                        .map(|(_, name)| name.to_string())
                        .unwrap_or_else(|| panic!("no legend entry for '{other}'")),
                })
                .collect()
        })
        .collect()
}

fn base_config(map: Vec<Vec<String>>, num_agents: usize) -> GameConfig {
    GameConfig {
        num_agents,
        objects: vec![ObjectConfig::named("wall")],
        map,
        ..GameConfig::default()
    }
}

fn sim(config: GameConfig) -> Simulation {
    let _ = env_logger::builder().is_test(true).try_init();
    let buffers = Buffers::new(config.num_agents, config.obs.num_tokens);
    Simulation::new(config, 42, buffers).expect("simulation builds")
}

fn step_noop(sim: &mut Simulation) {
    sim.buffers_mut().actions.fill(0);
    sim.step();
}

// ── Scenario A: movement and occupation ───────────────────────────────────────

#[test]
fn movement_sequence_in_walled_room() {
    let map = ascii_map(
        &["#####", "#...#", "#.@.#", "#...#", "#####"],
        &[],
    );
    let mut sim = sim(base_config(map, 1));
    let agent = AgentId(0);

    for (action, expected) in [
        ("move_north", (1, 2)),
        ("move_east", (1, 3)),
        ("move_south", (2, 3)),
        ("move_south", (3, 3)),
    ] {
        sim.set_action(agent, action).unwrap();
        sim.step();
        assert_eq!(sim.agent_position(agent), expected, "after {action}");
    }
    assert_eq!(sim.get_agent_stat(agent, "action.move_north.success"), 1.0);
}

#[test]
fn moving_into_wall_fails_silently() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut sim = sim(base_config(map, 1));
    sim.set_action(AgentId(0), "move_north").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 1));
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.move_north.failed"), 1.0);
    assert!(!sim.terminals()[0]);
}

#[test]
fn invalid_action_id_is_a_silent_noop() {
    let map = ascii_map(&["#####", "#.@.#", "#####"], &[]);
    let mut sim = sim(base_config(map, 1));
    sim.buffers_mut().actions[0] = 999;
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 2));
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.invalid"), 1.0);
}

// ── Scenario B: chest depletion ───────────────────────────────────────────────

fn extractor_config() -> ObjectConfig {
    let mut extractor = ObjectConfig::named("extractor");
    extractor.inventory = InventoryConfig {
        initial: vec![("gold".to_string(), 5)],
        limits: vec![],
        default_limit: 100,
    };
    extractor.on_use = vec![(
        "extract".to_string(),
        HandlerSpec {
            filters: vec![],
            mutations: vec![MutationSpec::ResourceTransfer {
                from: EntityRef::Target,
                to: EntityRef::Actor,
                resources: vec![("gold".to_string(), 5)],
                remove_when_empty: true,
            }],
        },
    )];
    extractor
}

#[test]
fn extractor_removed_from_grid_when_emptied() {
    let map = ascii_map(
        &["#####", "#...#", "#.E.#", "#.@.#", "#####"],
        &[('E', "extractor")],
    );
    let mut config = base_config(map, 1);
    config.resource_names = vec!["gold".to_string()];
    config.objects.push(extractor_config());

    let mut sim = sim(config);
    let extractors = |sim: &Simulation| {
        sim.grid_objects()
            .into_iter()
            .filter(|o| o.type_name == "extractor")
            .count()
    };
    assert_eq!(extractors(&sim), 1);

    sim.set_action(AgentId(0), "move_north").unwrap();
    sim.step();

    assert_eq!(sim.agent_inventory(AgentId(0), "gold"), 5);
    assert_eq!(extractors(&sim), 0, "depleted extractor leaves the grid");
    // The mover enters the vacated cell.
    assert_eq!(sim.agent_position(AgentId(0)), (2, 2));
}

#[test]
fn using_a_surviving_object_counts_as_success_without_moving() {
    // Same extractor, but holding 10 gold: one use withdraws 5, leaves 5,
    // so the object survives and blocks the cell.
    let map = ascii_map(
        &["#####", "#...#", "#.E.#", "#.@.#", "#####"],
        &[('E', "extractor")],
    );
    let mut config = base_config(map, 1);
    config.resource_names = vec!["gold".to_string()];
    let mut extractor = extractor_config();
    extractor.inventory.initial = vec![("gold".to_string(), 10)];
    config.objects.push(extractor);

    let mut sim = sim(config);
    sim.set_action(AgentId(0), "move_north").unwrap();
    sim.step();

    assert_eq!(sim.agent_inventory(AgentId(0), "gold"), 5);
    assert_eq!(sim.agent_position(AgentId(0)), (3, 2), "cell still blocked");
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.move_north.success"), 1.0);
}

// ── Scenario C: AOE with alignment filter ─────────────────────────────────────

fn aoe_source_config(collective: &str) -> ObjectConfig {
    let mut source = ObjectConfig::named("station");
    source.collective = Some(collective.to_string());
    source.aoes = vec![(
        "charge".to_string(),
        AoeSpec {
            radius: 2,
            filters: vec![FilterSpec::Alignment {
                entity: EntityRef::Target,
                condition: AlignmentCondition::SameCollective,
                collective: None,
            }],
            mutations: vec![MutationSpec::ResourceDelta {
                entity: EntityRef::Target,
                deltas: vec![("energy".to_string(), 10)],
                remove_when_empty: false,
            }],
            ..AoeSpec::default()
        },
    )];
    source
}

fn aoe_config(source_collective: &str) -> GameConfig {
    let map = ascii_map(
        &["#####", "#...#", "#.@.#", "#.S.#", "#####"],
        &[('S', "station")],
    );
    let mut config = base_config(map, 1);
    config.resource_names = vec!["energy".to_string()];
    config.collectives = vec![
        ("cogs".to_string(), CollectiveConfig::default()),
        ("clips".to_string(), CollectiveConfig::default()),
    ];
    config.agent.collective = Some("cogs".to_string());
    config.objects.push(aoe_source_config(source_collective));
    config
}

#[test]
fn aoe_charges_same_collective_agent() {
    let mut sim = sim(aoe_config("cogs"));
    step_noop(&mut sim);
    assert_eq!(sim.agent_inventory(AgentId(0), "energy"), 10);
}

#[test]
fn aoe_skips_misaligned_agent() {
    let mut sim = sim(aoe_config("clips"));
    step_noop(&mut sim);
    assert_eq!(sim.agent_inventory(AgentId(0), "energy"), 0);
}

// ── Scenario D: event max_targets ─────────────────────────────────────────────

fn align_walls_event(max_targets: Option<usize>) -> EventSpec {
    EventSpec {
        name: "capture".to_string(),
        timesteps: vec![5],
        target_tag: "type:wall".to_string(),
        filters: vec![],
        mutations: vec![MutationSpec::Alignment {
            entity: EntityRef::Target,
            align_to: gw_rules::AlignTo::None,
            collective: Some("clips".to_string()),
        }],
        max_targets,
        fallback: None,
    }
}

fn walled_event_config(max_targets: Option<usize>) -> GameConfig {
    let map = ascii_map(
        &["#######", "#.....#", "#.....#", "#..@..#", "#.....#", "#.....#", "#######"],
        &[],
    );
    let mut config = base_config(map, 1);
    config.collectives = vec![("clips".to_string(), CollectiveConfig::default())];
    config.events = vec![align_walls_event(max_targets)];
    config
}

fn clips_walls(sim: &Simulation) -> usize {
    sim.grid_objects()
        .into_iter()
        .filter(|o| o.type_name == "wall" && o.collective.as_deref() == Some("clips"))
        .count()
}

#[test]
fn event_with_max_targets_one_aligns_exactly_one_wall() {
    let mut sim = sim(walled_event_config(Some(1)));
    for _ in 0..6 {
        step_noop(&mut sim);
    }
    assert_eq!(clips_walls(&sim), 1);
}

#[test]
fn event_with_unlimited_targets_aligns_every_wall() {
    let mut sim = sim(walled_event_config(None));
    let total_walls = sim
        .grid_objects()
        .into_iter()
        .filter(|o| o.type_name == "wall")
        .count();
    for _ in 0..6 {
        step_noop(&mut sim);
    }
    assert_eq!(clips_walls(&sim), total_walls);
}

#[test]
fn event_does_not_fire_before_its_timestep() {
    let mut sim = sim(walled_event_config(Some(1)));
    for _ in 0..5 {
        step_noop(&mut sim);
    }
    assert_eq!(clips_walls(&sim), 0);
}

// ── Scenario E: reward delta vs per-tick ──────────────────────────────────────

fn gold_reward_config(per_tick: bool) -> GameConfig {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut config = base_config(map, 1);
    config.resource_names = vec!["gold".to_string()];
    config.agent.inventory.initial = vec![("gold".to_string(), 10)];
    config.agent.rewards = vec![(
        "gold".to_string(),
        RewardSpec {
            per_tick,
            ..RewardSpec::inventory("gold", 0.1)
        },
    )];
    config
}

#[test]
fn delta_reward_pays_once_for_constant_inventory() {
    let mut sim = sim(gold_reward_config(false));
    for _ in 0..10 {
        step_noop(&mut sim);
    }
    let episode = sim.episode_reward(AgentId(0));
    assert!((episode - 1.0).abs() < 0.01, "expected ~1.0, got {episode}");
}

#[test]
fn per_tick_reward_pays_every_tick() {
    let mut sim = sim(gold_reward_config(true));
    for _ in 0..10 {
        step_noop(&mut sim);
    }
    let episode = sim.episode_reward(AgentId(0));
    assert!((episode - 10.0).abs() < 0.01, "expected ~10.0, got {episode}");
}

// ── Role-gated rewards ────────────────────────────────────────────────────────

fn role_reward_config(num_agents: usize, key: &str) -> GameConfig {
    let map = ascii_map(&["#######", "#@.@.@#", "#.@...#", "#######"], &[]);
    let mut config = base_config(map, num_agents);
    config.agent.rewards = vec![(key.to_string(), RewardSpec::stat("action.noop.success", 1.0))];
    config
}

#[test]
fn role_gated_reward_applies_to_matching_agents_only() {
    let mut sim = sim(role_reward_config(4, "role:miner:noop_bonus"));
    step_noop(&mut sim);
    let rewards = sim.rewards();
    assert_eq!(rewards[0], 1.0, "agent 0 is a miner by default rotation");
    assert_eq!(rewards[1], 0.0);
    assert_eq!(rewards[2], 0.0);
    assert_eq!(rewards[3], 0.0);
}

#[test]
fn role_order_override_applies_to_all_agents() {
    let mut config = role_reward_config(4, "role:miner:noop_bonus");
    config.agent.role_order = Some(vec!["miner".to_string()]);
    let mut sim = sim(config);
    step_noop(&mut sim);
    assert!(sim.rewards().iter().all(|&r| r == 1.0));
}

#[test]
fn soft_role_weights_scale_rewards() {
    let mut config = role_reward_config(4, "role:miner:noop_bonus");
    config.agent.role_mix_order = Some(vec![
        vec![("miner".to_string(), 255)],
        vec![("aligner".to_string(), 255)],
        vec![("miner".to_string(), 128), ("aligner".to_string(), 128)],
        vec![("scout".to_string(), 255)],
    ]);
    let mut sim = sim(config);
    step_noop(&mut sim);
    let rewards = sim.rewards();
    assert_eq!(rewards[0], 1.0);
    assert_eq!(rewards[1], 0.0);
    assert!((rewards[2] - 128.0 / 255.0).abs() < 1e-6);
    assert_eq!(rewards[3], 0.0);
}

#[test]
fn malformed_role_keys_reject_at_init() {
    for key in ["role:miner", "role:", "role::noop_bonus", "role:miner:"] {
        let config = role_reward_config(4, key);
        let buffers = Buffers::new(config.num_agents, config.obs.num_tokens);
        let result = Simulation::new(config, 42, buffers);
        assert!(result.is_err(), "key '{key}' must be rejected");
    }
}

// ── Action-space split & vibes ────────────────────────────────────────────────

fn vibe_config() -> GameConfig {
    let map = ascii_map(&["#####", "#...#", "#.@.#", "#...#", "#####"], &[]);
    let mut config = base_config(map, 1);
    config.actions.change_vibe = ChangeVibeActionConfig {
        base: ActionConfig::enabled(),
        vibes: vec!["default".to_string(), "junction".to_string()],
    };
    config
}

#[test]
fn action_spaces_split_by_prefix() {
    let sim = sim(vibe_config());
    let non_vibe = sim.non_vibe_action_names();
    let vibe = sim.vibe_action_names();
    assert!(non_vibe.contains(&"noop"));
    assert!(non_vibe.contains(&"move_north"));
    assert!(non_vibe.iter().all(|n| !n.starts_with("change_vibe_")));
    assert_eq!(vibe, vec!["change_vibe_default", "change_vibe_junction"]);
}

#[test]
fn vibe_and_move_resolve_in_the_same_step() {
    let mut sim = sim(vibe_config());
    sim.set_action(AgentId(0), "move_east").unwrap();
    sim.set_action(AgentId(0), "change_vibe_junction").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (2, 3));
    assert_eq!(sim.world().agent_object(AgentId(0)).vibe.0, 1);
}

// ── Attack & freeze ───────────────────────────────────────────────────────────

fn combat_config() -> GameConfig {
    // Two agents in one column; agent 0 at the bottom faces north by
    // default, agent 1 stands one cell ahead of it.
    let map = ascii_map(&["#####", "#.@.#", "#.@.#", "#####"], &[]);
    let mut config = base_config(map, 2);
    config.resource_names = vec!["sword".to_string(), "loot".to_string()];
    config.actions.attack = AttackActionConfig {
        base: ActionConfig::enabled(),
        protocol: gw_rules::AttackSpec {
            weapon_resources: vec![("sword".to_string(), 1.0)],
            loot: vec!["loot".to_string()],
            freeze: 2,
            ..Default::default()
        },
    };
    config
}

#[test]
fn attack_loots_and_freezes_the_defender() {
    let mut config = combat_config();
    config.agent.inventory.initial = vec![("sword".to_string(), 1), ("loot".to_string(), 3)];
    let mut sim = sim(config);

    // Agent 1 (row 2) attacks straight ahead; agent 0 stands at row 1.
    sim.set_action(AgentId(0), "noop").unwrap();
    sim.set_action(AgentId(1), "attack_2").unwrap();
    sim.step();

    assert_eq!(sim.agent_inventory(AgentId(1), "loot"), 6, "loot transferred");
    assert_eq!(sim.agent_inventory(AgentId(0), "loot"), 0);
    // Freeze was 2, decremented once at end of the attack tick.
    let defender = sim.world().agent_object(AgentId(0));
    assert_eq!(defender.agent.as_ref().unwrap().freeze_remaining, 1);

    // Frozen defender is forced to noop: its move is ignored.
    sim.set_action(AgentId(0), "move_east").unwrap();
    sim.set_action(AgentId(1), "noop").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 2), "frozen agent cannot move");
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.frozen"), 1.0);

    // Freeze expired: movement works again.
    sim.set_action(AgentId(0), "move_east").unwrap();
    sim.set_action(AgentId(1), "noop").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 3));
}

#[test]
fn attack_without_target_fails() {
    let mut config = combat_config();
    config.agent.inventory.initial = vec![("sword".to_string(), 1)];
    let mut sim = sim(config);

    // Agent 0 (top row) faces north into the wall: no attackable target.
    sim.set_action(AgentId(0), "attack_2").unwrap();
    sim.set_action(AgentId(1), "noop").unwrap();
    sim.step();
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.attack_2.failed"), 1.0);
}

// ── Resource preconditions ────────────────────────────────────────────────────

#[test]
fn consumed_resources_gate_and_deduct() {
    let map = ascii_map(&["#####", "#.@.#", "#####"], &[]);
    let mut config = base_config(map, 1);
    config.resource_names = vec!["fuel".to_string()];
    config.agent.inventory.initial = vec![("fuel".to_string(), 1)];
    config.actions.r#move.base.consumed_resources = vec![("fuel".to_string(), 1)];

    let mut sim = sim(config);
    sim.set_action(AgentId(0), "move_east").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 3));
    assert_eq!(sim.agent_inventory(AgentId(0), "fuel"), 0);

    // Out of fuel: precondition fails, no movement, no deduction below zero.
    sim.set_action(AgentId(0), "move_west").unwrap();
    sim.step();
    assert_eq!(sim.agent_position(AgentId(0)), (1, 3));
    assert_eq!(sim.get_agent_stat(AgentId(0), "action.move_west.failed"), 1.0);
}

// ── Collectives & stats ───────────────────────────────────────────────────────

#[test]
fn collective_inventory_snapshot_lands_in_stats() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut config = base_config(map, 1);
    config.resource_names = vec!["gold".to_string()];
    config.collectives = vec![(
        "cogs".to_string(),
        CollectiveConfig {
            inventory: InventoryConfig {
                initial: vec![("gold".to_string(), 25)],
                ..InventoryConfig::default()
            },
        },
    )];
    config.agent.collective = Some("cogs".to_string());

    let mut sim = sim(config);
    step_noop(&mut sim);
    assert_eq!(sim.get_collective_stat("cogs", "inventory.gold"), 25.0);
}

// ── On-tick handlers ──────────────────────────────────────────────────────────

#[test]
fn agent_on_tick_applies_every_step() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut config = base_config(map, 1);
    config.resource_names = vec!["energy".to_string()];
    config.agent.on_tick = vec![(
        "regen".to_string(),
        HandlerSpec {
            filters: vec![],
            mutations: vec![MutationSpec::SetGameValue {
                value: ValueSpec::inventory("energy"),
                source: None,
                delta: 7.0,
                entity: EntityRef::Actor,
            }],
        },
    )];

    let mut sim = sim(config);
    step_noop(&mut sim);
    assert_eq!(sim.agent_inventory(AgentId(0), "energy"), 7);
    step_noop(&mut sim);
    assert_eq!(sim.agent_inventory(AgentId(0), "energy"), 14);
}

// ── Truncation & buffers ──────────────────────────────────────────────────────

#[test]
fn truncation_sets_at_horizon() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut config = base_config(map, 1);
    config.max_steps = 3;
    let mut sim = sim(config);

    for expected in [false, false, true] {
        step_noop(&mut sim);
        assert_eq!(sim.truncations()[0], expected);
    }
}

#[test]
fn zero_max_steps_never_truncates() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let mut config = base_config(map, 1);
    config.max_steps = 0;
    let mut sim = sim(config);
    for _ in 0..10 {
        step_noop(&mut sim);
        assert!(!sim.truncations()[0]);
    }
}

#[test]
fn buffer_shape_mismatch_is_fatal_at_bind() {
    let map = ascii_map(&["###", "#@#", "###"], &[]);
    let config = base_config(map, 1);
    let mut buffers = Buffers::new(1, config.obs.num_tokens);
    buffers.rewards = vec![0.0; 2];
    let result = Simulation::new(config, 42, buffers);
    assert!(matches!(result, Err(GwError::BufferMismatch { .. })));
}

// ── Observation integration ───────────────────────────────────────────────────

#[test]
fn agents_see_their_own_id_at_the_window_center() {
    let map = ascii_map(&["#######", "#@.@.@#", "#.....#", "#######"], &[]);
    let config = base_config(map, 3);
    let (w, h) = (config.obs.width, config.obs.height);
    let mut sim = sim(config);
    step_noop(&mut sim);

    let center = gw_obs::PackedCoordinate::pack((h / 2) as u8, (w / 2) as u8);
    let agent_id_feature = sim.features().agent_id;
    for i in 0..3u32 {
        let chunk = sim.agent_observation(AgentId(i));
        let seen: Vec<u8> = chunk
            .chunks(3)
            .filter(|t| t[0] == center && t[1] == agent_id_feature.0)
            .map(|t| t[2])
            .collect();
        assert_eq!(seen, vec![i as u8], "agent {i} sees its own id at center");
    }
}

// ── Scenario F: parallel-equivalent observations ──────────────────────────────

fn random_arena(width: usize, height: usize, agents: usize) -> Vec<Vec<String>> {
    let mut map = vec![vec!["empty".to_string(); width]; height];
    for c in 0..width {
        map[0][c] = "wall".to_string();
        map[height - 1][c] = "wall".to_string();
    }
    for row in map.iter_mut() {
        row[0] = "wall".to_string();
        row[width - 1] = "wall".to_string();
    }
    // Deterministic scatter of interior walls.
    let mut rng = SimRng::new(7);
    for _ in 0..width * height / 10 {
        let r = rng.gen_range(1..height - 1);
        let c = rng.gen_range(1..width - 1);
        map[r][c] = "wall".to_string();
    }
    // Agents on the first free cells of interior rows.
    let mut placed = 0;
    'outer: for r in 1..height - 1 {
        for c in 1..width - 1 {
            if placed == agents {
                break 'outer;
            }
            if map[r][c] == "empty" && (r + c) % 3 == 0 {
                map[r][c] = "agent.agent".to_string();
                placed += 1;
            }
        }
    }
    assert_eq!(placed, agents);
    map
}

fn run_with_threads(threads: &str, steps: usize) -> Vec<Vec<u8>> {
    let map = random_arena(40, 40, 20);
    let mut config = base_config(map, 20);
    config.max_steps = 0;
    config.obs.width = 11;
    config.obs.height = 11;

    // Parsed once at construction; restored below.
    unsafe { std::env::set_var(gw_core::threads::OBS_THREADS_ENV, threads) };
    let built = Simulation::new(
        config.clone(),
        42,
        Buffers::new(config.num_agents, config.obs.num_tokens),
    );
    unsafe { std::env::remove_var(gw_core::threads::OBS_THREADS_ENV) };
    let mut sim = built.expect("simulation builds");

    let num_actions = sim.non_vibe_action_names().len() as i32;
    let mut action_rng = SimRng::new(42);
    let mut frames = Vec::with_capacity(steps);
    for _ in 0..steps {
        for i in 0..20 {
            sim.buffers_mut().actions[i] = action_rng.gen_range(0..num_actions);
        }
        sim.step();
        frames.push(sim.observations().to_vec());
    }
    frames
}

#[test]
fn observations_match_across_thread_counts() {
    let _guard = ENV_LOCK.lock().unwrap();
    let serial = run_with_threads("1", 20);
    let four = run_with_threads("4", 20);
    let auto = run_with_threads("auto", 20);

    assert_eq!(serial.len(), 20);
    assert_eq!(serial, four, "4 threads must match the serial reference");
    assert_eq!(serial, auto, "auto must match the serial reference");
}

#[test]
fn bad_thread_count_is_an_init_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    assert!(matches!(ObsThreads::parse("several"), Err(GwError::ThreadCount(_))));
}

// ── Determinism ───────────────────────────────────────────────────────────────

#[test]
fn identical_seeds_and_actions_reproduce_identical_runs() {
    let run = |seed: u64| -> (Vec<u8>, Vec<f32>) {
        let map = ascii_map(
            &["#####", "#...#", "#.E.#", "#.@.#", "#####"],
            &[('E', "extractor")],
        );
        let mut config = base_config(map, 1);
        config.resource_names = vec!["gold".to_string()];
        config.objects.push(extractor_config());
        config.agent.rewards = vec![("gold".to_string(), RewardSpec::inventory("gold", 0.1))];

        let mut sim = Simulation::new(
            config.clone(),
            seed,
            Buffers::new(config.num_agents, config.obs.num_tokens),
        )
        .unwrap();
        sim.set_action(AgentId(0), "move_north").unwrap();
        sim.step();
        for _ in 0..4 {
            step_noop(&mut sim);
        }
        (sim.observations().to_vec(), sim.rewards().to_vec())
    };

    assert_eq!(run(42), run(42));
}
