//! Unit tests for gw-rules.

use rustc_hash::FxHashMap;

use gw_core::{AgentId, AoeId, CollectiveId, ObjectId, ResourceId, SimRng, TagId, TypeId, VibeId};
use gw_world::{
    AgentState, Collective, GridObject, Inventory, InventoryLimits, World,
};

use crate::aoe::{AoeSpec, AoeSystem};
use crate::ctx::{EntityRef, RuleCtx};
use crate::event::{compile_events, run_events_for_tick, EventSpec};
use crate::filter::{compile_filters, eval_filters, AlignmentCondition, FilterSpec};
use crate::handler::{
    run_multi_handler, DispatchMode, Handler, HandlerSpec, MultiHandler, Rules,
};
use crate::mutation::{apply_mutation, MutationSpec};
use crate::query::{materialize, run_query, MaterializedQuerySpec, OrderBy, QuerySourceSpec, QuerySpec};
use crate::resolve::ResolveCtx;
use crate::value::{Scope, StatBaselines, ValueSpec};

// ── Test tables ───────────────────────────────────────────────────────────────

const RESOURCES: &[&str] = &["energy", "gold", "silver"];
const TAGS: &[&str] = &["marked", "team:blue", "team:red", "type:agent", "type:hub", "type:wall", "type:wire"];
const COLLECTIVES: &[&str] = &["clips", "cogs"];
const TYPES: &[&str] = &["agent", "hub", "wall", "wire"];
const VIBES: &[&str] = &["default", "charged"];

const ENERGY: ResourceId = ResourceId(0);
const GOLD: ResourceId = ResourceId(1);
const SILVER: ResourceId = ResourceId(2);
const TAG_MARKED: TagId = TagId(0);
const TAG_TEAM_BLUE: TagId = TagId(1);
const TAG_WALL: TagId = TagId(5);
const CLIPS: CollectiveId = CollectiveId(0);
const COGS: CollectiveId = CollectiveId(1);

struct Tables {
    resources: FxHashMap<String, ResourceId>,
    tags: FxHashMap<String, TagId>,
    tag_names: Vec<String>,
    collectives: FxHashMap<String, CollectiveId>,
    vibes: FxHashMap<String, VibeId>,
    types: FxHashMap<String, TypeId>,
    limit_groups: FxHashMap<String, Vec<ResourceId>>,
}

impl Tables {
    fn new() -> Self {
        let index = |names: &[&str]| -> FxHashMap<String, u16> {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.to_string(), i as u16))
                .collect()
        };
        let mut limit_groups = FxHashMap::default();
        limit_groups.insert("metals".to_string(), vec![GOLD, SILVER]);
        Self {
            resources: index(RESOURCES).into_iter().map(|(k, v)| (k, ResourceId(v))).collect(),
            tags: index(TAGS).into_iter().map(|(k, v)| (k, TagId(v))).collect(),
            tag_names: TAGS.iter().map(|s| s.to_string()).collect(),
            collectives: index(COLLECTIVES).into_iter().map(|(k, v)| (k, CollectiveId(v))).collect(),
            vibes: index(VIBES).into_iter().map(|(k, v)| (k, VibeId(v))).collect(),
            types: index(TYPES).into_iter().map(|(k, v)| (k, TypeId(v))).collect(),
            limit_groups,
        }
    }

    fn ctx<'a>(&'a self, stats: &'a mut gw_world::Stats) -> ResolveCtx<'a> {
        ResolveCtx {
            resources: &self.resources,
            tags: &self.tags,
            tag_names: &self.tag_names,
            collectives: &self.collectives,
            vibes: &self.vibes,
            types: &self.types,
            limit_groups: &self.limit_groups,
            stats,
        }
    }
}

fn make_world(num_agents: usize) -> World {
    World::new(
        9,
        9,
        TYPES.iter().map(|s| s.to_string()).collect(),
        TAGS.iter().map(|s| s.to_string()).collect(),
        RESOURCES.iter().map(|s| s.to_string()).collect(),
        vec![
            Collective::new("clips", test_inventory()),
            Collective::new("cogs", test_inventory()),
        ],
        num_agents,
    )
}

fn test_inventory() -> Inventory {
    Inventory::new(RESOURCES.len(), InventoryLimits::new(RESOURCES.len(), vec![], 1000))
}

fn object(type_name: &str, row: u16, col: u16) -> GridObject {
    let type_id = TYPES.iter().position(|t| *t == type_name).unwrap() as u16;
    let type_tag = TAGS.iter().position(|t| *t == format!("type:{type_name}")).unwrap() as u16;
    GridObject {
        id: ObjectId::INVALID,
        type_id: TypeId(type_id),
        row,
        col,
        tags: [TagId(type_tag)].into_iter().collect(),
        inventory: test_inventory(),
        vibe: VibeId(0),
        collective: None,
        alive: false,
        on_use: None,
        on_tick: None,
        on_tag_add: None,
        on_tag_remove: None,
        aoes: Vec::new(),
        agent: None,
    }
}

fn agent(agent_id: u32, row: u16, col: u16) -> GridObject {
    let mut obj = object("agent", row, col);
    obj.agent = Some(AgentState::new(AgentId(agent_id), 0));
    obj
}

fn compile_one_filter(world: &mut World, tables: &Tables, spec: FilterSpec) -> Vec<crate::Filter> {
    let mut resolve = tables.ctx(&mut world.stats);
    compile_filters(&[spec], &mut resolve).unwrap()
}

fn resource_filter(entity: EntityRef, pairs: &[(&str, u32)]) -> FilterSpec {
    FilterSpec::Resource {
        entity,
        resources: pairs.iter().map(|(n, m)| (n.to_string(), *m)).collect(),
    }
}

// ── GameValue evaluation ──────────────────────────────────────────────────────

#[test]
fn value_inventory_scopes() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let a = world.place(agent(0, 1, 1)).unwrap();
    let b = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(a).inventory.apply_delta(GOLD, 4);
    world.object_mut(b).inventory.apply_delta(GOLD, 6);
    world.object_mut(a).collective = Some(COGS);
    world.collectives[COGS.index()].deposit(GOLD, 11);

    let baselines = StatBaselines::default();
    let mut resolve = tables.ctx(&mut world.stats);
    let own = ValueSpec::Inventory { item: "gold".into(), scope: Scope::Agent }.compile(&mut resolve).unwrap();
    let coll = ValueSpec::Inventory { item: "gold".into(), scope: Scope::Collective }.compile(&mut resolve).unwrap();
    let game = ValueSpec::Inventory { item: "gold".into(), scope: Scope::Game }.compile(&mut resolve).unwrap();

    assert_eq!(own.eval(&world, Some(a), &baselines), 4.0);
    assert_eq!(coll.eval(&world, Some(a), &baselines), 11.0);
    assert_eq!(coll.eval(&world, Some(b), &baselines), 0.0, "no collective → 0");
    assert_eq!(game.eval(&world, None, &baselines), 10.0);
}

#[test]
fn value_counts_and_tag_counts() {
    let mut world = make_world(1);
    let tables = Tables::new();
    world.place(object("wall", 0, 0)).unwrap();
    world.place(object("wall", 0, 1)).unwrap();
    let marked = world.place(object("wire", 0, 2)).unwrap();
    world.add_tag_raw(marked, TAG_MARKED);

    let baselines = StatBaselines::default();
    let mut resolve = tables.ctx(&mut world.stats);
    let walls = ValueSpec::NumObjects { type_name: "wall".into() }.compile(&mut resolve).unwrap();
    let marks = ValueSpec::TagCount { tag: "marked".into() }.compile(&mut resolve).unwrap();
    assert_eq!(walls.eval(&world, None, &baselines), 2.0);
    assert_eq!(marks.eval(&world, None, &baselines), 1.0);
}

#[test]
fn delta_stat_subtracts_init_baseline() {
    let mut world = make_world(1);
    let tables = Tables::new();
    world.place(agent(0, 1, 1)).unwrap();

    let (plain, delta) = {
        let mut resolve = tables.ctx(&mut world.stats);
        (
            ValueSpec::game_stat("score", false).compile(&mut resolve).unwrap(),
            ValueSpec::game_stat("score", true).compile(&mut resolve).unwrap(),
        )
    };
    let stat = world.stats.lookup("score").unwrap();

    // Pre-baseline state: 5 points exist before the episode starts.
    world.stats.add_game(stat, 5.0);
    let mut baselines = StatBaselines::default();
    baselines.capture(&world, stat, Scope::Game);

    assert_eq!(plain.eval(&world, None, &baselines), 5.0);
    assert_eq!(delta.eval(&world, None, &baselines), 0.0);

    world.stats.add_game(stat, 2.0);
    assert_eq!(delta.eval(&world, None, &baselines), 2.0);
}

// ── Filters ───────────────────────────────────────────────────────────────────

#[test]
fn alignment_conditions() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(actor).collective = Some(COGS);
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, target);

    let check = |world: &mut World, condition| {
        let filters = compile_one_filter(
            world,
            &tables,
            FilterSpec::Alignment { entity: EntityRef::Target, condition, collective: None },
        );
        eval_filters(&filters, world, ctx, &baselines)
    };

    // Target unaligned.
    assert!(!check(&mut world, AlignmentCondition::Aligned));
    assert!(check(&mut world, AlignmentCondition::Unaligned));
    assert!(!check(&mut world, AlignmentCondition::SameCollective));
    assert!(!check(&mut world, AlignmentCondition::DifferentCollective));
    assert!(check(&mut world, AlignmentCondition::NotSameCollective));

    // Same collective.
    world.object_mut(target).collective = Some(COGS);
    assert!(check(&mut world, AlignmentCondition::SameCollective));
    assert!(!check(&mut world, AlignmentCondition::DifferentCollective));
    assert!(!check(&mut world, AlignmentCondition::NotSameCollective));

    // Different collective.
    world.object_mut(target).collective = Some(CLIPS);
    assert!(!check(&mut world, AlignmentCondition::SameCollective));
    assert!(check(&mut world, AlignmentCondition::DifferentCollective));
    assert!(check(&mut world, AlignmentCondition::NotSameCollective));
}

#[test]
fn alignment_specific_collective_overrides_condition() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(target).collective = Some(CLIPS);
    let baselines = StatBaselines::default();

    let filters = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::Alignment {
            entity: EntityRef::Target,
            condition: AlignmentCondition::SameCollective,
            collective: Some("clips".into()),
        },
    );
    assert!(eval_filters(&filters, &world, RuleCtx::acting(actor, target), &baselines));
}

#[test]
fn multi_resource_filter_has_and_semantics() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(target).inventory.apply_delta(GOLD, 3);
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, target);

    let both = compile_one_filter(&mut world, &tables, resource_filter(EntityRef::Target, &[("gold", 2), ("silver", 1)]));
    assert!(!eval_filters(&both, &world, ctx, &baselines), "missing silver");

    world.object_mut(target).inventory.apply_delta(SILVER, 1);
    assert!(eval_filters(&both, &world, ctx, &baselines));
}

#[test]
fn negated_multi_resource_filter_passes_when_missing_any() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, target);

    let negated = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::Not(Box::new(resource_filter(EntityRef::Target, &[("gold", 1), ("silver", 1)]))),
    );

    // Missing both → passes.
    assert!(eval_filters(&negated, &world, ctx, &baselines));

    // Missing one → still passes (NOT of the AND block).
    world.object_mut(target).inventory.apply_delta(GOLD, 1);
    assert!(eval_filters(&negated, &world, ctx, &baselines));

    // Has all → fails.
    world.object_mut(target).inventory.apply_delta(SILVER, 1);
    assert!(!eval_filters(&negated, &world, ctx, &baselines));
}

#[test]
fn or_filter_preserves_inner_and_semantics() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, target);

    let or = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::Or(vec![
            FilterSpec::Tag { entity: EntityRef::Target, tag: "marked".into() },
            resource_filter(EntityRef::Target, &[("gold", 1), ("silver", 1)]),
        ]),
    );

    assert!(!eval_filters(&or, &world, ctx, &baselines));

    // One of the AND-pair only: the multi-resource arm must NOT pass.
    world.object_mut(target).inventory.apply_delta(GOLD, 1);
    assert!(!eval_filters(&or, &world, ctx, &baselines));

    world.object_mut(target).inventory.apply_delta(SILVER, 1);
    assert!(eval_filters(&or, &world, ctx, &baselines));

    // First arm alone also satisfies the disjunction.
    world.object_mut(target).inventory.clear(&[GOLD, SILVER]);
    world.add_tag_raw(target, TAG_MARKED);
    assert!(eval_filters(&or, &world, ctx, &baselines));
}

#[test]
fn tag_prefix_and_shared_prefix_filters() {
    let mut world = make_world(2);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(agent(1, 1, 2)).unwrap();
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, target);

    let prefix = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::TagPrefix { entity: EntityRef::Target, prefix: "team:".into() },
    );
    assert!(!eval_filters(&prefix, &world, ctx, &baselines));
    world.add_tag_raw(target, TAG_TEAM_BLUE);
    assert!(eval_filters(&prefix, &world, ctx, &baselines));

    let shared = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::SharedTagPrefix { prefix: "team:".into() },
    );
    // Actor carries no team tag yet.
    assert!(!eval_filters(&shared, &world, ctx, &baselines));
    world.add_tag_raw(actor, TagId(2)); // team:red
    assert!(!eval_filters(&shared, &world, ctx, &baselines), "different team tags");
    world.add_tag_raw(actor, TAG_TEAM_BLUE);
    assert!(eval_filters(&shared, &world, ctx, &baselines));
}

#[test]
fn near_filter_uses_tag_index_within_radius() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 4, 4)).unwrap();
    let far_wall = world.place(object("wall", 0, 0)).unwrap();
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, actor);

    let near = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::Near {
            entity: EntityRef::Target,
            radius: 2,
            target_tag: "type:wall".into(),
            filters: vec![],
        },
    );
    assert!(!eval_filters(&near, &world, ctx, &baselines));
    world.place(object("wall", 5, 5)).unwrap();
    assert!(eval_filters(&near, &world, ctx, &baselines));
    let _ = far_wall;
}

#[test]
fn game_value_filter_thresholds() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    world.object_mut(actor).inventory.apply_delta(ENERGY, 5);
    let baselines = StatBaselines::default();
    let ctx = RuleCtx::acting(actor, actor);

    let gate = compile_one_filter(
        &mut world,
        &tables,
        FilterSpec::GameValue {
            entity: EntityRef::Target,
            value: ValueSpec::inventory("energy"),
            min: 5.0,
        },
    );
    assert!(eval_filters(&gate, &world, ctx, &baselines));
    world.object_mut(actor).inventory.apply_delta(ENERGY, -1);
    assert!(!eval_filters(&gate, &world, ctx, &baselines));
}

// ── Mutations ─────────────────────────────────────────────────────────────────

fn apply_specs(
    world: &mut World,
    tables: &Tables,
    rules: &Rules,
    specs: &[MutationSpec],
    ctx: RuleCtx,
) {
    let compiled: Vec<_> = {
        let mut resolve = tables.ctx(&mut world.stats);
        specs.iter().map(|m| m.compile(&mut resolve).unwrap()).collect()
    };
    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    for m in &compiled {
        apply_mutation(rules, world, m, ctx, &baselines, &mut rng);
    }
}

#[test]
fn resource_delta_clamps_and_counts() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::ResourceDelta {
            entity: EntityRef::Target,
            deltas: vec![("gold".into(), 2000)],
            remove_when_empty: false,
        }],
        RuleCtx::own(a),
    );
    assert_eq!(world.object(a).inventory.get(GOLD), 1000, "clamped at limit");
    let clamped = world.stats.lookup("inventory.clamped").unwrap();
    assert_eq!(world.stats.game(clamped), 1.0);
}

#[test]
fn withdraw_with_remove_when_empty_removes_object() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let agent_id = world.place(agent(0, 3, 2)).unwrap();
    let chest = world.place(object("wall", 2, 2)).unwrap();
    world.object_mut(chest).inventory.apply_delta(GOLD, 5);

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::ResourceTransfer {
            from: EntityRef::Target,
            to: EntityRef::Actor,
            resources: vec![("gold".into(), 5)],
            remove_when_empty: true,
        }],
        RuleCtx::acting(agent_id, chest),
    );

    assert_eq!(world.object(agent_id).inventory.get(GOLD), 5);
    assert!(world.live_object(chest).is_none(), "depleted chest removed");
    assert_eq!(world.at(2, 2), None);
}

#[test]
fn transfer_clamps_both_ends() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();
    let b = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(b).inventory.apply_delta(GOLD, 3);

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::ResourceTransfer {
            from: EntityRef::Target,
            to: EntityRef::Actor,
            resources: vec![("gold".into(), 10)],
            remove_when_empty: false,
        }],
        RuleCtx::acting(a, b),
    );
    assert_eq!(world.object(a).inventory.get(GOLD), 3, "only what the source held");
    assert_eq!(world.object(b).inventory.get(GOLD), 0);
}

#[test]
fn alignment_mutation_variants() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let actor = world.place(agent(0, 1, 1)).unwrap();
    let target = world.place(object("wall", 1, 2)).unwrap();
    world.object_mut(actor).collective = Some(COGS);

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::Alignment {
            entity: EntityRef::Target,
            align_to: crate::AlignTo::ActorCollective,
            collective: None,
        }],
        RuleCtx::acting(actor, target),
    );
    assert_eq!(world.object(target).collective, Some(COGS));

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::Alignment {
            entity: EntityRef::Target,
            align_to: crate::AlignTo::ActorCollective,
            collective: Some("clips".into()),
        }],
        RuleCtx::acting(actor, target),
    );
    assert_eq!(world.object(target).collective, Some(CLIPS), "explicit collective wins");

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::Alignment {
            entity: EntityRef::Target,
            align_to: crate::AlignTo::None,
            collective: None,
        }],
        RuleCtx::acting(actor, target),
    );
    assert_eq!(world.object(target).collective, None);
}

#[test]
fn clear_inventory_zeroes_limit_group() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();
    world.object_mut(a).inventory.apply_delta(GOLD, 5);
    world.object_mut(a).inventory.apply_delta(SILVER, 5);
    world.object_mut(a).inventory.apply_delta(ENERGY, 5);

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::ClearInventory {
            entity: EntityRef::Target,
            limit_group: "metals".into(),
        }],
        RuleCtx::own(a),
    );
    assert_eq!(world.object(a).inventory.get(GOLD), 0);
    assert_eq!(world.object(a).inventory.get(SILVER), 0);
    assert_eq!(world.object(a).inventory.get(ENERGY), 5);
}

#[test]
fn add_tag_fires_on_tag_add_bundle_once() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();

    // on_tag_add bundle: log a stat.
    let handler = {
        let mut resolve = tables.ctx(&mut world.stats);
        HandlerSpec {
            filters: vec![],
            mutations: vec![MutationSpec::Stats {
                stat: "tag.added".into(),
                delta: 1.0,
                scope: Scope::Game,
            }],
        }
        .compile("log", &mut resolve)
        .unwrap()
    };
    let mh = rules.add_multi_handler(MultiHandler {
        handlers: vec![handler],
        mode: DispatchMode::All,
    });

    let obj = world.place(object("wall", 1, 1)).unwrap();
    world.object_mut(obj).on_tag_add = Some(mh);

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::AddTag { entity: EntityRef::Target, tag: "marked".into() }],
        RuleCtx::own(obj),
    );
    // Idempotent re-add: no second firing.
    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::AddTag { entity: EntityRef::Target, tag: "marked".into() }],
        RuleCtx::own(obj),
    );

    let stat = world.stats.lookup("tag.added").unwrap();
    assert_eq!(world.stats.game(stat), 1.0);
    assert_eq!(world.tag_index.count(TAG_MARKED), 1);
}

#[test]
fn set_game_value_with_source_and_static_delta() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();
    world.object_mut(a).inventory.apply_delta(ENERGY, 10);
    world.object_mut(a).inventory.apply_delta(GOLD, 5);

    // Static delta.
    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::SetGameValue {
            value: ValueSpec::inventory("energy"),
            source: None,
            delta: 7.0,
            entity: EntityRef::Actor,
        }],
        RuleCtx::own(a),
    );
    assert_eq!(world.object(a).inventory.get(ENERGY), 17);

    // Evaluated source: add gold-count to energy.
    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::SetGameValue {
            value: ValueSpec::inventory("energy"),
            source: Some(ValueSpec::inventory("gold")),
            delta: 0.0,
            entity: EntityRef::Actor,
        }],
        RuleCtx::own(a),
    );
    assert_eq!(world.object(a).inventory.get(ENERGY), 22);
}

#[test]
fn query_inventory_mutation_hits_all_matches() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();
    let a = world.place(object("wire", 0, 0)).unwrap();
    let b = world.place(object("wire", 0, 2)).unwrap();

    apply_specs(
        &mut world,
        &tables,
        &rules,
        &[MutationSpec::QueryInventory {
            query: QuerySpec::tag("type:wire"),
            deltas: vec![("energy".into(), 3)],
        }],
        RuleCtx::own(a),
    );
    assert_eq!(world.object(a).inventory.get(ENERGY), 3);
    assert_eq!(world.object(b).inventory.get(ENERGY), 3);
}

// ── Multi-handler dispatch ────────────────────────────────────────────────────

fn gain_handler(world: &mut World, tables: &Tables, name: &str, needs_tag: Option<&str>, resource: &str, amount: i64) -> Handler {
    let mut resolve = tables.ctx(&mut world.stats);
    let filters = match needs_tag {
        Some(tag) => vec![FilterSpec::Tag { entity: EntityRef::Target, tag: tag.into() }],
        None => vec![],
    };
    HandlerSpec {
        filters,
        mutations: vec![MutationSpec::ResourceDelta {
            entity: EntityRef::Actor,
            deltas: vec![(resource.into(), amount)],
            remove_when_empty: false,
        }],
    }
    .compile(name, &mut resolve)
    .unwrap()
}

#[test]
fn first_match_stops_after_first_passing_handler() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();
    let chest = world.place(object("wall", 1, 2)).unwrap();

    let first = gain_handler(&mut world, &tables, "gold", None, "gold", 10);
    let second = gain_handler(&mut world, &tables, "silver", None, "silver", 5);
    let mh = rules.add_multi_handler(MultiHandler {
        handlers: vec![first, second],
        mode: DispatchMode::FirstMatch,
    });

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    assert!(run_multi_handler(&rules, &mut world, mh, RuleCtx::acting(a, chest), &baselines, &mut rng));
    assert_eq!(world.object(a).inventory.get(GOLD), 10);
    assert_eq!(world.object(a).inventory.get(SILVER), 0, "second handler skipped");
}

#[test]
fn first_match_falls_through_failed_filters() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();
    let chest = world.place(object("wall", 1, 2)).unwrap();

    let first = gain_handler(&mut world, &tables, "gold", Some("marked"), "gold", 10);
    let second = gain_handler(&mut world, &tables, "silver", None, "silver", 5);
    let mh = rules.add_multi_handler(MultiHandler {
        handlers: vec![first, second],
        mode: DispatchMode::FirstMatch,
    });

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    run_multi_handler(&rules, &mut world, mh, RuleCtx::acting(a, chest), &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(GOLD), 0);
    assert_eq!(world.object(a).inventory.get(SILVER), 5);
}

#[test]
fn all_mode_applies_every_passing_handler() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let a = world.place(agent(0, 1, 1)).unwrap();

    let first = gain_handler(&mut world, &tables, "gold", None, "gold", 10);
    let second = gain_handler(&mut world, &tables, "silver", None, "silver", 5);
    let mh = rules.add_multi_handler(MultiHandler {
        handlers: vec![first, second],
        mode: DispatchMode::All,
    });

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    run_multi_handler(&rules, &mut world, mh, RuleCtx::own(a), &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(GOLD), 10);
    assert_eq!(world.object(a).inventory.get(SILVER), 5);
}

// ── AOE ───────────────────────────────────────────────────────────────────────

fn energy_aoe(world: &mut World, tables: &Tables, radius: u16, same_collective: bool, amount: i64) -> crate::AoeBlueprint {
    let mut resolve = tables.ctx(&mut world.stats);
    let filters = if same_collective {
        vec![FilterSpec::Alignment {
            entity: EntityRef::Target,
            condition: AlignmentCondition::SameCollective,
            collective: None,
        }]
    } else {
        vec![]
    };
    AoeSpec {
        radius,
        filters,
        mutations: vec![MutationSpec::ResourceDelta {
            entity: EntityRef::Target,
            deltas: vec![("energy".into(), amount)],
            remove_when_empty: false,
        }],
        ..AoeSpec::default()
    }
    .compile(&mut resolve)
    .unwrap()
}

#[test]
fn aoe_alignment_gating() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let mut system = AoeSystem::default();

    let a = world.place(agent(0, 2, 2)).unwrap();
    world.object_mut(a).collective = Some(COGS);
    let source = world.place(object("wall", 3, 2)).unwrap();
    world.object_mut(source).collective = Some(COGS);

    let bp = energy_aoe(&mut world, &tables, 2, true, 10);
    rules.aoe_blueprints.push(bp);
    system.register(&world, source, AoeId(0), &rules.aoe_blueprints[0]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(ENERGY), 10);

    // Misaligned source: filter blocks.
    world.object_mut(source).collective = Some(CLIPS);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(ENERGY), 10);
}

#[test]
fn aoe_sources_stack() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let mut system = AoeSystem::default();

    let a = world.place(agent(0, 2, 2)).unwrap();
    let s1 = world.place(object("wall", 1, 2)).unwrap();
    let s2 = world.place(object("wall", 3, 2)).unwrap();

    let bp = energy_aoe(&mut world, &tables, 3, false, 5);
    rules.aoe_blueprints.push(bp);
    system.register(&world, s1, AoeId(0), &rules.aoe_blueprints[0]);
    system.register(&world, s2, AoeId(0), &rules.aoe_blueprints[0]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(ENERGY), 10);
}

#[test]
fn aoe_presence_deltas_fire_on_enter_and_exit() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let mut system = AoeSystem::default();

    let a = world.place(agent(0, 2, 2)).unwrap();
    let source = world.place(object("wall", 2, 4)).unwrap();

    let bp = {
        let mut resolve = tables.ctx(&mut world.stats);
        AoeSpec {
            radius: 2,
            presence_deltas: vec![("energy".into(), 4)],
            ..AoeSpec::default()
        }
        .compile(&mut resolve)
        .unwrap()
    };
    rules.aoe_blueprints.push(bp);
    system.register(&world, source, AoeId(0), &rules.aoe_blueprints[0]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);

    // Enter: +4, once.
    system.tick(&rules, &mut world, &baselines, &mut rng);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(ENERGY), 4);

    // Leave the region: -4, once.
    world.move_object(a, 7, 7).unwrap();
    system.tick(&rules, &mut world, &baselines, &mut rng);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(a).inventory.get(ENERGY), 0);
}

#[test]
fn static_aoe_region_skips_source_cell_without_effect_self() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut rules = Rules::default();
    let mut system = AoeSystem::default();

    let source = world.place(object("wall", 2, 2)).unwrap();
    let bp = energy_aoe(&mut world, &tables, 1, false, 5);
    rules.aoe_blueprints.push(bp);
    system.register(&world, source, AoeId(0), &rules.aoe_blueprints[0]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    system.tick(&rules, &mut world, &baselines, &mut rng);
    assert_eq!(world.object(source).inventory.get(ENERGY), 0, "source not self-affected");
}

// ── Events ────────────────────────────────────────────────────────────────────

fn wall_marking_event(name: &str, timesteps: Vec<u32>, max_targets: Option<usize>, fallback: Option<String>) -> EventSpec {
    EventSpec {
        name: name.to_string(),
        timesteps,
        target_tag: "type:wall".to_string(),
        filters: vec![],
        mutations: vec![MutationSpec::AddTag {
            entity: EntityRef::Target,
            tag: "marked".into(),
        }],
        max_targets,
        fallback,
    }
}

fn compiled_event_rules(world: &mut World, tables: &Tables, specs: &[EventSpec]) -> Rules {
    let mut rules = Rules::default();
    let mut resolve = tables.ctx(&mut world.stats);
    let (events, schedule) = compile_events(specs, &mut resolve).unwrap();
    rules.events = events;
    rules.event_schedule = schedule;
    rules
}

#[test]
fn event_max_targets_limits_selection() {
    let mut world = make_world(1);
    let tables = Tables::new();
    for c in 0..4 {
        world.place(object("wall", 0, c)).unwrap();
    }
    let rules = compiled_event_rules(&mut world, &tables, &[wall_marking_event("mark", vec![5], Some(1), None)]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    run_events_for_tick(&rules, &mut world, 4, &baselines, &mut rng);
    assert_eq!(world.tag_index.count(TAG_MARKED), 0, "not scheduled this tick");
    run_events_for_tick(&rules, &mut world, 5, &baselines, &mut rng);
    assert_eq!(world.tag_index.count(TAG_MARKED), 1);
    // First in tag-index insertion order gets it.
    assert!(world.object(world.tag_index.objects(TAG_WALL)[0]).has_tag(TAG_MARKED));
}

#[test]
fn event_max_targets_zero_means_unlimited() {
    let mut world = make_world(1);
    let tables = Tables::new();
    for c in 0..4 {
        world.place(object("wall", 0, c)).unwrap();
    }
    let rules = compiled_event_rules(&mut world, &tables, &[wall_marking_event("mark", vec![1], Some(0), None)]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    run_events_for_tick(&rules, &mut world, 1, &baselines, &mut rng);
    assert_eq!(world.tag_index.count(TAG_MARKED), 4);
}

#[test]
fn event_fallback_fires_when_nothing_passes() {
    let mut world = make_world(1);
    let tables = Tables::new();
    world.place(object("wire", 0, 0)).unwrap();

    // Primary targets walls (none exist); fallback marks wires.
    let primary = wall_marking_event("mark_walls", vec![2], None, Some("mark_wires".to_string()));
    let fallback = EventSpec {
        name: "mark_wires".to_string(),
        timesteps: vec![],
        target_tag: "type:wire".to_string(),
        filters: vec![],
        mutations: vec![MutationSpec::AddTag {
            entity: EntityRef::Target,
            tag: "marked".into(),
        }],
        max_targets: None,
        fallback: None,
    };
    let rules = compiled_event_rules(&mut world, &tables, &[primary, fallback]);

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    run_events_for_tick(&rules, &mut world, 2, &baselines, &mut rng);
    assert_eq!(world.tag_index.count(TAG_MARKED), 1);
}

#[test]
fn unknown_fallback_is_an_init_error() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let mut resolve = tables.ctx(&mut world.stats);
    let result = compile_events(
        &[wall_marking_event("mark", vec![1], None, Some("missing".to_string()))],
        &mut resolve,
    );
    assert!(result.is_err());
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[test]
fn closure_query_floods_through_adjacent_candidates() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let rules = Rules::default();

    // hub at (2,3); wires at (2,2), (2,4), (3,3); a disconnected wire at (0,0).
    let hub = world.place(object("hub", 2, 3)).unwrap();
    let w1 = world.place(object("wire", 2, 2)).unwrap();
    let w2 = world.place(object("wire", 2, 4)).unwrap();
    let w3 = world.place(object("wire", 3, 3)).unwrap();
    let stray = world.place(object("wire", 0, 0)).unwrap();

    let mq = {
        let mut resolve = tables.ctx(&mut world.stats);
        MaterializedQuerySpec {
            tag: "marked".to_string(),
            query: QuerySpec {
                source: QuerySourceSpec::Closure {
                    source: Box::new(QuerySpec::tag("type:hub")),
                    candidates: Box::new(QuerySpec::tag("type:wire")),
                    edge_filters: vec![FilterSpec::MaxDistance {
                        entity: EntityRef::Target,
                        query: QuerySpec::tag("type:hub"),
                        radius: 1,
                    }],
                },
                filters: vec![],
                max_items: None,
                order_by: OrderBy::First,
            },
        }
        .compile(&mut resolve)
        .unwrap()
    };

    let baselines = StatBaselines::default();
    let mut rng = SimRng::new(0);
    materialize(&rules, &mut world, &mq, &baselines, &mut rng);

    for id in [hub, w1, w2, w3] {
        assert!(world.object(id).has_tag(TAG_MARKED), "{id} should be in the closure");
    }
    assert!(!world.object(stray).has_tag(TAG_MARKED), "disconnected wire excluded");
}

#[test]
fn closure_discovery_order_is_breadth_first() {
    let mut world = make_world(1);
    let tables = Tables::new();

    // Two hubs, one hop-1 wire each, plus a hop-2 wire behind the first.
    // Nearest-first discovery expands both hubs before any wire, so the
    // hop-1 wires precede the hop-2 wire and follow hub order.
    let h1 = world.place(object("hub", 0, 0)).unwrap();
    let h2 = world.place(object("hub", 0, 8)).unwrap();
    let a1 = world.place(object("wire", 1, 1)).unwrap();
    let a2 = world.place(object("wire", 1, 7)).unwrap();
    let b1 = world.place(object("wire", 2, 2)).unwrap();

    let query = {
        let mut resolve = tables.ctx(&mut world.stats);
        QuerySpec {
            source: QuerySourceSpec::Closure {
                source: Box::new(QuerySpec::tag("type:hub")),
                candidates: Box::new(QuerySpec::tag("type:wire")),
                edge_filters: vec![],
            },
            filters: vec![],
            max_items: None,
            order_by: OrderBy::First,
        }
        .compile(&mut resolve)
        .unwrap()
    };
    let baselines = StatBaselines::default();
    assert_eq!(
        run_query(&world, &query, &baselines, None),
        vec![h1, h2, a1, a2, b1]
    );
}

#[test]
fn closure_diagonal_adjacency_counts() {
    let mut world = make_world(1);
    let tables = Tables::new();
    world.place(object("hub", 2, 2)).unwrap();
    let diag = world.place(object("wire", 3, 3)).unwrap();

    let query = {
        let mut resolve = tables.ctx(&mut world.stats);
        QuerySpec {
            source: QuerySourceSpec::Closure {
                source: Box::new(QuerySpec::tag("type:hub")),
                candidates: Box::new(QuerySpec::tag("type:wire")),
                edge_filters: vec![],
            },
            filters: vec![],
            max_items: None,
            order_by: OrderBy::First,
        }
        .compile(&mut resolve)
        .unwrap()
    };
    let baselines = StatBaselines::default();
    let result = run_query(&world, &query, &baselines, None);
    assert!(result.contains(&diag), "Chebyshev hop radius 1 includes diagonals");
}

#[test]
fn query_max_items_and_order() {
    let mut world = make_world(1);
    let tables = Tables::new();
    let a = world.place(object("wall", 0, 0)).unwrap();
    let b = world.place(object("wall", 0, 1)).unwrap();
    let c = world.place(object("wall", 0, 2)).unwrap();

    let make = |world: &mut World, max_items, order_by| {
        let mut resolve = tables.ctx(&mut world.stats);
        QuerySpec {
            source: QuerySourceSpec::Tag("type:wall".to_string()),
            filters: vec![],
            max_items,
            order_by,
        }
        .compile(&mut resolve)
        .unwrap()
    };
    let baselines = StatBaselines::default();

    let first_two = make(&mut world, Some(2), OrderBy::First);
    assert_eq!(run_query(&world, &first_two, &baselines, None), vec![a, b]);

    let last_two = make(&mut world, Some(2), OrderBy::Last);
    assert_eq!(run_query(&world, &last_two, &baselines, None), vec![c, b]);

    let unlimited = make(&mut world, Some(0), OrderBy::First);
    assert_eq!(run_query(&world, &unlimited, &baselines, None).len(), 3);

    let mut rng_a = SimRng::new(3);
    let mut rng_b = SimRng::new(3);
    let random = make(&mut world, None, OrderBy::Random);
    assert_eq!(
        run_query(&world, &random, &baselines, Some(&mut rng_a)),
        run_query(&world, &random, &baselines, Some(&mut rng_b)),
        "same seed, same shuffle"
    );
}

// ── Attack protocol ───────────────────────────────────────────────────────────

#[test]
fn attack_respects_defense_armor_and_loot() {
    let mut world = make_world(2);
    let tables = Tables::new();
    let attacker = world.place(agent(0, 1, 1)).unwrap();
    let defender = world.place(agent(1, 1, 2)).unwrap();

    let params = {
        let mut resolve = tables.ctx(&mut world.stats);
        crate::mutation::AttackSpec {
            weapon_resources: vec![("gold".into(), 1.0)],
            armor_resources: vec![("silver".into(), 1.0)],
            defense_resources: vec!["energy".into()],
            loot: vec!["gold".into()],
            freeze: 3,
            ..Default::default()
        }
        .compile(&mut resolve)
        .unwrap()
    };

    world.object_mut(attacker).inventory.apply_delta(GOLD, 2);

    // Consumable defense blocks and is spent.
    world.object_mut(defender).inventory.apply_delta(ENERGY, 1);
    assert!(!crate::resolve_attack(&mut world, attacker, defender, &params));
    assert_eq!(world.object(defender).inventory.get(ENERGY), 0);

    // Armor ≥ weapon blocks.
    world.object_mut(defender).inventory.apply_delta(SILVER, 2);
    assert!(!crate::resolve_attack(&mut world, attacker, defender, &params));

    // Weapon > armor lands: loot transfers, freeze applied.
    world.object_mut(defender).inventory.apply_delta(SILVER, -1);
    world.object_mut(defender).inventory.apply_delta(GOLD, 4);
    assert!(crate::resolve_attack(&mut world, attacker, defender, &params));
    assert_eq!(world.object(attacker).inventory.get(GOLD), 6);
    assert_eq!(world.object(defender).inventory.get(GOLD), 0);
    assert_eq!(world.object(defender).agent.as_ref().unwrap().freeze_remaining, 3);
}
