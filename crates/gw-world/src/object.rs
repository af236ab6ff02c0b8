//! The object arena entry and agent-specific state.
//!
//! Objects reference blueprints (handlers, AOEs) and each other by dense ids,
//! never by pointer — the arena is the only owner, and removal is a tombstone
//! (`alive = false`) so ids stay stable for the whole episode.

use gw_core::{AgentId, AoeId, CollectiveId, MultiHandlerId, ObjectId, TagId, TypeId, VibeId};

use crate::inventory::Inventory;
use crate::tags::TagSet;

// ── AgentState ────────────────────────────────────────────────────────────────

/// Facing direction as a `(d_row, d_col)` unit step.  Updated on every
/// successful move; attack targeting is computed relative to it.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Facing {
    pub d_row: i8,
    pub d_col: i8,
}

impl Facing {
    /// Agents start facing north (up the grid).
    pub const NORTH: Facing = Facing { d_row: -1, d_col: 0 };

    /// The facing rotated 90° clockwise — the "offset" axis for attacks.
    #[inline]
    pub fn perpendicular(self) -> Facing {
        Facing {
            d_row: self.d_col,
            d_col: -self.d_row,
        }
    }
}

/// Extra state carried only by agent objects.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentState {
    /// Dense agent index in `[0..N)`; index into the shared buffers.
    pub agent_id: AgentId,
    /// Group/team the agent was spawned into.
    pub group_id: u16,
    /// Ticks of forced-noop remaining.  Decremented at end of tick.
    pub freeze_remaining: u32,
    /// Non-vibe action id resolved last tick.
    pub last_action: u16,
    pub last_action_success: bool,
    pub last_reward: f32,
    pub episode_reward: f32,
    pub facing: Facing,
    /// Role id emitted as the `agent:role` token when the agent's role
    /// weights are concentrated on a single role; `None` for mixed roles.
    pub role_token: Option<u8>,
}

impl AgentState {
    pub fn new(agent_id: AgentId, group_id: u16) -> Self {
        Self {
            agent_id,
            group_id,
            freeze_remaining: 0,
            last_action: 0,
            last_action_success: false,
            last_reward: 0.0,
            episode_reward: 0.0,
            facing: Facing::NORTH,
            role_token: None,
        }
    }

    #[inline]
    pub fn frozen(&self) -> bool {
        self.freeze_remaining > 0
    }
}

// ── GridObject ────────────────────────────────────────────────────────────────

/// One entity on the grid.
///
/// The variant set (agent / wall / chest / assembler / generic) is carried by
/// `type_id` plus the optional `agent` payload; behavior differences are
/// entirely data-driven through the attached handler blueprints, so there is
/// no behavioral enum to keep in sync with configs.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridObject {
    pub id: ObjectId,
    pub type_id: TypeId,
    pub row: u16,
    pub col: u16,
    pub tags: TagSet,
    pub inventory: Inventory,
    pub vibe: VibeId,
    pub collective: Option<CollectiveId>,
    pub alive: bool,

    // ── Blueprint references ──────────────────────────────────────────────
    /// FirstMatch bundle run when an agent walks into this object.
    pub on_use: Option<MultiHandlerId>,
    /// All-mode bundle run every tick with the object as both actor and target.
    pub on_tick: Option<MultiHandlerId>,
    /// All-mode bundle run when a tag is added to this object.
    pub on_tag_add: Option<MultiHandlerId>,
    /// All-mode bundle run when a tag is removed from this object.
    pub on_tag_remove: Option<MultiHandlerId>,
    /// AOE blueprints this object sources.
    pub aoes: Vec<AoeId>,

    /// Agent payload; `None` for every non-agent object.
    pub agent: Option<AgentState>,
}

impl GridObject {
    #[inline]
    pub fn is_agent(&self) -> bool {
        self.agent.is_some()
    }

    #[inline]
    pub fn has_tag(&self, tag: TagId) -> bool {
        self.tags.contains(tag)
    }

    /// Chebyshev distance to another object.
    #[inline]
    pub fn chebyshev_to(&self, other: &GridObject) -> u16 {
        let dr = (self.row as i32 - other.row as i32).unsigned_abs();
        let dc = (self.col as i32 - other.col as i32).unsigned_abs();
        dr.max(dc) as u16
    }
}
