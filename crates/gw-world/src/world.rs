//! The `World`: cell map, object arena, and every table the rule machine edits.
//!
//! # Invariants
//!
//! - At most one live object per cell; `cells[idx(o.row, o.col)] == o.id` for
//!   every live object.
//! - `tag_index[t]` equals the set of live objects whose bitset contains `t`.
//! - Object ids are arena indices, assigned at placement and never reused;
//!   removal tombstones (`alive = false`) and clears the cell + tag index.
//!
//! Tag-edit methods here are the *raw* hooks: they keep the bitset and index
//! in sync but do not dispatch `on_tag_add` / `on_tag_remove` handlers — the
//! rules layer wraps them so blueprint dispatch stays outside this crate.

use thiserror::Error;

use gw_core::{AgentId, ObjectId, TagId, Tick, TypeId};

use crate::collective::Collective;
use crate::object::GridObject;
use crate::stats::Stats;
use crate::tags::TagIndex;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a placement or move was refused.  These are silent at step time
/// (the acting agent just fails); only init treats them as fatal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum PlaceError {
    #[error("cell ({0}, {1}) is occupied")]
    CellOccupied(u16, u16),

    #[error("cell ({0}, {1}) is out of bounds")]
    OutOfBounds(i32, i32),
}

/// Distance metric for neighborhood queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DistanceMetric {
    Chebyshev,
    Euclidean,
}

// ── World ─────────────────────────────────────────────────────────────────────

/// All mutable simulation state apart from the shared I/O buffers.
pub struct World {
    width: u16,
    height: u16,
    /// Dense cell → object map; `ObjectId::INVALID` = empty.
    cells: Vec<ObjectId>,
    /// Arena; `ObjectId` is the index.  Tombstoned entries stay in place.
    objects: Vec<GridObject>,
    /// Live count per `TypeId`, kept in sync by place/remove.
    type_counts: Vec<u32>,
    /// `AgentId` → arena id of the agent object.
    agent_objects: Vec<ObjectId>,

    pub tag_index: TagIndex,
    pub collectives: Vec<Collective>,
    pub stats: Stats,
    pub tick: Tick,

    // Resolved name tables, kept for display/snapshot purposes only — the
    // step path works in dense ids throughout.
    type_names: Vec<String>,
    tag_names: Vec<String>,
    resource_names: Vec<String>,
}

impl World {
    pub fn new(
        width: u16,
        height: u16,
        type_names: Vec<String>,
        tag_names: Vec<String>,
        resource_names: Vec<String>,
        collectives: Vec<Collective>,
        num_agents: usize,
    ) -> Self {
        let num_collectives = collectives.len();
        Self {
            width,
            height,
            cells: vec![ObjectId::INVALID; width as usize * height as usize],
            objects: Vec::new(),
            type_counts: vec![0; type_names.len()],
            agent_objects: vec![ObjectId::INVALID; num_agents],
            tag_index: TagIndex::new(tag_names.len()),
            collectives,
            stats: Stats::new(num_agents, num_collectives),
            tick: Tick::ZERO,
            type_names,
            tag_names,
            resource_names,
        }
    }

    // ── Dimensions & name tables ──────────────────────────────────────────

    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn type_name(&self, type_id: TypeId) -> &str {
        &self.type_names[type_id.index()]
    }

    pub fn tag_name(&self, tag: TagId) -> &str {
        &self.tag_names[tag.index()]
    }

    pub fn resource_names(&self) -> &[String] {
        &self.resource_names
    }

    pub fn num_agents(&self) -> usize {
        self.agent_objects.len()
    }

    // ── Cell map ──────────────────────────────────────────────────────────

    #[inline]
    fn idx(&self, row: u16, col: u16) -> usize {
        row as usize * self.width as usize + col as usize
    }

    #[inline]
    pub fn in_bounds(&self, row: i32, col: i32) -> bool {
        row >= 0 && col >= 0 && (row as u16) < self.height && (col as u16) < self.width
    }

    /// Object occupying `(row, col)`, if any.
    #[inline]
    pub fn at(&self, row: u16, col: u16) -> Option<ObjectId> {
        let id = self.cells[self.idx(row, col)];
        (id != ObjectId::INVALID).then_some(id)
    }

    // ── Arena access ──────────────────────────────────────────────────────

    #[inline]
    pub fn object(&self, id: ObjectId) -> &GridObject {
        &self.objects[id.index()]
    }

    #[inline]
    pub fn object_mut(&mut self, id: ObjectId) -> &mut GridObject {
        &mut self.objects[id.index()]
    }

    /// `Some` only while the object is alive.
    #[inline]
    pub fn live_object(&self, id: ObjectId) -> Option<&GridObject> {
        self.objects.get(id.index()).filter(|o| o.alive)
    }

    /// All live objects in ascending id order — the canonical deterministic
    /// enumeration for on-tick and AOE processing.
    pub fn live_objects(&self) -> impl Iterator<Item = &GridObject> {
        self.objects.iter().filter(|o| o.alive)
    }

    pub fn live_object_ids(&self) -> Vec<ObjectId> {
        self.objects
            .iter()
            .filter(|o| o.alive)
            .map(|o| o.id)
            .collect()
    }

    /// Live count for one type — O(1).
    #[inline]
    pub fn count_of_type(&self, type_id: TypeId) -> u32 {
        self.type_counts.get(type_id.index()).copied().unwrap_or(0)
    }

    // ── Agents ────────────────────────────────────────────────────────────

    #[inline]
    pub fn agent_object_id(&self, agent: AgentId) -> ObjectId {
        self.agent_objects[agent.index()]
    }

    pub fn agent_object(&self, agent: AgentId) -> &GridObject {
        self.object(self.agent_objects[agent.index()])
    }

    pub fn agent_object_mut(&mut self, agent: AgentId) -> &mut GridObject {
        let id = self.agent_objects[agent.index()];
        self.object_mut(id)
    }

    // ── Placement / movement / removal ────────────────────────────────────

    /// Place a new object, assigning its arena id.  Fails if the target cell
    /// is occupied or out of bounds; the object is not stored on failure.
    pub fn place(&mut self, mut obj: GridObject) -> Result<ObjectId, PlaceError> {
        if !self.in_bounds(obj.row as i32, obj.col as i32) {
            return Err(PlaceError::OutOfBounds(obj.row as i32, obj.col as i32));
        }
        let idx = self.idx(obj.row, obj.col);
        if self.cells[idx] != ObjectId::INVALID {
            return Err(PlaceError::CellOccupied(obj.row, obj.col));
        }

        let id = ObjectId(self.objects.len() as u32);
        obj.id = id;
        obj.alive = true;
        self.cells[idx] = id;
        if obj.type_id.index() >= self.type_counts.len() {
            self.type_counts.resize(obj.type_id.index() + 1, 0);
        }
        self.type_counts[obj.type_id.index()] += 1;
        for tag in obj.tags.iter() {
            self.tag_index.insert(tag, id);
        }
        if let Some(agent) = &obj.agent {
            self.agent_objects[agent.agent_id.index()] = id;
        }
        self.objects.push(obj);
        Ok(id)
    }

    /// Move a live object to `(new_row, new_col)`, updating the cell map
    /// atomically.
    pub fn move_object(&mut self, id: ObjectId, new_row: i32, new_col: i32) -> Result<(), PlaceError> {
        if !self.in_bounds(new_row, new_col) {
            return Err(PlaceError::OutOfBounds(new_row, new_col));
        }
        let (nr, nc) = (new_row as u16, new_col as u16);
        let to = self.idx(nr, nc);
        if self.cells[to] != ObjectId::INVALID {
            return Err(PlaceError::CellOccupied(nr, nc));
        }
        let (or, oc) = {
            let obj = &self.objects[id.index()];
            (obj.row, obj.col)
        };
        let from = self.idx(or, oc);
        self.cells[from] = ObjectId::INVALID;
        self.cells[to] = id;
        let obj = &mut self.objects[id.index()];
        obj.row = nr;
        obj.col = nc;
        Ok(())
    }

    /// Tombstone an object: clear its cell, drop it from the tag index, and
    /// return the tags it carried so the caller can fire `on_tag_remove`
    /// dispatch for each.
    pub fn remove_object(&mut self, id: ObjectId) -> Vec<TagId> {
        let obj = &mut self.objects[id.index()];
        if !obj.alive {
            return Vec::new();
        }
        obj.alive = false;
        let (row, col) = (obj.row, obj.col);
        let removed: Vec<TagId> = obj.tags.iter().collect();
        let type_id = obj.type_id;

        let idx = self.idx(row, col);
        if self.cells[idx] == id {
            self.cells[idx] = ObjectId::INVALID;
        }
        self.type_counts[type_id.index()] -= 1;
        for &tag in &removed {
            self.tag_index.remove(tag, id);
        }
        removed
    }

    // ── Raw tag edits (index sync, no handler dispatch) ───────────────────

    /// Add `tag` to a live object.  Returns `true` if newly added (the
    /// caller fires `on_tag_add` dispatch exactly when this returns true).
    pub fn add_tag_raw(&mut self, id: ObjectId, tag: TagId) -> bool {
        let obj = &mut self.objects[id.index()];
        if !obj.alive || !obj.tags.insert(tag) {
            return false;
        }
        self.tag_index.insert(tag, id);
        true
    }

    /// Remove `tag` from a live object.  Returns `true` if it was present.
    pub fn remove_tag_raw(&mut self, id: ObjectId, tag: TagId) -> bool {
        let obj = &mut self.objects[id.index()];
        if !obj.alive || !obj.tags.remove(tag) {
            return false;
        }
        self.tag_index.remove(tag, id);
        true
    }

    // ── Neighborhood queries ──────────────────────────────────────────────

    /// Cells within `radius` of `(row, col)` under `metric`, in row-major
    /// order (the deterministic traversal every consumer relies on).
    /// The center cell is included.
    pub fn cells_within(
        &self,
        row: u16,
        col: u16,
        radius: u16,
        metric: DistanceMetric,
    ) -> Vec<(u16, u16)> {
        let r = radius as i32;
        let (cr, cc) = (row as i32, col as i32);
        let r2 = r * r;
        let mut out = Vec::new();
        for dr in -r..=r {
            for dc in -r..=r {
                if metric == DistanceMetric::Euclidean && dr * dr + dc * dc > r2 {
                    continue;
                }
                let (nr, nc) = (cr + dr, cc + dc);
                if self.in_bounds(nr, nc) {
                    out.push((nr as u16, nc as u16));
                }
            }
        }
        out
    }

    /// Live objects within `radius` of `(row, col)`, row-major cell order.
    pub fn objects_within(
        &self,
        row: u16,
        col: u16,
        radius: u16,
        metric: DistanceMetric,
    ) -> Vec<ObjectId> {
        self.cells_within(row, col, radius, metric)
            .into_iter()
            .filter_map(|(r, c)| self.at(r, c))
            .collect()
    }

    /// Sum of `resource` across all live objects — the `GAME`-scoped
    /// inventory read.  O(live objects); only evaluated on demand.
    pub fn game_inventory_total(&self, resource: gw_core::ResourceId) -> u64 {
        self.live_objects()
            .map(|o| o.inventory.get(resource) as u64)
            .sum()
    }
}
