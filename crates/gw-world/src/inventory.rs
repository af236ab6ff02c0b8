//! Per-object inventories with limit-group capacity arithmetic.
//!
//! A limit group names a subset of resources and a `(min, max, modifiers)`
//! triple: `min` is the group's base capacity, `max` the hard ceiling, and
//! each modifier adds `amount × held(modifier_resource)` of extra capacity.
//! Every resource belongs to exactly one group after init (`group_of` is
//! precomputed so the per-mutation lookup is O(1)); resources without an
//! explicit group get a single-resource group at the default limit.
//!
//! All edits clamp silently — at zero below and at the group's effective
//! capacity above — and report what actually happened so callers can bump the
//! `inventory.clamped` stat.

use gw_core::ResourceId;

// ── Limit groups ──────────────────────────────────────────────────────────────

/// One capacity group over a subset of resources.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitGroup {
    pub resources: Vec<ResourceId>,
    /// Base capacity of the whole group.
    pub min: u32,
    /// Hard ceiling the modifiers can never exceed.
    pub max: u32,
    /// `(resource, amount)`: each held unit of `resource` adds `amount`
    /// capacity.  Negative amounts shrink capacity (floored at zero).
    pub modifiers: Vec<(ResourceId, i64)>,
}

impl LimitGroup {
    /// Single-resource group at a flat limit — the default for resources not
    /// named by any configured group.
    pub fn flat(resource: ResourceId, limit: u32) -> Self {
        Self {
            resources: vec![resource],
            min: limit,
            max: u16::MAX as u32,
            modifiers: Vec::new(),
        }
    }
}

/// The resolved limit table for one inventory: groups plus the
/// resource → group precompute.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InventoryLimits {
    groups: Vec<LimitGroup>,
    group_of: Vec<u16>,
}

impl InventoryLimits {
    /// Build from explicit groups, filling gaps with `flat(default_limit)`
    /// groups.  A resource named by two groups keeps the first (config order
    /// wins, matching handler registration semantics).
    pub fn new(num_resources: usize, explicit: Vec<LimitGroup>, default_limit: u32) -> Self {
        let mut group_of = vec![u16::MAX; num_resources];
        let mut groups = Vec::with_capacity(explicit.len());
        for group in explicit {
            let gi = groups.len() as u16;
            let mut claimed = Vec::with_capacity(group.resources.len());
            for &r in &group.resources {
                if group_of[r.index()] == u16::MAX {
                    group_of[r.index()] = gi;
                    claimed.push(r);
                }
            }
            if !claimed.is_empty() {
                groups.push(LimitGroup { resources: claimed, ..group });
            }
        }
        for r in 0..num_resources {
            if group_of[r] == u16::MAX {
                group_of[r] = groups.len() as u16;
                groups.push(LimitGroup::flat(ResourceId(r as u16), default_limit));
            }
        }
        Self { groups, group_of }
    }

    #[inline]
    pub fn group_for(&self, resource: ResourceId) -> &LimitGroup {
        &self.groups[self.group_of[resource.index()] as usize]
    }

    pub fn groups(&self) -> &[LimitGroup] {
        &self.groups
    }
}

// ── Inventory ─────────────────────────────────────────────────────────────────

/// Dense resource → amount storage with its limit table.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inventory {
    amounts: Vec<u32>,
    limits: InventoryLimits,
}

/// Outcome of a clamped delta.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// The signed amount actually applied after clamping.
    pub applied: i64,
    /// `true` if the request was cut short by a bound.
    pub clamped: bool,
}

impl Inventory {
    pub fn new(num_resources: usize, limits: InventoryLimits) -> Self {
        Self {
            amounts: vec![0; num_resources],
            limits,
        }
    }

    #[inline]
    pub fn get(&self, resource: ResourceId) -> u32 {
        self.amounts[resource.index()]
    }

    pub fn limits(&self) -> &InventoryLimits {
        &self.limits
    }

    /// Total held across a slice of resources (group-sum helper).
    pub fn total_of(&self, resources: &[ResourceId]) -> u64 {
        resources.iter().map(|r| self.amounts[r.index()] as u64).sum()
    }

    /// The group capacity currently in effect for `resource`'s group.
    pub fn effective_cap(&self, resource: ResourceId) -> u64 {
        let group = self.limits.group_for(resource);
        let mut cap = group.min as i64;
        for &(modifier, amount) in &group.modifiers {
            cap += amount * self.amounts[modifier.index()] as i64;
        }
        cap.clamp(0, group.max as i64) as u64
    }

    /// Apply a signed delta to `resource`, clamping at zero and at the
    /// group's effective capacity.  Never fails.
    pub fn apply_delta(&mut self, resource: ResourceId, delta: i64) -> DeltaOutcome {
        let held = self.amounts[resource.index()] as i64;
        let mut applied = delta;

        if delta < 0 {
            applied = applied.max(-held);
        } else if delta > 0 {
            let group = self.limits.group_for(resource);
            let cap = self.effective_cap(resource) as i64;
            let group_total = self.total_of(&group.resources) as i64;
            let headroom = (cap - group_total).max(0);
            applied = applied.min(headroom);
        }

        self.amounts[resource.index()] = (held + applied) as u32;
        DeltaOutcome {
            applied,
            clamped: applied != delta,
        }
    }

    /// Set every resource of `resources` to zero.  Returns the total removed.
    pub fn clear(&mut self, resources: &[ResourceId]) -> u64 {
        let mut removed = 0u64;
        for &r in resources {
            removed += self.amounts[r.index()] as u64;
            self.amounts[r.index()] = 0;
        }
        removed
    }

    /// `(resource, amount)` pairs for every non-zero slot, ascending id.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (ResourceId, u32)> + '_ {
        self.amounts
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a > 0)
            .map(|(i, &a)| (ResourceId(i as u16), a))
    }

    /// `true` if every slot is zero.
    pub fn is_empty(&self) -> bool {
        self.amounts.iter().all(|&a| a == 0)
    }
}
