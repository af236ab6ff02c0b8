//! Collectives — named shared resource pools.
//!
//! A collective owns an inventory with the same limit arithmetic as any
//! object inventory.  Objects opt in via `collective: Some(id)`; alignment
//! filters compare actor and target membership, and `COLLECTIVE`-scoped
//! values and mutations read/write the pool.

use gw_core::ResourceId;

use crate::inventory::{DeltaOutcome, Inventory};

/// One shared pool.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Collective {
    pub name: String,
    pub inventory: Inventory,
}

impl Collective {
    pub fn new(name: impl Into<String>, inventory: Inventory) -> Self {
        Self {
            name: name.into(),
            inventory,
        }
    }

    /// Clamped deposit; returns what was actually added.
    pub fn deposit(&mut self, resource: ResourceId, amount: u32) -> DeltaOutcome {
        self.inventory.apply_delta(resource, amount as i64)
    }

    /// Clamped withdrawal; returns what was actually removed (negative).
    pub fn withdraw(&mut self, resource: ResourceId, amount: u32) -> DeltaOutcome {
        self.inventory.apply_delta(resource, -(amount as i64))
    }

    #[inline]
    pub fn get(&self, resource: ResourceId) -> u32 {
        self.inventory.get(resource)
    }

    /// Zero every resource in the named limit-group resource list.
    pub fn clear(&mut self, resources: &[ResourceId]) -> u64 {
        self.inventory.clear(resources)
    }
}
