//! Name → dense-id resolution used while compiling blueprints at init.
//!
//! Specs carry human-readable names (resources, tags, collectives, vibes,
//! types); compilation resolves every one of them exactly once.  Unknown
//! names are `ConfigInvalid`-class errors — nothing is resolved lazily, so
//! the step path never sees a string.

use rustc_hash::FxHashMap;

use gw_core::{CollectiveId, GwError, GwResult, ResourceId, TagId, TypeId, VibeId};
use gw_world::{Stats, TagSet};

/// Borrowed resolution tables, built by the simulation builder before any
/// blueprint is compiled.
pub struct ResolveCtx<'a> {
    pub resources: &'a FxHashMap<String, ResourceId>,
    pub tags: &'a FxHashMap<String, TagId>,
    /// Sorted tag names, indexable by `TagId` — prefix masks are built from
    /// this view.
    pub tag_names: &'a [String],
    pub collectives: &'a FxHashMap<String, CollectiveId>,
    pub vibes: &'a FxHashMap<String, VibeId>,
    pub types: &'a FxHashMap<String, TypeId>,
    /// Limit-group name → resource ids (for clear-inventory mutations).
    pub limit_groups: &'a FxHashMap<String, Vec<ResourceId>>,
    /// Stat interner — compilation pre-interns every referenced stat name.
    pub stats: &'a mut Stats,
}

impl ResolveCtx<'_> {
    pub fn resource(&self, name: &str) -> GwResult<ResourceId> {
        self.resources
            .get(name)
            .copied()
            .ok_or_else(|| GwError::UnknownResource(name.to_string()))
    }

    pub fn tag(&self, name: &str) -> GwResult<TagId> {
        self.tags
            .get(name)
            .copied()
            .ok_or_else(|| GwError::UnknownTag(name.to_string()))
    }

    pub fn collective(&self, name: &str) -> GwResult<CollectiveId> {
        self.collectives
            .get(name)
            .copied()
            .ok_or_else(|| GwError::UnknownCollective(name.to_string()))
    }

    pub fn vibe(&self, name: &str) -> GwResult<VibeId> {
        self.vibes
            .get(name)
            .copied()
            .ok_or_else(|| GwError::UnknownVibe(name.to_string()))
    }

    pub fn type_id(&self, name: &str) -> GwResult<TypeId> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| GwError::Config(format!("unknown object type '{name}'")))
    }

    pub fn limit_group(&self, name: &str) -> GwResult<Vec<ResourceId>> {
        self.limit_groups
            .get(name)
            .cloned()
            .ok_or_else(|| GwError::Config(format!("unknown limit group '{name}'")))
    }

    /// Bitmask over every known tag whose name starts with `prefix`.
    /// An empty mask is legal (the filter then never passes).
    pub fn tag_prefix_mask(&self, prefix: &str) -> TagSet {
        self.tag_names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(prefix))
            .map(|(i, _)| TagId(i as u16))
            .collect()
    }
}
