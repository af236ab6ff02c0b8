//! The dense observation feature table.
//!
//! Feature ids are `u8`, assigned once at init in a fixed order: built-in
//! features first, then the configured tag features (ascending tag id), then
//! one inventory feature per resource (ascending resource id), then the
//! configured game-value features (config order).  The order is the contract
//! — global tokens are emitted in ascending feature id, and external
//! consumers key replay data off this table.

use gw_core::{FeatureId, GwError, GwResult, ResourceId, TagId};

/// Resolved feature table.
#[derive(Clone, Debug)]
pub struct FeatureTable {
    names: Vec<String>,

    // ── Spatial built-ins ─────────────────────────────────────────────────
    pub type_id: FeatureId,
    pub agent_id: FeatureId,
    pub vibe: FeatureId,
    pub agent_role: FeatureId,
    pub territory: FeatureId,
    pub aoe_mask: FeatureId,

    // ── Global built-ins ──────────────────────────────────────────────────
    pub episode_completion_pct: FeatureId,
    pub last_action: FeatureId,
    pub last_reward: FeatureId,
    pub goal_obs: FeatureId,
    pub lp_north: FeatureId,
    pub lp_south: FeatureId,
    pub lp_east: FeatureId,
    pub lp_west: FeatureId,

    /// `(tag, feature)` pairs for tag-bit tokens, ascending tag id.
    tag_features: Vec<(TagId, FeatureId)>,
    /// One feature per resource, indexed by resource id.
    inv_features: Vec<FeatureId>,
    /// One feature per configured game-value observation, config order.
    value_features: Vec<FeatureId>,
}

impl FeatureTable {
    /// Build the table.  `value_names` are the pre-built feature names of
    /// the configured game-value observations (e.g. `inv:own:gold`).
    pub fn build(
        resource_names: &[String],
        tag_features: &[(TagId, String)],
        value_names: &[String],
    ) -> GwResult<FeatureTable> {
        let mut names: Vec<String> = Vec::new();
        let mut next = |name: String, names: &mut Vec<String>| -> GwResult<FeatureId> {
            // 0xFE/0xFF never become feature ids: 0xFF is the empty token
            // and keeping clear of 0xFE avoids loc/feature confusion in
            // debug tooling.
            if names.len() >= 0xFE {
                return Err(GwError::TableOverflow {
                    what: "observation features",
                    got: names.len() + 1,
                    max: 0xFE,
                });
            }
            let id = FeatureId(names.len() as u8);
            names.push(name);
            Ok(id)
        };

        let type_id = next("type_id".into(), &mut names)?;
        let agent_id = next("agent_id".into(), &mut names)?;
        let vibe = next("vibe".into(), &mut names)?;
        let agent_role = next("agent:role".into(), &mut names)?;
        let territory = next("territory".into(), &mut names)?;
        let aoe_mask = next("aoe_mask".into(), &mut names)?;
        let episode_completion_pct = next("episode_completion_pct".into(), &mut names)?;
        let last_action = next("last_action".into(), &mut names)?;
        let last_reward = next("last_reward".into(), &mut names)?;
        let goal_obs = next("goal_obs".into(), &mut names)?;
        let lp_north = next("lp:north".into(), &mut names)?;
        let lp_south = next("lp:south".into(), &mut names)?;
        let lp_east = next("lp:east".into(), &mut names)?;
        let lp_west = next("lp:west".into(), &mut names)?;

        let mut tags = Vec::with_capacity(tag_features.len());
        for (tag, tag_name) in tag_features {
            let id = next(format!("tag:{tag_name}"), &mut names)?;
            tags.push((*tag, id));
        }

        let mut inv = Vec::with_capacity(resource_names.len());
        for resource in resource_names {
            inv.push(next(format!("inv:{resource}"), &mut names)?);
        }

        let mut values = Vec::with_capacity(value_names.len());
        for value_name in value_names {
            values.push(next(value_name.clone(), &mut names)?);
        }

        Ok(FeatureTable {
            names,
            type_id,
            agent_id,
            vibe,
            agent_role,
            territory,
            aoe_mask,
            episode_completion_pct,
            last_action,
            last_reward,
            goal_obs,
            lp_north,
            lp_south,
            lp_east,
            lp_west,
            tag_features: tags,
            inv_features: inv,
            value_features: values,
        })
    }

    pub fn name(&self, id: FeatureId) -> &str {
        &self.names[id.index()]
    }

    /// Feature id by name — external consumers resolving replay features.
    pub fn id_of(&self, name: &str) -> Option<FeatureId> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| FeatureId(i as u8))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn tag_features(&self) -> &[(TagId, FeatureId)] {
        &self.tag_features
    }

    #[inline]
    pub fn inventory_feature(&self, resource: ResourceId) -> FeatureId {
        self.inv_features[resource.index()]
    }

    #[inline]
    pub fn value_feature(&self, index: usize) -> FeatureId {
        self.value_features[index]
    }
}
