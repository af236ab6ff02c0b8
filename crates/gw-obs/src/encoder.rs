//! The per-agent token stream writer.
//!
//! Token layout per agent: spatial tokens for every visible object in
//! row-major window order, then (if enabled) one territory/AOE-mask token per
//! owned window cell inline with the spatial pass, then global tokens in
//! ascending feature-id order, then `(0xFF, 0, 0)` padding.  A full stream
//! truncates — the window pass and the global pass both stop writing when
//! `num_tokens` is reached.

use gw_core::{AgentId, FeatureId, GwError, GwResult, ObsThreads, TagId};
use gw_rules::{AoeSystem, GameValue, Rules, StatBaselines};
use gw_world::World;

use crate::features::FeatureTable;
use crate::packed::PackedCoordinate;
use crate::territory::{TerritoryField, TieBreak};

/// Bytes per observation token.
pub const TOKEN_BYTES: usize = 3;

// ── Spec ──────────────────────────────────────────────────────────────────────

/// Which global tokens are emitted.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalObsFlags {
    pub episode_completion_pct: bool,
    pub last_action: bool,
    pub last_reward: bool,
    pub goal_obs: bool,
    pub local_position: bool,
}

impl Default for GlobalObsFlags {
    fn default() -> Self {
        Self {
            episode_completion_pct: true,
            last_action: true,
            last_reward: true,
            goal_obs: false,
            local_position: false,
        }
    }
}

/// Everything the encoder needs at construction, already resolved.
pub struct ObsSpec {
    pub width: u16,
    pub height: u16,
    pub num_tokens: usize,
    pub global: GlobalObsFlags,
    pub territory: bool,
    pub aoe_mask: bool,
    /// `(tag, tag name)` pairs emitted as 1-bit spatial tokens.
    pub tag_features: Vec<(TagId, String)>,
    /// `(feature name, value)` — extra global tokens from game values.
    pub obs_values: Vec<(String, GameValue)>,
    pub threads: ObsThreads,
}

// ── Encoder ───────────────────────────────────────────────────────────────────

pub struct ObsEncoder {
    width: u16,
    height: u16,
    num_tokens: usize,
    global: GlobalObsFlags,
    territory: bool,
    aoe_mask: bool,
    obs_values: Vec<GameValue>,
    features: FeatureTable,
    /// `None` runs the single-threaded reference path.
    pool: Option<rayon::ThreadPool>,
}

impl ObsEncoder {
    pub fn new(spec: ObsSpec, resource_names: &[String]) -> GwResult<ObsEncoder> {
        for (what, dim) in [("width", spec.width), ("height", spec.height)] {
            if dim == 0 || dim > PackedCoordinate::MAX_DIM || dim % 2 == 0 {
                return Err(GwError::Config(format!(
                    "observation {what} must be odd and at most {}, got {dim}",
                    PackedCoordinate::MAX_DIM
                )));
            }
        }

        let value_names: Vec<String> = spec.obs_values.iter().map(|(n, _)| n.clone()).collect();
        let features = FeatureTable::build(resource_names, &spec.tag_features, &value_names)?;

        let pool = match spec.threads {
            ObsThreads::Serial => None,
            ObsThreads::Workers(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| GwError::Config(format!("observation thread pool: {e}")))?,
            ),
        };
        if let Some(pool) = &pool {
            log::debug!("observation encoder: {} worker threads", pool.current_num_threads());
        }

        Ok(ObsEncoder {
            width: spec.width,
            height: spec.height,
            num_tokens: spec.num_tokens,
            global: spec.global,
            territory: spec.territory,
            aoe_mask: spec.aoe_mask,
            obs_values: spec.obs_values.into_iter().map(|(_, v)| v).collect(),
            features,
            pool,
        })
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.num_tokens * TOKEN_BYTES
    }

    /// Encode every agent's observation into `out`
    /// (`num_agents × num_tokens × 3` bytes).
    ///
    /// Read-only over the world; output is identical for any thread count.
    pub fn encode_all(
        &self,
        world: &World,
        rules: &Rules,
        aoes: &AoeSystem,
        baselines: &StatBaselines,
        tick: u32,
        max_steps: u32,
        out: &mut [u8],
    ) {
        let stride = self.stride();
        debug_assert_eq!(out.len(), world.num_agents() * stride);

        let field = (self.territory || self.aoe_mask)
            .then(|| TerritoryField::build(world, rules, aoes));
        let field = field.as_ref();

        match &self.pool {
            None => {
                for (i, chunk) in out.chunks_mut(stride).enumerate() {
                    self.encode_agent(AgentId(i as u32), world, baselines, field, tick, max_steps, chunk);
                }
            }
            Some(pool) => pool.install(|| {
                use rayon::prelude::*;
                out.par_chunks_mut(stride).enumerate().for_each(|(i, chunk)| {
                    self.encode_agent(AgentId(i as u32), world, baselines, field, tick, max_steps, chunk);
                });
            }),
        }
    }

    // ── Per-agent stream ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn encode_agent(
        &self,
        agent: AgentId,
        world: &World,
        baselines: &StatBaselines,
        field: Option<&TerritoryField>,
        tick: u32,
        max_steps: u32,
        chunk: &mut [u8],
    ) {
        let mut w = TokenWriter::new(chunk, self.num_tokens);

        let obj_id = world.agent_object_id(agent);
        let Some(me) = world.live_object(obj_id) else {
            w.pad();
            return;
        };
        let my_collective = me.collective;

        let half_w = (self.width / 2) as i32;
        let half_h = (self.height / 2) as i32;
        let top = me.row as i32 - half_h;
        let left = me.col as i32 - half_w;

        // ── Spatial pass: row-major window traversal ──────────────────────
        for wr in 0..self.height {
            for wc in 0..self.width {
                if !self.visible(wr, wc) {
                    continue;
                }
                let (gr, gc) = (top + wr as i32, left + wc as i32);
                if !world.in_bounds(gr, gc) {
                    continue;
                }
                let loc = PackedCoordinate::pack(wr as u8, wc as u8);

                if let Some(occupant) = world.at(gr as u16, gc as u16) {
                    let obj = world.object(occupant);
                    w.push(loc, self.features.type_id, clamp_u8(obj.type_id.0 as f64));
                    if let Some(agent_state) = &obj.agent {
                        w.push(loc, self.features.agent_id, clamp_u8(agent_state.agent_id.0 as f64));
                        if let Some(role) = agent_state.role_token {
                            w.push(loc, self.features.agent_role, role);
                        }
                    }
                    if obj.vibe.0 != 0 {
                        w.push(loc, self.features.vibe, clamp_u8(obj.vibe.0 as f64));
                    }
                    for &(tag, feature) in self.features.tag_features() {
                        if obj.has_tag(tag) {
                            w.push(loc, feature, 1);
                        }
                    }
                    for (resource, amount) in obj.inventory.iter_nonzero() {
                        w.push(loc, self.features.inventory_feature(resource), clamp_u8(amount as f64));
                    }
                }

                // Territory layers cover empty cells too.  The two layers
                // break exact influence ties differently, so each resolves
                // its own owner.
                if let Some(field) = field {
                    if self.territory {
                        if let Some(owner) =
                            field.owner_at(gr as u16, gc as u16, TieBreak::NonClipsWins)
                        {
                            let value = if Some(owner) == my_collective { 1 } else { 2 };
                            w.push(loc, self.features.territory, value);
                        }
                    }
                    if self.aoe_mask {
                        if let Some(owner) =
                            field.owner_at(gr as u16, gc as u16, TieBreak::Neutral)
                        {
                            let value = if Some(owner) == my_collective { 1 } else { 2 };
                            w.push(loc, self.features.aoe_mask, value);
                        }
                    }
                }
            }
        }

        // ── Global pass: ascending feature-id order ───────────────────────
        let gl = PackedCoordinate::GLOBAL_LOCATION;
        let agent_state = me.agent.as_ref().expect("agent object carries agent state");

        if self.global.episode_completion_pct {
            let pct = if max_steps == 0 {
                0.0
            } else {
                100.0 * tick.min(max_steps) as f64 / max_steps as f64
            };
            w.push(gl, self.features.episode_completion_pct, clamp_u8(pct));
        }
        if self.global.last_action {
            w.push(gl, self.features.last_action, clamp_u8(agent_state.last_action as f64));
        }
        if self.global.last_reward {
            w.push(gl, self.features.last_reward, clamp_u8(agent_state.last_reward.round() as f64));
        }
        if self.global.goal_obs {
            w.push(gl, self.features.goal_obs, clamp_u8(agent_state.group_id as f64));
        }
        if self.global.local_position {
            let (rows, cols) = (world.height() as i32, world.width() as i32);
            let (r, c) = (me.row as i32, me.col as i32);
            if r < rows / 2 {
                w.push(gl, self.features.lp_north, 1);
            }
            if r > rows / 2 {
                w.push(gl, self.features.lp_south, 1);
            }
            if c > cols / 2 {
                w.push(gl, self.features.lp_east, 1);
            }
            if c < cols / 2 {
                w.push(gl, self.features.lp_west, 1);
            }
        }
        for (i, value) in self.obs_values.iter().enumerate() {
            let v = value.eval(world, Some(obj_id), baselines);
            w.push(gl, self.features.value_feature(i), clamp_u8(v));
        }

        w.pad();
    }

    /// Elliptical vision mask over the window (a circle for square windows).
    /// Corners of the bounding box fall outside; the cardinal extremes are
    /// inside.
    #[inline]
    fn visible(&self, wr: u16, wc: u16) -> bool {
        let half_w = (self.width / 2) as f64;
        let half_h = (self.height / 2) as f64;
        let dr = (wr as f64 - half_h) / (half_h + 0.5);
        let dc = (wc as f64 - half_w) / (half_w + 0.5);
        dr * dr + dc * dc <= 1.0
    }
}

#[inline]
fn clamp_u8(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

// ── Token writer ──────────────────────────────────────────────────────────────

struct TokenWriter<'a> {
    buf: &'a mut [u8],
    used: usize,
    cap: usize,
}

impl<'a> TokenWriter<'a> {
    fn new(buf: &'a mut [u8], cap: usize) -> Self {
        Self { buf, used: 0, cap }
    }

    #[inline]
    fn push(&mut self, loc: u8, feature: FeatureId, value: u8) {
        if self.used >= self.cap {
            return;
        }
        let at = self.used * TOKEN_BYTES;
        self.buf[at] = loc;
        self.buf[at + 1] = feature.0;
        self.buf[at + 2] = value;
        self.used += 1;
    }

    /// Fill the remainder with the empty sentinel.
    fn pad(&mut self) {
        while self.used < self.cap {
            let at = self.used * TOKEN_BYTES;
            self.buf[at] = PackedCoordinate::EMPTY;
            self.buf[at + 1] = 0;
            self.buf[at + 2] = 0;
            self.used += 1;
        }
    }
}
