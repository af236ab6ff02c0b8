//! The action registry and the two disjoint id spaces.
//!
//! Non-vibe actions (`noop`, `move_<dir>`, `attack_<n>`) and vibe actions
//! (`change_vibe_<name>`) are separate flat spaces: the caller writes one id
//! of each per agent per tick.  Ids are registration order, fixed at init.
//!
//! Attack arguments are flattened into nine actions `attack_1..attack_9`
//! encoding `(distance, offset)` relative to the attacker's facing.

use gw_core::{GwResult, ResourceId, VibeId};
use gw_rules::{AttackParams, ResolveCtx};

use crate::config::ActionsConfig;

/// Prefix that routes an action into the vibe id space.
pub const CHANGE_VIBE_PREFIX: &str = "change_vibe_";

// ── Directions ────────────────────────────────────────────────────────────────

/// The discrete 8-neighborhood.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Direction8 {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Direction8 {
    pub fn parse(name: &str) -> Option<Direction8> {
        Some(match name {
            "north" => Direction8::North,
            "south" => Direction8::South,
            "east" => Direction8::East,
            "west" => Direction8::West,
            "northeast" => Direction8::NorthEast,
            "northwest" => Direction8::NorthWest,
            "southeast" => Direction8::SouthEast,
            "southwest" => Direction8::SouthWest,
            _ => return None,
        })
    }

    /// `(d_row, d_col)` unit step; north is up the grid (decreasing row).
    #[inline]
    pub fn delta(self) -> (i8, i8) {
        match self {
            Direction8::North => (-1, 0),
            Direction8::South => (1, 0),
            Direction8::East => (0, 1),
            Direction8::West => (0, -1),
            Direction8::NorthEast => (-1, 1),
            Direction8::NorthWest => (-1, -1),
            Direction8::SouthEast => (1, 1),
            Direction8::SouthWest => (1, -1),
        }
    }
}

// ── Action definitions ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum ActionKind {
    Noop,
    Move(Direction8),
    /// Cells forward along facing, cells sideways along the perpendicular.
    Attack { distance: i8, offset: i8 },
    ChangeVibe(VibeId),
}

#[derive(Clone, Debug)]
pub struct ActionDef {
    pub name: String,
    pub kind: ActionKind,
    pub required: Vec<(ResourceId, u32)>,
    pub consumed: Vec<(ResourceId, u32)>,
}

/// Both id spaces plus the shared attack protocol parameters.
pub struct ActionRegistry {
    non_vibe: Vec<ActionDef>,
    vibe: Vec<ActionDef>,
    pub attack: AttackParams,
}

impl ActionRegistry {
    pub fn build(config: &ActionsConfig, resolve: &mut ResolveCtx<'_>) -> GwResult<ActionRegistry> {
        let resources = |resolve: &mut ResolveCtx<'_>,
                         pairs: &[(String, u32)]|
         -> GwResult<Vec<(ResourceId, u32)>> {
            pairs
                .iter()
                .map(|(name, amount)| Ok((resolve.resource(name)?, *amount)))
                .collect()
        };
        // Preconditions default to the consumed set when `required` is empty.
        let costs = |resolve: &mut ResolveCtx<'_>,
                     base: &crate::config::ActionConfig|
         -> GwResult<(Vec<(ResourceId, u32)>, Vec<(ResourceId, u32)>)> {
            let consumed = resources(resolve, &base.consumed_resources)?;
            let required = if base.required_resources.is_empty() {
                consumed.clone()
            } else {
                resources(resolve, &base.required_resources)?
            };
            Ok((required, consumed))
        };

        let mut non_vibe = Vec::new();

        // Noop is always id 0, enabled or not — a disabled noop still
        // anchors the id space so frozen agents have a forced action.
        let (required, consumed) = costs(resolve, &config.noop)?;
        non_vibe.push(ActionDef {
            name: "noop".to_string(),
            kind: ActionKind::Noop,
            required,
            consumed,
        });

        if config.r#move.base.enabled {
            let (required, consumed) = costs(resolve, &config.r#move.base)?;
            for dir_name in &config.r#move.allowed_directions {
                let dir = Direction8::parse(dir_name).ok_or_else(|| {
                    gw_core::GwError::Config(format!("unknown move direction '{dir_name}'"))
                })?;
                non_vibe.push(ActionDef {
                    name: format!("move_{dir_name}"),
                    kind: ActionKind::Move(dir),
                    required: required.clone(),
                    consumed: consumed.clone(),
                });
            }
        }

        if config.attack.base.enabled {
            let (required, consumed) = costs(resolve, &config.attack.base)?;
            for arg in 1..=9u8 {
                let distance = 1 + (arg - 1) / 3;
                let offset = (arg - 1) % 3;
                non_vibe.push(ActionDef {
                    name: format!("attack_{arg}"),
                    kind: ActionKind::Attack {
                        distance: distance as i8,
                        offset: offset as i8 - 1,
                    },
                    required: required.clone(),
                    consumed: consumed.clone(),
                });
            }
        }

        let mut vibe = Vec::new();
        if config.change_vibe.base.enabled {
            let (required, consumed) = costs(resolve, &config.change_vibe.base)?;
            for (i, vibe_name) in config.change_vibe.vibes.iter().enumerate() {
                vibe.push(ActionDef {
                    name: format!("{CHANGE_VIBE_PREFIX}{vibe_name}"),
                    kind: ActionKind::ChangeVibe(VibeId(i as u16)),
                    required: required.clone(),
                    consumed: consumed.clone(),
                });
            }
        }

        // The protocol is compiled whenever referenced — `enabled` only
        // gates the standalone attack actions.
        let attack = config.attack.protocol.compile(resolve)?;

        Ok(ActionRegistry {
            non_vibe,
            vibe,
            attack,
        })
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    #[inline]
    pub fn non_vibe(&self, id: usize) -> Option<&ActionDef> {
        self.non_vibe.get(id)
    }

    #[inline]
    pub fn vibe(&self, id: usize) -> Option<&ActionDef> {
        self.vibe.get(id)
    }

    pub fn non_vibe_names(&self) -> Vec<&str> {
        self.non_vibe.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn vibe_names(&self) -> Vec<&str> {
        self.vibe.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn non_vibe_id(&self, name: &str) -> Option<usize> {
        self.non_vibe.iter().position(|a| a.name == name)
    }

    pub fn vibe_id(&self, name: &str) -> Option<usize> {
        self.vibe.iter().position(|a| a.name == name)
    }

    pub fn has_vibe_actions(&self) -> bool {
        !self.vibe.is_empty()
    }
}
