//! The six caller-shared buffers.
//!
//! The buffers are the only state shared between the kernel and its caller:
//! `actions`/`vibe_actions` are caller-write/sim-read (read once per step,
//! in the action phase); the other five are sim-write (written only in the
//! output phases).  Shapes are fixed at bind time and validated against the
//! simulation — a mismatch is fatal (`BufferMismatch`), never a truncated
//! write.

use gw_core::{GwError, GwResult};
use gw_obs::TOKEN_BYTES;

/// Caller-visible I/O block.  Construct with [`Buffers::new`] or populate
/// the fields directly and let bind-time validation check the shapes.
#[derive(Clone, Debug, Default)]
pub struct Buffers {
    /// `[num_agents × num_tokens × 3]` observation tokens.
    pub observations: Vec<u8>,
    /// `[num_agents]` non-vibe action ids (caller-write).
    pub actions: Vec<i32>,
    /// `[num_agents]` vibe action ids (caller-write).
    pub vibe_actions: Vec<i32>,
    /// `[num_agents]` per-tick rewards.
    pub rewards: Vec<f32>,
    /// `[num_agents]` terminal flags.
    pub terminals: Vec<bool>,
    /// `[num_agents]` truncation flags.
    pub truncations: Vec<bool>,
    /// `[num_agents]` advisory liveness masks.
    pub masks: Vec<bool>,
}

impl Buffers {
    /// Allocate correctly-shaped buffers for `num_agents` agents and
    /// `num_tokens` observation tokens.
    pub fn new(num_agents: usize, num_tokens: usize) -> Buffers {
        Buffers {
            observations: vec![0; num_agents * num_tokens * TOKEN_BYTES],
            actions: vec![0; num_agents],
            vibe_actions: vec![0; num_agents],
            rewards: vec![0.0; num_agents],
            terminals: vec![false; num_agents],
            truncations: vec![false; num_agents],
            masks: vec![true; num_agents],
        }
    }

    /// Bind-time shape check.
    pub fn validate(&self, num_agents: usize, num_tokens: usize) -> GwResult<()> {
        let check = |buffer: &'static str, got: usize, expected: usize| -> GwResult<()> {
            if got != expected {
                return Err(GwError::BufferMismatch {
                    buffer,
                    expected,
                    got,
                });
            }
            Ok(())
        };
        check(
            "observations",
            self.observations.len(),
            num_agents * num_tokens * TOKEN_BYTES,
        )?;
        check("actions", self.actions.len(), num_agents)?;
        check("vibe_actions", self.vibe_actions.len(), num_agents)?;
        check("rewards", self.rewards.len(), num_agents)?;
        check("terminals", self.terminals.len(), num_agents)?;
        check("truncations", self.truncations.len(), num_agents)?;
        check("masks", self.masks.len(), num_agents)?;
        Ok(())
    }
}
