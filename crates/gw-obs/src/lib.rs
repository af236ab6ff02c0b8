//! `gw-obs` — the token-based observation encoder.
//!
//! Per agent, the encoder emits up to `num_tokens` 3-byte tokens
//! `(loc, feature, value)` into the shared observation buffer: spatial tokens
//! for the local window in row-major cell order, then global tokens in fixed
//! feature-id order, padded with the empty sentinel.
//!
//! Observation computation is read-only over a frozen `World`, so agents are
//! embarrassingly parallel: the encoder optionally fans out over a rayon
//! pool sized from `METTAGRID_OBS_THREADS` at construction.  Output is
//! bit-identical for any thread count — per-agent token streams never depend
//! on each other.
//!
//! | Module        | Contents                                         |
//! |---------------|--------------------------------------------------|
//! | [`packed`]    | 1-byte `(row, col)` packing + sentinels          |
//! | [`features`]  | dense feature-id table built at init             |
//! | [`territory`] | summed-influence ownership field for AOE layers  |
//! | [`encoder`]   | the per-agent token stream writer                |

pub mod encoder;
pub mod features;
pub mod packed;
pub mod territory;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use encoder::{GlobalObsFlags, ObsEncoder, ObsSpec, TOKEN_BYTES};
pub use features::FeatureTable;
pub use packed::PackedCoordinate;
pub use territory::{TerritoryField, TieBreak};
