//! Framework error type.
//!
//! Sub-crates may define their own error enums and convert them into `GwError`
//! via `From` impls, or keep them separate and wrap `GwError` as one variant.
//! Both patterns are acceptable; prefer whichever keeps error sites clean.
//!
//! Step-time faults (occupied cells, missing resources, clamped inventories)
//! are deliberately NOT represented here: they are swallowed into stats and
//! per-agent success flags so `step()` never fails on user-supplied actions.

use thiserror::Error;

/// The top-level error type for `gw-core` and a common base for sub-crates.
///
/// Everything in this enum is fatal at init or bind time.
#[derive(Debug, Error)]
pub enum GwError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("unknown tag '{0}'")]
    UnknownTag(String),

    #[error("unknown collective '{0}'")]
    UnknownCollective(String),

    #[error("unknown vibe '{0}'")]
    UnknownVibe(String),

    #[error("unknown event '{0}' referenced as fallback")]
    UnknownEvent(String),

    #[error("too many {what} ({got}, max {max})")]
    TableOverflow {
        what: &'static str,
        got:  usize,
        max:  usize,
    },

    #[error("observation thread count '{0}' is not a positive integer or \"auto\"")]
    ThreadCount(String),

    #[error("{buffer} buffer has {got} elements, expected {expected}")]
    BufferMismatch {
        buffer:   &'static str,
        expected: usize,
        got:      usize,
    },
}

/// Shorthand result type for all `gw-*` crates.
pub type GwResult<T> = Result<T, GwError>;
