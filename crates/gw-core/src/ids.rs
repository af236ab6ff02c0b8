//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  The inner integer is `pub` to allow
//! direct indexing into dense `Vec`s via `id.0 as usize`, but callers should
//! prefer the `.index()` helpers for clarity.
//!
//! Dense-id discipline: every id space is `[0..K)` assigned deterministically
//! at init (sorted names for tags/types/resources, config order elsewhere), so
//! a `Vec` indexed by `.index()` is always the fastest lookup structure.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Sentinel meaning "no valid ID" — equivalent to the type's MAX.
            pub const INVALID: $name = $name(<$inner>::MAX);

            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl Default for $name {
            /// Returns the `INVALID` sentinel so uninitialized IDs are visibly invalid.
            #[inline(always)]
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<$name> for usize {
            #[inline(always)]
            fn from(id: $name) -> usize {
                id.0 as usize
            }
        }

        impl TryFrom<usize> for $name {
            type Error = std::num::TryFromIntError;
            fn try_from(n: usize) -> Result<$name, Self::Error> {
                <$inner>::try_from(n).map($name)
            }
        }
    };
}

typed_id! {
    /// Index of an object in the grid's object arena.  Stable for the life of
    /// the episode; never reused after removal.
    pub struct ObjectId(u32);
}

typed_id! {
    /// Dense agent index in `[0..N)`.  Doubles as the index into the shared
    /// observation/action/reward buffers.
    pub struct AgentId(u32);
}

typed_id! {
    /// Interned tag id.  At most 256 tags per simulation; `u16` leaves the
    /// sentinel outside the valid range.
    pub struct TagId(u16);
}

typed_id! {
    /// Dense resource id — the index into `resource_names`.
    pub struct ResourceId(u16);
}

typed_id! {
    /// Dense collective id, assigned from sorted collective names.
    pub struct CollectiveId(u16);
}

typed_id! {
    /// Dense object-type id, assigned from sorted type names.
    pub struct TypeId(u16);
}

typed_id! {
    /// Vibe id — the index into the configured vibe table.
    pub struct VibeId(u16);
}

typed_id! {
    /// Interned stat-name id.  Stat names are open-ended, so this space grows
    /// as mutations intern new names.
    pub struct StatId(u32);
}

typed_id! {
    /// Observation feature id.  Must fit the 1-byte token slot; `0xFF` is the
    /// empty-token sentinel and is never a valid feature.
    pub struct FeatureId(u8);
}

typed_id! {
    /// Index of a compiled multi-handler blueprint in the rule tables.
    pub struct MultiHandlerId(u32);
}

typed_id! {
    /// Index of a compiled event in the rule tables.
    pub struct EventId(u32);
}

typed_id! {
    /// Index of a compiled AOE blueprint in the rule tables.
    pub struct AoeId(u32);
}
