//! Opaque ID newtypes for placement entities.
//!
//! [`BlockId`], [`SiteId`], [`BlockTypeId`], and [`NetId`] are thin `u32`
//! wrappers used as indices into the placement surface and cost models. They
//! are `Copy`, `Hash`, and `Serialize`/`Deserialize`.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the index as a `usize`, for slice indexing.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a placeable block.
    BlockId
);

define_id!(
    /// Opaque, copyable ID for a site (placement location) on the grid.
    SiteId
);

define_id!(
    /// Opaque, copyable ID for a block type (CLB, I/O, memory, ...).
    BlockTypeId
);

define_id!(
    /// Opaque, copyable ID for a net in a cost model.
    NetId
);
