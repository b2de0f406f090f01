//! Testing utilities and harness for backlash components

pub mod testing;

// Re-export testing utilities
pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use backlash_core::{
        use_backlash, use_backlash_with_seed, Command, DispatchTable, HookContext, Snapshot,
        UpdateMap,
    };
    pub use backlash_runtime_std::{HostError, HostOptions, RenderScope, StateHandle};
}
