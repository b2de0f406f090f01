#![doc = r"Action dispatch with ordered, re-entrant effect draining for hook-driven component hosts."]

extern crate self as backlash_core;

pub mod collections;
pub mod command;
pub mod dispatch;
pub mod hash;
pub mod hooks;
pub mod lifecycle;
pub mod platform;
pub mod runtime;
pub mod snapshot;

mod queue;

pub use command::{Command, Effect};
pub use dispatch::{DispatchError, DispatchTable, Dispatcher, Tag, UpdateMap};
pub use hash::hash_key;
pub use hooks::{use_backlash, use_backlash_with_seed};
pub use lifecycle::LifecyclePhase;
pub use platform::{Cleanup, CommitEffect, HookContext, Key, RenderScheduler, StateSlot};
pub use runtime::Backlash;
pub use snapshot::Snapshot;

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod runtime_tests;

#[cfg(test)]
#[path = "tests/hook_tests.rs"]
mod hook_tests;
