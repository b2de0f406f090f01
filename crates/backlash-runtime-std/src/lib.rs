//! Standard host services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the host boundary
//! defined in `backlash-core`: a render-request scheduler, a local executor
//! and a virtual clock for effects that continue on a later turn, and a
//! reference [`ComponentHost`]. Applications construct a [`StdRuntime`] and
//! hand its scheduler to the host.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use backlash_core::RenderScheduler;

pub mod clock;
pub mod executor;
pub mod host;

pub use clock::{Sleep, TimerRegistration, VirtualClock};
pub use executor::{LocalExecutor, Spawner, TaskId};
pub use host::{ComponentHost, HostError, HostOptions, RenderScope, StateHandle};

type RenderWaker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records render requests with atomics.
pub struct StdScheduler {
    render_requested: AtomicBool,
    render_waker: RwLock<Option<RenderWaker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            render_requested: AtomicBool::new(false),
            render_waker: RwLock::new(None),
        }
    }

    /// Returns whether a render has been requested since the last call.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::SeqCst)
    }

    pub fn has_render_request(&self) -> bool {
        self.render_requested.load(Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever a new render is requested.
    pub fn set_render_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .render_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_render_waker(&self) {
        *self
            .render_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .render_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "render_requested",
                &self.render_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RenderScheduler for StdScheduler {
    fn schedule_render(&self) {
        self.render_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Convenience container bundling the scheduler, executor and clock.
///
/// One runtime serves one [`ComponentHost`]; the scheduler's render request
/// flag is not partitioned per component.
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    executor: LocalExecutor,
    clock: VirtualClock,
}

impl StdRuntime {
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(StdScheduler::default()),
            executor: LocalExecutor::new(),
            clock: VirtualClock::new(),
        }
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn executor(&self) -> &LocalExecutor {
        &self.executor
    }

    pub fn spawner(&self) -> Spawner {
        self.executor.spawner()
    }

    pub fn clock(&self) -> VirtualClock {
        self.clock.clone()
    }

    /// Creates a host wired to this runtime's scheduler.
    pub fn host<V: 'static>(
        &self,
        options: HostOptions,
        body: impl FnMut(&mut RenderScope<'_>) -> V + 'static,
    ) -> ComponentHost<V> {
        ComponentHost::new(options, self.scheduler(), body)
    }

    pub fn take_render_request(&self) -> bool {
        self.scheduler.take_render_request()
    }

    /// Polls ready tasks without moving the clock.
    pub fn run_until_stalled(&self) -> usize {
        self.executor.run_until_stalled()
    }

    /// Alternates executor turns with clock jumps until no task is ready and
    /// no timer is pending. Returns the virtual time reached.
    pub fn run_until_idle(&self) -> u64 {
        loop {
            self.executor.run_until_stalled();
            if !self.clock.advance_to_next() {
                break;
            }
        }
        self.clock.now_millis()
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("executor", &self.executor)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}
