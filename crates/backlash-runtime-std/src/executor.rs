//! Single-threaded executor for effects that continue on a later turn.
//!
//! Futures are `!Send` and run on a `futures-executor` [`LocalPool`] owned by
//! the thread that created it. Every spawned future is wrapped so the
//! executor can report how many tasks are still alive and how many polls a
//! turn made.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use futures_executor::{LocalPool, LocalSpawner};
use futures_task::{LocalFutureObj, LocalSpawn, SpawnError};

pub type TaskId = u64;

type LocalTask = Pin<Box<dyn Future<Output = ()> + 'static>>;

#[derive(Default)]
struct TaskCounts {
    next_id: Cell<TaskId>,
    pending: Cell<usize>,
    polls: Cell<usize>,
}

impl TaskCounts {
    fn track(self: &Rc<Self>, task: LocalTask) -> Tracked {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.pending.set(self.pending.get() + 1);
        Tracked {
            id,
            task,
            counts: Rc::clone(self),
        }
    }
}

/// A spawned future together with its bookkeeping. Dropping it, whether it
/// completed or the pool shut down, retires the task.
struct Tracked {
    id: TaskId,
    task: LocalTask,
    counts: Rc<TaskCounts>,
}

impl Future for Tracked {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        this.counts.polls.set(this.counts.polls.get() + 1);
        let poll = this.task.as_mut().poll(cx);
        if poll.is_ready() {
            log::trace!("task {} completed", this.id);
        }
        poll
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        let pending = self.counts.pending.get();
        self.counts.pending.set(pending.saturating_sub(1));
    }
}

/// Owns spawned futures and polls them when woken.
pub struct LocalExecutor {
    pool: RefCell<LocalPool>,
    spawner: Spawner,
    counts: Rc<TaskCounts>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let counts = Rc::new(TaskCounts::default());
        let spawner = Spawner {
            spawner: pool.spawner(),
            counts: Rc::downgrade(&counts),
        };
        Self {
            pool: RefCell::new(pool),
            spawner,
            counts,
        }
    }

    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) -> Option<TaskId> {
        self.spawner.spawn(future)
    }

    /// Number of tasks that have not completed yet.
    pub fn pending_tasks(&self) -> usize {
        self.counts.pending.get()
    }

    /// Polls woken tasks until none is ready. Returns the number of polls.
    ///
    /// Tasks may spawn through a [`Spawner`] while the pool runs; those are
    /// polled in the same turn.
    pub fn run_until_stalled(&self) -> usize {
        let before = self.counts.polls.get();
        self.pool.borrow_mut().run_until_stalled();
        self.counts.polls.get() - before
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("pending_tasks", &self.pending_tasks())
            .field("polls", &self.counts.polls.get())
            .finish()
    }
}

/// Cloneable spawn capability, suitable for injecting as a dependency.
///
/// Spawning after the executor is gone drops the future.
#[derive(Clone)]
pub struct Spawner {
    spawner: LocalSpawner,
    counts: Weak<TaskCounts>,
}

impl Spawner {
    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) -> Option<TaskId> {
        match self.try_spawn(Box::pin(future)) {
            Ok(id) => Some(id),
            Err(error) => {
                log::trace!("spawn failed ({error}); future discarded");
                None
            }
        }
    }

    fn try_spawn(&self, task: LocalTask) -> Result<TaskId, SpawnError> {
        let counts = self.counts.upgrade().ok_or_else(SpawnError::shutdown)?;
        let tracked = counts.track(task);
        let id = tracked.id;
        self.spawner
            .spawn_local_obj(LocalFutureObj::new(Box::new(tracked)))?;
        Ok(id)
    }

    pub fn is_alive(&self) -> bool {
        self.spawner.status_local().is_ok()
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner")
            .field("alive", &self.is_alive())
            .finish()
    }
}
