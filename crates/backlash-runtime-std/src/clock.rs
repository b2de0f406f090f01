//! Manually advanced clock for timers in tests and demos.
//!
//! Time only moves when [`VirtualClock::advance_millis`] or
//! [`VirtualClock::advance_to_next`] is called. Due callbacks run in deadline
//! order, ties in registration order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};

pub type TimerId = u64;

type TimerCallback = Box<dyn FnOnce(u64) + 'static>;

struct TimerEntry {
    id: TimerId,
    deadline: u64,
    callback: TimerCallback,
}

struct ClockInner {
    now: Cell<u64>,
    next_id: Cell<TimerId>,
    timers: RefCell<Vec<TimerEntry>>,
}

impl ClockInner {
    fn register(&self, delay_millis: u64, callback: TimerCallback) -> TimerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let deadline = self.now.get().saturating_add(delay_millis);
        self.timers.borrow_mut().push(TimerEntry {
            id,
            deadline,
            callback,
        });
        id
    }

    fn cancel(&self, id: TimerId) {
        let mut timers = self.timers.borrow_mut();
        if let Some(index) = timers.iter().position(|entry| entry.id == id) {
            timers.remove(index);
        }
    }

    fn take_due(&self) -> Option<TimerEntry> {
        let now = self.now.get();
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.deadline <= now)
            .min_by_key(|(_, entry)| (entry.deadline, entry.id))
            .map(|(index, _)| index)?;
        Some(timers.remove(index))
    }

    fn fire_due(&self) -> usize {
        let mut fired = 0;
        // Callbacks may register timers that are already due.
        while let Some(entry) = self.take_due() {
            (entry.callback)(self.now.get());
            fired += 1;
        }
        fired
    }
}

#[derive(Clone)]
pub struct VirtualClock {
    inner: Rc<ClockInner>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ClockInner {
                now: Cell::new(0),
                next_id: Cell::new(1),
                timers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.inner.now.get()
    }

    /// Runs `callback` once the clock reaches `now + delay_millis`.
    ///
    /// Dropping the registration cancels the timer.
    pub fn after_millis(
        &self,
        delay_millis: u64,
        callback: impl FnOnce(u64) + 'static,
    ) -> TimerRegistration {
        let id = self.inner.register(delay_millis, Box::new(callback));
        TimerRegistration {
            clock: Rc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// A future that resolves once `delay_millis` have elapsed on this clock.
    pub fn sleep(&self, delay_millis: u64) -> Sleep {
        let shared = Rc::new(SleepShared::default());
        let fired = Rc::clone(&shared);
        let registration = self.after_millis(delay_millis, move |_| fired.fire());
        Sleep {
            shared,
            registration,
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.inner
            .timers
            .borrow()
            .iter()
            .map(|entry| entry.deadline)
            .min()
    }

    /// Moves time forward and fires every timer that came due. Returns the
    /// number of callbacks run.
    pub fn advance_millis(&self, millis: u64) -> usize {
        let now = self.inner.now.get().saturating_add(millis);
        self.inner.now.set(now);
        let fired = self.inner.fire_due();
        if fired > 0 {
            log::trace!("clock at {now}ms fired {fired} timer(s)");
        }
        fired
    }

    /// Jumps to the earliest pending deadline. Returns false when no timer
    /// is pending.
    pub fn advance_to_next(&self) -> bool {
        match self.next_deadline() {
            Some(deadline) => {
                let delta = deadline.saturating_sub(self.now_millis());
                self.advance_millis(delta);
                true
            }
            None => false,
        }
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VirtualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualClock")
            .field("now_millis", &self.now_millis())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}

pub struct TimerRegistration {
    clock: Weak<ClockInner>,
    id: Option<TimerId>,
}

impl TimerRegistration {
    pub fn cancel(mut self) {
        self.cancel_inner();
    }

    fn cancel_inner(&mut self) {
        if let (Some(id), Some(clock)) = (self.id.take(), self.clock.upgrade()) {
            clock.cancel(id);
        }
    }
}

impl Drop for TimerRegistration {
    fn drop(&mut self) {
        self.cancel_inner();
    }
}

#[derive(Default)]
struct SleepShared {
    done: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

impl SleepShared {
    fn fire(&self) {
        self.done.set(true);
        let waker = self.waker.borrow_mut().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Future returned by [`VirtualClock::sleep`]. Dropping it cancels the timer.
pub struct Sleep {
    shared: Rc<SleepShared>,
    registration: TimerRegistration,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.shared.done.get() {
            return Poll::Ready(());
        }
        if self.registration.clock.strong_count() == 0 {
            log::trace!("sleep outlived its clock; resolving immediately");
            return Poll::Ready(());
        }
        self.shared.waker.replace(Some(cx.waker().clone()));
        Poll::Pending
    }
}
