//! Idle-scheduling abstraction (spec 9's design note): most hosts this
//! engine could be embedded in don't expose a browser-style
//! `requestIdleCallback`, so we synthesise the two primitives the scheduler
//! actually needs and let the embedder decide what "idle" and "zero-delay"
//! mean.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Granted to a background slice; tells it how much more time it may spend
/// before yielding back to the host.
pub trait IdleDeadline {
    fn time_remaining(&self) -> Duration;
}

/// A fixed-budget deadline, the common case: "you have up to N milliseconds".
pub struct BudgetDeadline {
    started: Instant,
    budget: Duration,
}

impl BudgetDeadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }
}

impl IdleDeadline for BudgetDeadline {
    fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }
}

type IdleCallback = Box<dyn FnOnce(&dyn IdleDeadline)>;
type ZeroDelayCallback = Box<dyn FnOnce()>;

/// Single-threaded cooperative scheduling surface. No locks: everything
/// this crate does with a `Host` happens on the one thread driving the
/// engine, and suspension only ever happens at the boundaries this trait
/// exposes (spec 5).
pub trait Host {
    fn request_idle_callback(&self, callback: IdleCallback);
    fn schedule_zero_delay(&self, callback: ZeroDelayCallback);
    fn now_ms(&self) -> u64;
}

/// Default `Host`: queues callbacks instead of running them, so a driving
/// loop (a GUI's own idle detection, or a test) decides exactly when idle
/// and zero-delay callbacks fire. This is what every test in this crate
/// uses; it keeps the engine free of any dependency on a concrete event
/// loop or async runtime.
#[derive(Default)]
pub struct ManualHost {
    idle_queue: RefCell<VecDeque<IdleCallback>>,
    zero_delay_queue: RefCell<VecDeque<ZeroDelayCallback>>,
    clock_ms: RefCell<u64>,
}

impl ManualHost {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Run the oldest queued idle callback, if any, with the given budget.
    /// Returns whether a callback ran.
    pub fn pump_idle(&self, budget: Duration) -> bool {
        let Some(cb) = self.idle_queue.borrow_mut().pop_front() else {
            return false;
        };
        let deadline = BudgetDeadline::new(budget);
        cb(&deadline);
        true
    }

    /// Run every queued zero-delay callback in order. Returns how many ran.
    pub fn pump_zero_delay(&self) -> usize {
        let mut count = 0;
        loop {
            let Some(cb) = self.zero_delay_queue.borrow_mut().pop_front() else {
                break;
            };
            cb();
            count += 1;
        }
        count
    }

    pub fn has_pending_idle(&self) -> bool {
        !self.idle_queue.borrow().is_empty()
    }

    pub fn advance_clock(&self, ms: u64) {
        *self.clock_ms.borrow_mut() += ms;
    }
}

impl Host for ManualHost {
    fn request_idle_callback(&self, callback: IdleCallback) {
        self.idle_queue.borrow_mut().push_back(callback);
    }

    fn schedule_zero_delay(&self, callback: ZeroDelayCallback) {
        self.zero_delay_queue.borrow_mut().push_back(callback);
    }

    fn now_ms(&self) -> u64 {
        *self.clock_ms.borrow()
    }
}

/// A headless `Host` for embeddings with no real idle-detection mechanism:
/// idle simply means "the calling thread blocked for `slice_ms`". Provided
/// for completeness per the design note that non-GUI hosts need *some*
/// synthesised idle source; not exercised by this crate's test suite since
/// it is real-time and therefore nondeterministic.
pub struct ThreadTimerHost {
    slice: Duration,
}

impl ThreadTimerHost {
    pub fn new(slice: Duration) -> Self {
        Self { slice }
    }

    /// Block for one slice, then run every callback queued before the block
    /// started. Intended to be called in a loop by the embedder.
    pub fn tick(&self, idle: &ManualHost) {
        std::thread::sleep(self.slice);
        let deadline = BudgetDeadline::new(self.slice);
        while idle.pump_idle(deadline.time_remaining()) {}
    }
}
