use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use crate::Millis;

/// Source of monotonic time for the control loop.
///
/// `sleep` belongs here too so a test clock can advance time instead of
/// blocking the thread.
pub trait Clock {
    fn now_ms(&self) -> Millis;

    fn sleep(&self, duration: Duration);
}

/// Milliseconds since the process started, backed by `Instant`.
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> Millis {
        Instant::now().duration_since(self.started).as_millis() as Millis
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        ManualClock {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Millis) {
        self.now.set(self.now.get().saturating_add(by))
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration.as_millis() as Millis)
    }
}
