use crate::Millis;

pub const DEFAULT_DEBOUNCE_MS: Millis = 50;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonEvent {
    pub pressed: bool,
}

/// Turns raw button samples into press/release events.
///
/// Every sample that disagrees with the debounced level restarts the window,
/// whether or not it is committed. A change is only committed when the
/// previous disagreeing sample is more than `window_ms` in the past, so a
/// line that keeps bouncing faster than the window never commits.
#[derive(Debug)]
pub struct InputDebouncer {
    window_ms: Millis,
    debounced: bool,
    last_transition: Millis,
}

impl InputDebouncer {
    pub fn new(window_ms: Millis) -> Self {
        InputDebouncer {
            window_ms,
            debounced: false,
            last_transition: 0,
        }
    }

    pub fn sample(&mut self, raw: bool, now: Millis) -> Option<ButtonEvent> {
        if raw == self.debounced {
            return None;
        }

        let elapsed = now.saturating_sub(self.last_transition);
        self.last_transition = now;
        if elapsed <= self.window_ms {
            return None;
        }

        self.debounced = raw;
        Some(ButtonEvent { pressed: raw })
    }

    #[inline]
    pub fn is_pressed(&self) -> bool {
        self.debounced
    }
}

impl Default for InputDebouncer {
    fn default() -> Self {
        InputDebouncer::new(DEFAULT_DEBOUNCE_MS)
    }
}
