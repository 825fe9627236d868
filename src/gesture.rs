//! Timed button gestures: repeated presses open the door, a long hold wipes
//! the device.
//!
//! The recognizer is fed debounced [`ButtonEvent`]s and is also polled every
//! tick, since both gestures have deadlines that expire without any input.

use log::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::debounce::ButtonEvent;
use crate::Millis;

pub const DEFAULT_RESET_HOLD_MS: Millis = 8000;

/// How close a held button is to triggering a factory reset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResetTier {
    None,
    Far,
    Mid,
    Near,
}

impl ResetTier {
    fn for_remaining(remaining: i64) -> ResetTier {
        if remaining < 2000 {
            ResetTier::Near
        } else if remaining < 4000 {
            ResetTier::Mid
        } else if remaining < 6000 {
            ResetTier::Far
        } else {
            ResetTier::None
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Gesture {
    /// First press of an idle period, worth telling the remote about.
    PressNoticed,
    /// Enough releases inside one session.
    Activate,
    /// A session expired before reaching the threshold.
    SessionTimeout,
    /// The countdown moved to another tier.
    ResetTier(ResetTier),
    /// The button was released while the countdown was visible.
    ResetAborted,
    /// The button was held for the full reset period.
    FactoryReset,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PressSession {
    pub started: Option<Millis>,
    pub count: u32,
}

impl PressSession {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.started.is_some()
    }

    fn clear(&mut self) {
        *self = PressSession::default();
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FactoryResetTimer {
    pub started: Option<Millis>,
    pub tier: ResetTier,
}

impl FactoryResetTimer {
    fn clear(&mut self) {
        self.started = None;
        self.tier = ResetTier::None;
    }
}

impl Default for FactoryResetTimer {
    fn default() -> Self {
        FactoryResetTimer {
            started: None,
            tier: ResetTier::None,
        }
    }
}

#[derive(Debug)]
pub struct GestureRecognizer {
    reset_hold_ms: Millis,
    session: PressSession,
    reset: FactoryResetTimer,
}

impl GestureRecognizer {
    pub fn new(reset_hold_ms: Millis) -> Self {
        GestureRecognizer {
            reset_hold_ms,
            session: PressSession::default(),
            reset: FactoryResetTimer::default(),
        }
    }

    pub fn session(&self) -> PressSession {
        self.session
    }

    pub fn reset_timer(&self) -> FactoryResetTimer {
        self.reset
    }

    /// Drop any partially counted session, e.g. when the relay was opened
    /// some other way.
    pub fn clear_session(&mut self) {
        if self.session.is_active() {
            debug!("press session cleared ({} presses)", self.session.count);
        }
        self.session.clear();
    }

    pub fn on_event(
        &mut self,
        event: ButtonEvent,
        config: &RemoteConfig,
        now: Millis,
    ) -> Vec<Gesture> {
        let mut gestures = Vec::new();
        if event.pressed {
            debug!("button pressed");
            self.reset = FactoryResetTimer {
                started: Some(now),
                tier: ResetTier::None,
            };
            if !self.session.is_active() {
                gestures.push(Gesture::PressNoticed);
            }
            return gestures;
        }

        debug!("button released");
        if self.reset.tier != ResetTier::None {
            gestures.push(Gesture::ResetAborted);
        }
        self.reset.clear();

        if !config.system_enabled {
            return gestures;
        }

        if !self.session.is_active() {
            self.session = PressSession {
                started: Some(now),
                count: 0,
            };
        }
        self.session.count += 1;
        debug!(
            "press {} of {}",
            self.session.count, config.press_count_threshold
        );
        if self.session.count >= config.press_count_threshold {
            info!("press count reached, activating relay");
            self.session.clear();
            gestures.push(Gesture::Activate);
        }
        gestures
    }

    pub fn poll_session(&mut self, config: &RemoteConfig, now: Millis) -> Option<Gesture> {
        let started = self.session.started?;
        if now >= started.saturating_add(config.press_timeout_ms) {
            info!("press session timed out after {} presses", self.session.count);
            self.session.clear();
            return Some(Gesture::SessionTimeout);
        }
        None
    }

    pub fn poll_reset(&mut self, now: Millis) -> Option<Gesture> {
        let started = self.reset.started?;
        let deadline = started.saturating_add(self.reset_hold_ms);
        if now >= deadline {
            warn!("button held for {}ms, factory reset", self.reset_hold_ms);
            self.reset.clear();
            return Some(Gesture::FactoryReset);
        }

        let tier = ResetTier::for_remaining((deadline - now) as i64);
        if tier != self.reset.tier {
            debug!("factory reset tier {:?} -> {:?}", self.reset.tier, tier);
            self.reset.tier = tier;
            return Some(Gesture::ResetTier(tier));
        }
        None
    }
}

impl Default for GestureRecognizer {
    fn default() -> Self {
        GestureRecognizer::new(DEFAULT_RESET_HOLD_MS)
    }
}
