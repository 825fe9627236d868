//! Status light patterns.
//!
//! There is one physical light but two logical channels. The primary channel
//! shows connectivity and runs forever. The secondary channel plays short
//! event patterns and overrides the primary while it runs.

use std::f32::consts::PI;

use log::debug;

use crate::gesture::ResetTier;
use crate::Millis;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Shape {
    Blink { on_ms: Millis, off_ms: Millis },
    /// Fade in and out once per period.
    Breathe { period_ms: Millis },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Repeat {
    Times(u32),
    Forever,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pattern {
    pub shape: Shape,
    pub repeat: Repeat,
    pub delay_after_ms: Millis,
}

impl Pattern {
    pub fn blink(on_ms: Millis, off_ms: Millis) -> Self {
        Pattern {
            shape: Shape::Blink { on_ms, off_ms },
            repeat: Repeat::Times(1),
            delay_after_ms: 0,
        }
    }

    pub fn breathe(period_ms: Millis) -> Self {
        Pattern {
            shape: Shape::Breathe { period_ms },
            repeat: Repeat::Times(1),
            delay_after_ms: 0,
        }
    }

    pub fn repeat(mut self, times: u32) -> Self {
        self.repeat = Repeat::Times(times);
        self
    }

    pub fn forever(mut self) -> Self {
        self.repeat = Repeat::Forever;
        self
    }

    pub fn delay_after(mut self, delay_ms: Millis) -> Self {
        self.delay_after_ms = delay_ms;
        self
    }

    pub fn disconnected() -> Self {
        Pattern::blink(80, 1000).forever()
    }

    pub fn connected() -> Self {
        Pattern::breathe(3000).delay_after(400).forever()
    }

    pub fn relay_activated(duration_ms: Millis) -> Self {
        Pattern::blink(duration_ms, 10).repeat(1)
    }

    pub fn session_timeout() -> Self {
        Pattern::blink(120, 120).repeat(4)
    }

    pub fn reset_countdown(tier: ResetTier) -> Option<Self> {
        let half_period = match tier {
            ResetTier::None => return None,
            ResetTier::Far => 300,
            ResetTier::Mid => 150,
            ResetTier::Near => 50,
        };
        Some(Pattern::blink(half_period, half_period).forever())
    }

    fn cycle_ms(&self) -> Millis {
        let active = match self.shape {
            Shape::Blink { on_ms, off_ms } => on_ms + off_ms,
            Shape::Breathe { period_ms } => period_ms,
        };
        active + self.delay_after_ms
    }

    /// Brightness `elapsed` ms into the pattern, or `None` once it has run
    /// all its repetitions.
    pub fn level_at(&self, elapsed: Millis) -> Option<f32> {
        let cycle = self.cycle_ms();
        if cycle == 0 {
            return None;
        }
        if let Repeat::Times(times) = self.repeat {
            if elapsed >= cycle.saturating_mul(Millis::from(times)) {
                return None;
            }
        }

        let t = elapsed % cycle;
        let level = match self.shape {
            Shape::Blink { on_ms, .. } => {
                if t < on_ms {
                    1.0
                } else {
                    0.0
                }
            }
            Shape::Breathe { period_ms } => {
                if t < period_ms {
                    let phase = t as f32 / period_ms as f32;
                    (1.0 - (2.0 * PI * phase).cos()) / 2.0
                } else {
                    0.0
                }
            }
        };
        Some(level)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Update {
    Idle,
    Running(f32),
    Finished,
}

#[derive(Debug, Default)]
struct Channel {
    pattern: Option<(Pattern, Millis)>,
}

impl Channel {
    fn start(&mut self, pattern: Pattern, now: Millis) {
        self.pattern = Some((pattern, now));
    }

    fn stop(&mut self) {
        self.pattern = None;
    }

    fn is_running(&self) -> bool {
        self.pattern.is_some()
    }

    fn update(&mut self, now: Millis) -> Update {
        let (pattern, started) = match self.pattern {
            Some(running) => running,
            None => return Update::Idle,
        };
        match pattern.level_at(now.saturating_sub(started)) {
            Some(level) => Update::Running(level),
            None => {
                self.pattern = None;
                Update::Finished
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct FeedbackController {
    primary: Channel,
    secondary: Channel,
    resume_delay_ms: Millis,
    paused_until: Option<Millis>,
}

impl FeedbackController {
    /// `resume_delay_ms` keeps the light dark for a while after a secondary
    /// pattern completes, before the primary pattern shows again.
    pub fn new(resume_delay_ms: Millis) -> Self {
        FeedbackController {
            resume_delay_ms,
            ..FeedbackController::default()
        }
    }

    pub fn set_connectivity(&mut self, connected: bool, now: Millis) {
        let pattern = if connected {
            Pattern::connected()
        } else {
            Pattern::disconnected()
        };
        self.primary.start(pattern, now);
    }

    /// Plays an event pattern on the secondary channel, replacing whatever
    /// it was showing.
    pub fn play(&mut self, pattern: Pattern, now: Millis) {
        debug!("feedback: {:?}", pattern);
        self.paused_until = None;
        self.secondary.start(pattern, now);
    }

    pub fn stop_secondary(&mut self) {
        self.secondary.stop();
    }

    pub fn is_secondary_running(&self) -> bool {
        self.secondary.is_running()
    }

    /// Brightness the light should show right now, between 0.0 and 1.0.
    pub fn level(&mut self, now: Millis) -> f32 {
        match self.secondary.update(now) {
            Update::Running(level) => return level,
            Update::Finished if self.resume_delay_ms > 0 => {
                self.paused_until = Some(now.saturating_add(self.resume_delay_ms));
            }
            _ => {}
        }

        if let Some(until) = self.paused_until {
            if now < until {
                return 0.0;
            }
            self.paused_until = None;
        }

        match self.primary.update(now) {
            Update::Running(level) => level,
            _ => 0.0,
        }
    }
}
