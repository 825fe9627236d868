use std::fmt;

use log::{debug, info};

use crate::config::DEFAULT_ON_TIMEOUT_MS;
use crate::Millis;

/// Who asked for the relay to change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Source {
    Local,
    Remote,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local => f.write_str("Local"),
            Source::Remote => f.write_str("Remote"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RelayState {
    pub is_on: bool,
    pub source: Option<Source>,
    pub started: Option<Millis>,
    pub duration_ms: Millis,
}

/// A relay change that actually happened. The controller turns this into
/// hardware writes, feedback and remote notifications.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub on: bool,
    pub source: Source,
    pub duration_ms: Millis,
    /// Switched off because the on-period ran out.
    pub expired: bool,
}

#[derive(Debug)]
pub struct RelayController {
    state: RelayState,
}

impl RelayController {
    pub fn new(duration_ms: Millis) -> Self {
        RelayController {
            state: RelayState {
                is_on: false,
                source: None,
                started: None,
                duration_ms,
            },
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.state.is_on
    }

    pub fn set_duration(&mut self, duration_ms: Millis) {
        self.state.duration_ms = duration_ms;
    }

    pub fn activate_local(&mut self, now: Millis) -> Option<Transition> {
        self.set_state(true, Source::Local, now)
    }

    pub fn apply_remote(&mut self, desired: bool, now: Millis) -> Option<Transition> {
        self.set_state(desired, Source::Remote, now)
    }

    /// The single place relay state changes. Asking for the current state is
    /// a no-op and returns `None`.
    pub fn set_state(
        &mut self,
        desired: bool,
        source: Source,
        now: Millis,
    ) -> Option<Transition> {
        self.transition(desired, source, now, false)
    }

    /// Switches the relay off once its on-period has run out.
    pub fn tick(&mut self, now: Millis) -> Option<Transition> {
        let started = self.state.started?;
        if !self.state.is_on || now < started.saturating_add(self.state.duration_ms) {
            return None;
        }
        let source = self.state.source.unwrap_or(Source::Local);
        self.transition(false, source, now, true)
    }

    fn transition(
        &mut self,
        desired: bool,
        source: Source,
        now: Millis,
        expired: bool,
    ) -> Option<Transition> {
        if self.state.is_on == desired {
            debug!("relay already {}, ignoring {} request", on_off(desired), source);
            return None;
        }

        self.state.is_on = desired;
        if desired {
            self.state.started = Some(now);
            self.state.source = Some(source);
        } else {
            self.state.started = None;
            self.state.source = None;
        }
        info!(
            "relay {} ({}{})",
            on_off(desired),
            source,
            if expired { ", expired" } else { "" }
        );

        Some(Transition {
            on: desired,
            source,
            duration_ms: self.state.duration_ms,
            expired,
        })
    }
}

impl Default for RelayController {
    fn default() -> Self {
        RelayController::new(DEFAULT_ON_TIMEOUT_MS)
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}
