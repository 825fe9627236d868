//! The control loop.
//!
//! [`Controller`] owns every piece of device state and advances it by one
//! tick at a time, always in the same order:
//!
//! 1. connectivity check
//! 2. factory-reset poll
//! 3. relay auto-off poll
//! 4. button read, debounce and gestures
//! 5. press-session timeout poll
//! 6. remote sync
//! 7. status light
//!
//! Local and remote requests for the relay both go through the same toggle
//! within the tick, so whichever runs second sees the first one's result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{error, info, warn};

use crate::clock::Clock;
use crate::config::{DeviceConfig, RemoteConfig};
use crate::debounce::{InputDebouncer, DEFAULT_DEBOUNCE_MS};
use crate::feedback::{FeedbackController, Pattern};
use crate::gesture::{Gesture, GestureRecognizer, DEFAULT_RESET_HOLD_MS};
use crate::hardware::Board;
use crate::network::Network;
use crate::provisioning::Provisioning;
use crate::relay::{RelayController, Source, Transition};
use crate::remote::RemoteStore;
use crate::sync::{Action, RemoteSyncAdapter};
use crate::{Millis, Status};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickOutcome {
    Continue,
    /// The factory reset ran; the process has to restart.
    Restart,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    Terminated,
    Restart,
}

/// Local timing knobs, all in milliseconds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    pub debounce_ms: Millis,
    pub reset_hold_ms: Millis,
    pub connectivity_check_ms: Millis,
    pub primary_resume_delay_ms: Millis,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            reset_hold_ms: DEFAULT_RESET_HOLD_MS,
            connectivity_check_ms: 500,
            primary_resume_delay_ms: 0,
        }
    }
}

impl From<&DeviceConfig> for Timing {
    fn from(config: &DeviceConfig) -> Self {
        Timing {
            debounce_ms: config.debounce_ms,
            reset_hold_ms: config.reset_hold_ms,
            connectivity_check_ms: config.connectivity_check_ms,
            primary_resume_delay_ms: config.primary_resume_delay_ms,
        }
    }
}

pub struct Controller<B, S, N, P> {
    board: B,
    network: N,
    provisioning: P,
    sync: RemoteSyncAdapter<S>,
    debouncer: InputDebouncer,
    gestures: GestureRecognizer,
    relay: RelayController,
    config: RemoteConfig,
    feedback: FeedbackController,
    connected: Option<bool>,
    connectivity_check_ms: Millis,
    next_connectivity_check: Millis,
}

impl<B, S, N, P> Controller<B, S, N, P>
where
    B: Board,
    S: RemoteStore,
    N: Network,
    P: Provisioning,
{
    pub fn new(
        timing: Timing,
        board: B,
        sync: RemoteSyncAdapter<S>,
        network: N,
        provisioning: P,
    ) -> Self {
        let config = RemoteConfig::default();
        Controller {
            board,
            network,
            provisioning,
            sync,
            debouncer: InputDebouncer::new(timing.debounce_ms),
            gestures: GestureRecognizer::new(timing.reset_hold_ms),
            relay: RelayController::new(config.on_timeout_ms),
            config,
            feedback: FeedbackController::new(timing.primary_resume_delay_ms),
            connected: None,
            connectivity_check_ms: timing.connectivity_check_ms,
            next_connectivity_check: 0,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn relay(&self) -> &RelayController {
        &self.relay
    }

    pub fn gestures(&self) -> &GestureRecognizer {
        &self.gestures
    }

    pub fn status(&self) -> Status {
        Status {
            relay: self.relay.state(),
            connected: self.connected.unwrap_or(false),
            config: self.config,
        }
    }

    pub fn tick(&mut self, now: Millis) -> TickOutcome {
        self.check_connectivity(now);

        if let Some(gesture) = self.gestures.poll_reset(now) {
            if self.on_gesture(gesture, now) == TickOutcome::Restart {
                return TickOutcome::Restart;
            }
        }

        if let Some(transition) = self.relay.tick(now) {
            self.on_transition(transition, now);
        }

        let raw = self.board.button_pressed();
        if let Some(event) = self.debouncer.sample(raw, now) {
            for gesture in self.gestures.on_event(event, &self.config, now) {
                self.on_gesture(gesture, now);
            }
        }

        if let Some(gesture) = self.gestures.poll_session(&self.config, now) {
            self.on_gesture(gesture, now);
        }

        self.sync_remote(now);

        let level = self.feedback.level(now);
        self.board.set_light(level);
        TickOutcome::Continue
    }

    /// Releases the relay and turns the light off. For use once the loop has
    /// stopped, before the process exits.
    pub fn power_down(&mut self) {
        if self.relay.is_on() {
            info!("releasing relay before exit");
        }
        self.board.set_relay(false);
        self.board.set_light(0.0);
    }

    fn check_connectivity(&mut self, now: Millis) {
        if now < self.next_connectivity_check {
            return;
        }
        self.next_connectivity_check = now.saturating_add(self.connectivity_check_ms);

        let connected = self.network.is_connected();
        if self.connected == Some(connected) {
            return;
        }
        let was_connected = self.connected == Some(true);
        self.connected = Some(connected);
        info!(
            "network {}",
            if connected { "connected" } else { "disconnected" }
        );

        self.feedback.set_connectivity(connected, now);
        if connected {
            self.sync.connect();
        } else if was_connected {
            self.sync.disconnect();
        }
    }

    fn on_gesture(&mut self, gesture: Gesture, now: Millis) -> TickOutcome {
        match gesture {
            Gesture::PressNoticed => self.sync.report_press(),
            Gesture::Activate => {
                if let Some(transition) = self.relay.activate_local(now) {
                    self.on_transition(transition, now);
                }
                self.sync.report_open();
            }
            Gesture::SessionTimeout => self.feedback.play(Pattern::session_timeout(), now),
            Gesture::ResetTier(tier) => match Pattern::reset_countdown(tier) {
                Some(pattern) => self.feedback.play(pattern, now),
                None => self.feedback.stop_secondary(),
            },
            Gesture::ResetAborted => self.feedback.stop_secondary(),
            Gesture::FactoryReset => {
                self.feedback.stop_secondary();
                self.sync.report_reset();
                if let Err(err) = self.provisioning.factory_reset() {
                    error!("factory reset incomplete: {}", err);
                }
                return TickOutcome::Restart;
            }
        }
        TickOutcome::Continue
    }

    fn on_transition(&mut self, transition: Transition, now: Millis) {
        self.board.set_relay(transition.on);
        if transition.on {
            if transition.source == Source::Local {
                self.gestures.clear_session();
            }
            self.feedback
                .play(Pattern::relay_activated(transition.duration_ms), now);
            self.sync.report_relay(true);
        } else if transition.expired {
            self.sync.report_relay(false);
        }
    }

    fn sync_remote(&mut self, now: Millis) {
        let actions = self.sync.step(now, &mut self.network, &mut self.config);
        for action in actions {
            match action {
                Action::SetDuration(ms) => self.relay.set_duration(ms),
                Action::SetRelay(on) => {
                    if let Some(transition) = self.relay.apply_remote(on, now) {
                        self.on_transition(transition, now);
                    }
                }
                Action::Command(cmd) => self.sync.run_command(cmd, &mut self.network),
            }
        }
    }
}

/// Drives a [`Controller`] at a fixed tick until told to stop.
pub struct Scheduler<C> {
    clock: C,
    tick: Duration,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, tick: Duration) -> Self {
        Scheduler { clock, tick }
    }

    /// Runs ticks until `term` is set or a factory reset asks for a restart.
    /// `publish` sees every status that differs from the previous one.
    pub fn run<B, S, N, P, F>(
        &self,
        controller: &mut Controller<B, S, N, P>,
        term: &AtomicBool,
        mut publish: F,
    ) -> RunOutcome
    where
        B: Board,
        S: RemoteStore,
        N: Network,
        P: Provisioning,
        F: FnMut(&Status),
    {
        let mut last_status = None;
        while !term.load(Ordering::Relaxed) {
            let now = self.clock.now_ms();
            if controller.tick(now) == TickOutcome::Restart {
                warn!("control loop ending for restart");
                return RunOutcome::Restart;
            }

            let status = controller.status();
            if last_status != Some(status) {
                publish(&status);
                last_status = Some(status);
            }
            self.clock.sleep(self.tick);
        }
        info!("control loop terminated");
        RunOutcome::Terminated
    }
}
