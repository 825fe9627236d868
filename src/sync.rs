//! Mirrors the device's remote document.
//!
//! Inbound changes, whether a whole-document snapshot or a single-field delta,
//! are decoded into [`FieldUpdate`]s and merged by [`merge`], which does not
//! care how they arrived. Outbound writes are queued and flushed during the
//! remote-sync step of the tick, so a slow or failing remote never reaches the
//! gesture or relay logic.

use std::collections::VecDeque;

use json::JsonValue;
use log::{debug, info, warn};

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::network::Network;
use crate::remote::{DevicePaths, LogKind, RemoteStore, StreamMessage};
use crate::Millis;

const OUTBOX_CAPACITY: usize = 64;
const MAX_MESSAGES_PER_STEP: usize = 16;

pub const CMD_NONE: i64 = 0;
pub const CMD_REFRESH_NETSTATS: i64 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    OnTimeout,
    On,
    PressCount,
    PressTimeout,
    Enabled,
    Cmd,
}

impl Field {
    /// Dispatch order when a whole document arrives.
    pub const ALL: [Field; 6] = [
        Field::OnTimeout,
        Field::On,
        Field::PressCount,
        Field::PressTimeout,
        Field::Enabled,
        Field::Cmd,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::OnTimeout => "on_timeout",
            Field::On => "on",
            Field::PressCount => "press_count",
            Field::PressTimeout => "press_timeout",
            Field::Enabled => "enabled",
            Field::Cmd => "cmd",
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|field| field.key() == key)
    }
}

/// New value of one field. `None` means the field is absent or unusable.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldUpdate {
    pub field: Field,
    pub value: Option<i64>,
}

/// What the controller has to do after a merge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Action {
    SetDuration(Millis),
    SetRelay(bool),
    Command(i64),
}

fn scalar(value: &JsonValue) -> Option<i64> {
    if let Some(b) = value.as_bool() {
        return Some(b as i64);
    }
    value.as_i64()
}

/// Every field of a full document, in dispatch order. Missing fields come
/// through as `None`.
pub fn decode_snapshot(doc: &JsonValue) -> Vec<FieldUpdate> {
    Field::ALL
        .iter()
        .map(|&field| FieldUpdate {
            field,
            value: scalar(&doc[field.key()]),
        })
        .collect()
}

pub fn decode(message: &StreamMessage) -> Vec<FieldUpdate> {
    let (event, is_patch) = match message {
        StreamMessage::Put(event) => (event, false),
        StreamMessage::Patch(event) => (event, true),
        _ => return Vec::new(),
    };

    let key = event.path.trim_matches('/');
    if key.is_empty() {
        if is_patch {
            return Field::ALL
                .iter()
                .filter(|field| event.data.has_key(field.key()))
                .map(|&field| FieldUpdate {
                    field,
                    value: scalar(&event.data[field.key()]),
                })
                .collect();
        }
        return decode_snapshot(&event.data);
    }

    match Field::from_key(key) {
        Some(field) => vec![FieldUpdate {
            field,
            value: scalar(&event.data),
        }],
        None => {
            debug!("ignoring change at {}", event.path);
            Vec::new()
        }
    }
}

/// Applies updates to `config` and returns what else has to happen, in order.
///
/// Out-of-range values fall back to defaults. A command equal to the one
/// still waiting for its acknowledgment is not run again.
pub fn merge(updates: &[FieldUpdate], config: &mut RemoteConfig) -> Vec<Action> {
    let mut actions = Vec::new();
    for update in updates {
        match update.field {
            Field::OnTimeout => {
                let ms = config.set_on_timeout(update.value.unwrap_or(0));
                actions.push(Action::SetDuration(ms));
            }
            Field::PressCount => {
                config.set_press_count(update.value.unwrap_or(0));
            }
            Field::PressTimeout => {
                config.set_press_timeout(update.value.unwrap_or(0));
            }
            Field::On => {
                if let Some(value) = update.value {
                    actions.push(Action::SetRelay(value == 1));
                }
            }
            Field::Enabled => {
                if let Some(value) = update.value {
                    config.set_enabled(value == 1);
                }
            }
            Field::Cmd => match update.value {
                None | Some(CMD_NONE) => {}
                Some(cmd) if config.pending_command_id == Some(cmd) => {
                    debug!("command {} already awaiting acknowledgment", cmd);
                }
                Some(cmd) => {
                    config.pending_command_id = Some(cmd);
                    actions.push(Action::Command(cmd));
                }
            },
        }
    }
    actions
}

#[derive(Clone, Debug, PartialEq)]
enum Outbound {
    Set { path: String, value: JsonValue },
    Timestamp { path: String },
    Ack { path: String },
}

impl Outbound {
    fn path(&self) -> &str {
        match self {
            Outbound::Set { path, .. }
            | Outbound::Timestamp { path }
            | Outbound::Ack { path } => path,
        }
    }

    /// A newer write that can take this entry's place in the queue. Only the
    /// latest value of a field matters; log entries never fold.
    fn is_replaced_by(&self, newer: &Outbound) -> bool {
        match (self, newer) {
            (Outbound::Set { path, .. }, Outbound::Set { path: newer, .. })
            | (Outbound::Ack { path }, Outbound::Ack { path: newer }) => path == newer,
            _ => false,
        }
    }
}

pub struct RemoteSyncAdapter<S> {
    store: S,
    paths: DevicePaths,
    outbox: VecDeque<Outbound>,
    connected: bool,
    streaming: bool,
    needs_snapshot: bool,
    login_due: bool,
    netstats_interval_ms: Millis,
    next_netstats: Option<Millis>,
}

impl<S: RemoteStore> RemoteSyncAdapter<S> {
    pub fn new(store: S, paths: DevicePaths, netstats_interval_ms: Millis) -> Self {
        RemoteSyncAdapter {
            store,
            paths,
            outbox: VecDeque::new(),
            connected: false,
            streaming: false,
            needs_snapshot: false,
            login_due: false,
            netstats_interval_ms,
            next_netstats: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The network came up: log in, reread the document and resubscribe on
    /// the next step.
    pub fn connect(&mut self) {
        info!("remote sync connecting");
        self.connected = true;
        self.login_due = true;
        self.needs_snapshot = true;
        self.streaming = false;
        self.next_netstats = None;
    }

    pub fn disconnect(&mut self) {
        info!("remote sync disconnected");
        self.connected = false;
        self.streaming = false;
        self.store.end_stream();
    }

    /// True while a command acknowledgment has not reached the remote yet.
    pub fn ack_pending(&self) -> bool {
        self.outbox
            .iter()
            .any(|entry| matches!(entry, Outbound::Ack { .. }))
    }

    /// One remote-sync step: send what is queued, then merge inbound changes
    /// into `config`. Returns what the controller still has to do. Failures
    /// are logged and retried on a later step.
    pub fn step(
        &mut self,
        now: Millis,
        network: &mut dyn Network,
        config: &mut RemoteConfig,
    ) -> Vec<Action> {
        let updates = self.receive(now, network);
        if config.pending_command_id.is_some() && !self.ack_pending() {
            debug!("command acknowledgment delivered");
            config.pending_command_id = None;
        }
        merge(&updates, config)
    }

    fn receive(&mut self, now: Millis, network: &mut dyn Network) -> Vec<FieldUpdate> {
        if !self.connected {
            return Vec::new();
        }

        if self.login_due {
            self.login_due = false;
            self.enqueue(Outbound::Timestamp {
                path: self.paths.log(LogKind::Login),
            });
            let diagnostics = network.diagnostics();
            info!("network diagnostics: {:?}", diagnostics);
            self.enqueue(Outbound::Set {
                path: self.paths.netstats.clone(),
                value: diagnostics.to_json(),
            });
        }
        self.poll_netstats(now, network);
        self.flush();

        if self.needs_snapshot {
            return match self.store.read_snapshot(&self.paths.state) {
                Ok(doc) => {
                    self.needs_snapshot = false;
                    decode_snapshot(&doc)
                }
                Err(err) => {
                    warn!("unable to read remote state, retrying: {}", err);
                    Vec::new()
                }
            };
        }

        if !self.streaming {
            match self.store.begin_stream(&self.paths.state) {
                Ok(()) => self.streaming = true,
                Err(err) => {
                    warn!("unable to begin stream, retrying: {}", err);
                    return Vec::new();
                }
            }
        }

        let mut updates = Vec::new();
        for _ in 0..MAX_MESSAGES_PER_STEP {
            match self.store.poll_stream() {
                Ok(Some(StreamMessage::TimedOut)) => {
                    info!("stream timeout, resuming");
                }
                Ok(Some(StreamMessage::KeepAlive)) => {}
                Ok(Some(StreamMessage::Cancelled(reason))) => {
                    warn!("stream cancelled ({}), resubscribing", reason);
                    self.store.end_stream();
                    self.streaming = false;
                    break;
                }
                Ok(Some(message)) => updates.extend(decode(&message)),
                Ok(None) => break,
                Err(RemoteError::StreamClosed(reason)) => {
                    warn!("stream closed ({}), resubscribing", reason);
                    self.streaming = false;
                    break;
                }
                Err(err) => {
                    warn!("unable to read stream: {}", err);
                    break;
                }
            }
        }
        updates
    }

    /// Runs a one-shot command and queues its acknowledgment.
    pub fn run_command(&mut self, cmd: i64, network: &mut dyn Network) {
        info!("running remote command {}", cmd);
        match cmd {
            CMD_REFRESH_NETSTATS => self.report_signal(network),
            other => warn!("unknown remote command {}", other),
        }
        self.enqueue(Outbound::Ack {
            path: self.paths.state_field(Field::Cmd.key()),
        });
    }

    pub fn report_press(&mut self) {
        self.enqueue(Outbound::Timestamp {
            path: self.paths.log(LogKind::Press),
        });
    }

    pub fn report_open(&mut self) {
        self.enqueue(Outbound::Timestamp {
            path: self.paths.log(LogKind::Open),
        });
    }

    pub fn report_relay(&mut self, on: bool) {
        self.enqueue(Outbound::Set {
            path: self.paths.state_field(Field::On.key()),
            value: JsonValue::from(on as i64),
        });
    }

    /// Queues the reset log entry and tries to send everything right away,
    /// since the device is about to go down.
    pub fn report_reset(&mut self) {
        self.enqueue(Outbound::Timestamp {
            path: self.paths.log(LogKind::Reset),
        });
        if self.connected {
            self.flush();
        }
    }

    fn report_signal(&mut self, network: &mut dyn Network) {
        match network.signal_strength() {
            Some(rssi) => self.enqueue(Outbound::Set {
                path: self.paths.netstats_field("rssi"),
                value: JsonValue::from(rssi),
            }),
            None => warn!("signal strength unavailable"),
        }
    }

    fn poll_netstats(&mut self, now: Millis, network: &mut dyn Network) {
        if self.netstats_interval_ms == 0 {
            return;
        }
        match self.next_netstats {
            Some(due) if now < due => {}
            Some(_) => {
                self.report_signal(network);
                self.next_netstats = Some(now.saturating_add(self.netstats_interval_ms));
            }
            None => self.next_netstats = Some(now.saturating_add(self.netstats_interval_ms)),
        }
    }

    /// Queues a write. A full outbox drops its oldest entry, except command
    /// acknowledgments, which stay until they are delivered.
    fn enqueue(&mut self, entry: Outbound) {
        if let Some(queued) = self
            .outbox
            .iter_mut()
            .find(|queued| queued.is_replaced_by(&entry))
        {
            *queued = entry;
            return;
        }

        if self.outbox.len() >= OUTBOX_CAPACITY {
            let oldest = self
                .outbox
                .iter()
                .position(|queued| !matches!(queued, Outbound::Ack { .. }));
            match oldest.and_then(|index| self.outbox.remove(index)) {
                Some(dropped) => warn!("outbox full, dropping write to {}", dropped.path()),
                None => {
                    warn!("outbox full, dropping write to {}", entry.path());
                    return;
                }
            }
        }
        self.outbox.push_back(entry);
    }

    fn flush(&mut self) {
        while let Some(entry) = self.outbox.front() {
            let result = match entry {
                Outbound::Set { path, value } => self.store.set(path, value.clone()),
                Outbound::Timestamp { path } => self.store.push_timestamp(path),
                Outbound::Ack { path } => self.store.set(path, JsonValue::from(CMD_NONE)),
            };
            match result {
                Ok(()) => {
                    debug!("remote write to {} done", entry.path());
                    self.outbox.pop_front();
                }
                Err(err) => {
                    warn!("remote write to {} failed, retrying: {}", entry.path(), err);
                    break;
                }
            }
        }
    }
}
