//! In-memory collaborators for driving a whole controller tick by tick.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use json::JsonValue;

use doorbell_controller::error::{ProvisioningError, RemoteError};
use doorbell_controller::hardware::Board;
use doorbell_controller::network::{NetDiagnostics, Network};
use doorbell_controller::provisioning::Provisioning;
use doorbell_controller::remote::{DevicePaths, RemoteStore, StreamEvent, StreamMessage};
use doorbell_controller::supervisor::{Controller, TickOutcome, Timing};
use doorbell_controller::sync::RemoteSyncAdapter;
use doorbell_controller::Millis;

pub const DEVICE: &str = "dev-1";

#[derive(Debug, Default)]
pub struct BoardState {
    pub pressed: bool,
    pub relay_writes: Vec<bool>,
    pub light: f32,
}

#[derive(Clone, Default)]
pub struct FakeBoard(pub Rc<RefCell<BoardState>>);

impl Board for FakeBoard {
    fn button_pressed(&mut self) -> bool {
        self.0.borrow().pressed
    }

    fn set_relay(&mut self, on: bool) {
        self.0.borrow_mut().relay_writes.push(on);
    }

    fn set_light(&mut self, level: f32) {
        self.0.borrow_mut().light = level;
    }
}

#[derive(Debug)]
pub struct StoreState {
    pub document: JsonValue,
    pub inbound: VecDeque<StreamMessage>,
    pub streaming: bool,
    pub writes: Vec<(String, JsonValue)>,
    pub timestamps: Vec<String>,
    pub offline: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        StoreState {
            document: JsonValue::Null,
            inbound: VecDeque::new(),
            streaming: false,
            writes: Vec::new(),
            timestamps: Vec::new(),
            offline: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore(pub Rc<RefCell<StoreState>>);

impl MemoryStore {
    pub fn put(&self, path: &str, data: JsonValue) {
        self.0
            .borrow_mut()
            .inbound
            .push_back(StreamMessage::Put(StreamEvent {
                path: path.to_string(),
                data,
            }));
    }

    pub fn writes_to(&self, field: &str) -> Vec<JsonValue> {
        let suffix = format!("/{}", field);
        self.0
            .borrow()
            .writes
            .iter()
            .filter(|(path, _)| path.ends_with(&suffix))
            .map(|(_, value)| value.clone())
            .collect()
    }

    pub fn logs(&self, kind: &str) -> usize {
        let suffix = format!("/logs/{}", kind);
        self.0
            .borrow()
            .timestamps
            .iter()
            .filter(|path| path.ends_with(&suffix))
            .count()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.0.borrow().offline {
            Err(RemoteError::Transport(String::from("offline")))
        } else {
            Ok(())
        }
    }
}

impl RemoteStore for MemoryStore {
    fn read_snapshot(&mut self, _path: &str) -> Result<JsonValue, RemoteError> {
        self.check_online()?;
        Ok(self.0.borrow().document.clone())
    }

    fn begin_stream(&mut self, _path: &str) -> Result<(), RemoteError> {
        self.check_online()?;
        self.0.borrow_mut().streaming = true;
        Ok(())
    }

    fn end_stream(&mut self) {
        self.0.borrow_mut().streaming = false;
    }

    fn poll_stream(&mut self) -> Result<Option<StreamMessage>, RemoteError> {
        let mut state = self.0.borrow_mut();
        if !state.streaming {
            return Ok(None);
        }
        Ok(state.inbound.pop_front())
    }

    fn set(&mut self, path: &str, value: JsonValue) -> Result<(), RemoteError> {
        self.check_online()?;
        self.0.borrow_mut().writes.push((path.to_string(), value));
        Ok(())
    }

    fn push_timestamp(&mut self, path: &str) -> Result<(), RemoteError> {
        self.check_online()?;
        self.0.borrow_mut().timestamps.push(path.to_string());
        Ok(())
    }
}

#[derive(Debug)]
pub struct NetworkState {
    pub connected: bool,
    pub rssi: Option<i32>,
}

#[derive(Clone)]
pub struct FakeNetwork(pub Rc<RefCell<NetworkState>>);

impl Default for FakeNetwork {
    fn default() -> Self {
        FakeNetwork(Rc::new(RefCell::new(NetworkState {
            connected: true,
            rssi: Some(-52),
        })))
    }
}

impl Network for FakeNetwork {
    fn is_connected(&mut self) -> bool {
        self.0.borrow().connected
    }

    fn signal_strength(&mut self) -> Option<i32> {
        self.0.borrow().rssi
    }

    fn diagnostics(&mut self) -> NetDiagnostics {
        NetDiagnostics {
            public_ip: Some(String::from("198.51.100.4")),
            rssi: self.0.borrow().rssi,
            ..NetDiagnostics::default()
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeProvisioning(pub Rc<RefCell<usize>>);

impl Provisioning for FakeProvisioning {
    fn factory_reset(&mut self) -> Result<(), ProvisioningError> {
        *self.0.borrow_mut() += 1;
        Ok(())
    }
}

pub type TestController = Controller<FakeBoard, MemoryStore, FakeNetwork, FakeProvisioning>;

/// A controller plus handles on all of its fakes, ticked once per
/// millisecond.
pub struct Rig {
    pub controller: TestController,
    pub board: FakeBoard,
    pub store: MemoryStore,
    pub network: FakeNetwork,
    pub provisioning: FakeProvisioning,
    pub now: Millis,
}

impl Rig {
    /// Boots, connects and subscribes; the clock ends at 1000.
    pub fn new() -> Rig {
        Rig::with_timing(Timing::default())
    }

    pub fn with_timing(timing: Timing) -> Rig {
        let board = FakeBoard::default();
        let store = MemoryStore::default();
        let network = FakeNetwork::default();
        let provisioning = FakeProvisioning::default();
        let sync = RemoteSyncAdapter::new(store.clone(), DevicePaths::new(DEVICE), 0);
        let controller = Controller::new(
            timing,
            board.clone(),
            sync,
            network.clone(),
            provisioning.clone(),
        );
        let mut rig = Rig {
            controller,
            board,
            store,
            network,
            provisioning,
            now: 0,
        };
        rig.controller.tick(0);
        rig.run_until(1000);
        assert!(rig.store.0.borrow().streaming);
        rig
    }

    /// Ticks every millisecond up to and including `until`. Stops early and
    /// returns `Restart` if a tick asks for it.
    pub fn run_until(&mut self, until: Millis) -> TickOutcome {
        while self.now < until {
            self.now += 1;
            if self.controller.tick(self.now) == TickOutcome::Restart {
                return TickOutcome::Restart;
            }
        }
        TickOutcome::Continue
    }

    /// Changes the button so the first tick to see it is `at`.
    pub fn set_button(&mut self, pressed: bool, at: Millis) -> TickOutcome {
        if self.run_until(at - 1) == TickOutcome::Restart {
            return TickOutcome::Restart;
        }
        self.board.0.borrow_mut().pressed = pressed;
        self.run_until(at)
    }

    /// Short press that releases at `release_at`.
    pub fn tap(&mut self, release_at: Millis) {
        self.set_button(true, release_at - 100);
        self.set_button(false, release_at);
    }

    /// Queues a stream change so it is handled by the tick at `at`.
    pub fn remote_put(&mut self, path: &str, data: JsonValue, at: Millis) {
        self.run_until(at - 1);
        self.store.put(path, data);
        self.run_until(at);
    }

    pub fn relay_is_on(&self) -> bool {
        self.controller.relay().is_on()
    }

    pub fn resets(&self) -> usize {
        *self.provisioning.0.borrow()
    }
}
