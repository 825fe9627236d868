//! Boundary to the remote document store.
//!
//! The control loop only ever pulls from the store: change notifications are
//! buffered by the implementation and handed out one at a time by
//! [`RemoteStore::poll_stream`].

use json::JsonValue;

use crate::error::RemoteError;

pub mod firebase;

/// A change at `path` (relative to the subscribed location). A path of `/`
/// carries the whole document.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub path: String,
    pub data: JsonValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    /// `data` replaces the value at `path`.
    Put(StreamEvent),
    /// `data` is an object whose keys are merged into the value at `path`.
    Patch(StreamEvent),
    KeepAlive,
    /// Nothing arrived within the stream's read timeout. The store resumes by
    /// itself; this is informational.
    TimedOut,
    /// The store ended the subscription and it must be started again.
    Cancelled(String),
}

pub trait RemoteStore {
    fn read_snapshot(&mut self, path: &str) -> Result<JsonValue, RemoteError>;

    fn begin_stream(&mut self, path: &str) -> Result<(), RemoteError>;

    fn end_stream(&mut self);

    /// Next buffered stream message, if any. Never blocks.
    fn poll_stream(&mut self) -> Result<Option<StreamMessage>, RemoteError>;

    fn set(&mut self, path: &str, value: JsonValue) -> Result<(), RemoteError>;

    /// Appends a server-side timestamp under `path`.
    fn push_timestamp(&mut self, path: &str) -> Result<(), RemoteError>;
}

/// Paths inside one device's document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DevicePaths {
    pub state: String,
    pub netstats: String,
    root: String,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogKind {
    Login,
    Press,
    Open,
    Reset,
}

impl LogKind {
    fn segment(self) -> &'static str {
        match self {
            LogKind::Login => "login",
            LogKind::Press => "push",
            LogKind::Open => "open",
            LogKind::Reset => "reset",
        }
    }
}

impl DevicePaths {
    pub fn new(device_id: &str) -> Self {
        let root = format!("devices/{}", device_id);
        DevicePaths {
            state: format!("{}/state", root),
            netstats: format!("{}/netstats", root),
            root,
        }
    }

    pub fn state_field(&self, field: &str) -> String {
        format!("{}/{}", self.state, field)
    }

    pub fn netstats_field(&self, field: &str) -> String {
        format!("{}/{}", self.netstats, field)
    }

    pub fn log(&self, kind: LogKind) -> String {
        format!("{}/logs/{}", self.root, kind.segment())
    }
}
