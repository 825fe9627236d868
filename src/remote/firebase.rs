//! Firebase Realtime Database over its REST API.
//!
//! Writes are plain blocking requests. The change stream is a server-sent
//! event response read on a background thread and handed to the control loop
//! through a channel.

use std::io::{self, BufRead, BufReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use json::{object, JsonValue};
use log::{debug, info, warn};
use ureq::{Agent, AgentBuilder};

use super::{RemoteStore, StreamEvent, StreamMessage};
use crate::error::RemoteError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// The server sends keep-alive events every 30 seconds.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(45);
const STREAM_RETRY_DELAY: Duration = Duration::from_secs(2);

type StreamItem = Result<StreamMessage, RemoteError>;

struct Stream {
    rx: Receiver<StreamItem>,
    stop: Arc<AtomicBool>,
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

pub struct FirebaseStore {
    base_url: String,
    secret: Option<String>,
    agent: Agent,
    stream: Option<Stream>,
}

impl FirebaseStore {
    pub fn new(base_url: &str, secret: Option<String>) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(REQUEST_TIMEOUT)
            .timeout_write(REQUEST_TIMEOUT)
            .build();
        FirebaseStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
            agent,
            stream: None,
        }
    }

    fn url(&self, path: &str) -> String {
        let mut url = format!("{}/{}.json", self.base_url, path.trim_matches('/'));
        if let Some(secret) = &self.secret {
            url.push_str("?auth=");
            url.push_str(secret);
        }
        url
    }
}

impl RemoteStore for FirebaseStore {
    fn read_snapshot(&mut self, path: &str) -> Result<JsonValue, RemoteError> {
        let body = self.agent.get(&self.url(path)).call()?.into_string()?;
        Ok(json::parse(&body)?)
    }

    fn begin_stream(&mut self, path: &str) -> Result<(), RemoteError> {
        self.end_stream();

        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let agent = AgentBuilder::new()
            .timeout_connect(REQUEST_TIMEOUT)
            .timeout_read(STREAM_READ_TIMEOUT)
            .build();
        let url = self.url(path);
        {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(String::from("remote-stream"))
                .spawn(move || {
                    run_stream(&agent, &url, &tx, &stop);
                    debug!("stream thread exiting");
                })?;
        }
        info!("subscribed to {}", path);
        self.stream = Some(Stream { rx, stop });
        Ok(())
    }

    fn end_stream(&mut self) {
        if self.stream.take().is_some() {
            info!("stream closed");
        }
    }

    fn poll_stream(&mut self) -> Result<Option<StreamMessage>, RemoteError> {
        let stream = match &self.stream {
            Some(stream) => stream,
            None => return Ok(None),
        };
        match stream.rx.try_recv() {
            Ok(item) => item.map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.stream = None;
                Err(RemoteError::StreamClosed(String::from("stream thread ended")))
            }
        }
    }

    fn set(&mut self, path: &str, value: JsonValue) -> Result<(), RemoteError> {
        self.agent
            .put(&self.url(path))
            .send_string(&value.dump())?;
        Ok(())
    }

    fn push_timestamp(&mut self, path: &str) -> Result<(), RemoteError> {
        let body = object! { ".sv": "timestamp" };
        self.agent.post(&self.url(path)).send_string(&body.dump())?;
        Ok(())
    }
}

fn run_stream(agent: &Agent, url: &str, tx: &Sender<StreamItem>, stop: &AtomicBool) {
    while !stop.load(Ordering::Relaxed) {
        let response = agent
            .get(url)
            .set("Accept", "text/event-stream")
            .call();
        let reader = match response {
            Ok(response) => BufReader::new(response.into_reader()),
            Err(err) => {
                if tx.send(Err(err.into())).is_err() {
                    return;
                }
                thread::sleep(STREAM_RETRY_DELAY);
                continue;
            }
        };

        match read_events(reader, tx, stop) {
            Ok(()) => return,
            Err(err) if is_timeout(&err) => {
                // Resume by reconnecting; the server replays the full
                // document as the first event.
                if tx.send(Ok(StreamMessage::TimedOut)).is_err() {
                    return;
                }
            }
            Err(err) => {
                if tx.send(Err(err.into())).is_err() {
                    return;
                }
                thread::sleep(STREAM_RETRY_DELAY);
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Reads events until the stream is stopped, the receiver goes away, or the
/// connection fails.
fn read_events<R: BufRead>(
    reader: R,
    tx: &Sender<StreamItem>,
    stop: &AtomicBool,
) -> io::Result<()> {
    let mut event = String::new();
    let mut data = String::new();
    for line in reader.lines() {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
        let line = line?;
        if line.is_empty() {
            if !event.is_empty() {
                let parsed = parse_event(&event, &data);
                if tx.send(parsed).is_err() {
                    return Ok(());
                }
            }
            event.clear();
            data.clear();
        } else if let Some(name) = line.strip_prefix("event:") {
            event = name.trim().to_string();
        } else if let Some(payload) = line.strip_prefix("data:") {
            data.push_str(payload.trim());
        }
    }
    Err(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "event stream ended",
    ))
}

pub(crate) fn parse_event(event: &str, data: &str) -> Result<StreamMessage, RemoteError> {
    match event {
        "put" | "patch" => {
            let mut payload = json::parse(data)?;
            let change = StreamEvent {
                path: payload["path"].as_str().unwrap_or("/").to_string(),
                data: payload.remove("data"),
            };
            if event == "patch" {
                Ok(StreamMessage::Patch(change))
            } else {
                Ok(StreamMessage::Put(change))
            }
        }
        "keep-alive" => Ok(StreamMessage::KeepAlive),
        "cancel" | "auth_revoked" => {
            warn!("stream {}: {}", event, data);
            Ok(StreamMessage::Cancelled(event.to_string()))
        }
        other => Err(RemoteError::StreamClosed(format!(
            "unexpected stream event {}",
            other
        ))),
    }
}
