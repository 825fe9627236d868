use std::error::Error;
use std::net::ToSocketAddrs;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use json::object;
use tiny_http::Response;

use crate::clock::{Clock, SystemClock};
use crate::Status;

const HTML: &str = include_str!("status.html");

/// Read-only status page. Runs on its own thread and never touches device
/// state beyond reading the published [`Status`].
pub struct Server(tiny_http::Server);

impl Server {
    pub fn new<A>(addr: A) -> Result<Server, Box<dyn Error + Send + Sync + 'static>>
    where
        A: ToSocketAddrs,
    {
        tiny_http::Server::http(addr).map(Server)
    }

    pub fn handle_requests(&self, status: Arc<RwLock<Status>>, clock: SystemClock) {
        let json = "Content-type: application/json; charset=utf-8"
            .parse::<tiny_http::Header>()
            .expect("static header");
        let html_content = "Content-type: text/html; charset=utf-8"
            .parse::<tiny_http::Header>()
            .expect("static header");
        for request in self.0.incoming_requests() {
            let current = match status.read() {
                Ok(current) => *current,
                Err(_) => {
                    let unavailable = Response::from_string("Unavailable").with_status_code(503);
                    let _ = request.respond(unavailable);
                    continue;
                }
            };
            let now = clock.now_ms();
            let response = match request.url() {
                "/" => {
                    let network = if current.connected {
                        "🟢 Online"
                    } else {
                        "🔴 Offline"
                    };
                    let enabled = if current.config.system_enabled {
                        "Enabled"
                    } else {
                        "Disabled"
                    };
                    let html = HTML
                        .replace("$relay$", &relay_summary(&current, now))
                        .replace("$network$", network)
                        .replace("$enabled$", enabled);
                    Response::from_string(html).with_header(html_content.clone())
                }
                "/status.json" => {
                    let on_for = current
                        .relay
                        .started
                        .map(|started| now.saturating_sub(started) / 1000);
                    let obj = object! {
                        relay_on: current.relay.is_on,
                        relay_source: current.relay.source.map(|source| source.to_string()),
                        on_for: on_for,
                        connected: current.connected,
                        enabled: current.config.system_enabled,
                        on_timeout: current.config.on_timeout_ms,
                        press_count: current.config.press_count_threshold,
                        press_timeout: current.config.press_timeout_ms
                    };
                    let body = json::stringify_pretty(obj, 2);
                    Response::from_string(body).with_header(json.clone())
                }
                _ => Response::from_string("Not found").with_status_code(404),
            };

            // Ignoring I/O errors that occur here so that we don't take down the process if there
            // is an issue sending the response.
            let _ = request.respond(response);
        }
    }

    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

fn relay_summary(status: &Status, now: u64) -> String {
    match (status.relay.is_on, status.relay.started) {
        (true, Some(started)) => {
            let formatter = timeago::Formatter::new();
            let on_for = Duration::from_millis(now.saturating_sub(started));
            format!("🔓 Open, {}", formatter.convert(on_for))
        }
        (true, None) => String::from("🔓 Open"),
        (false, _) => String::from("🔒 Closed"),
    }
}
