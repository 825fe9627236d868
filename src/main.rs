use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use std::{env, io, process, thread};

use log::{error, info, warn, LevelFilter};
use syslog::Facility;

use doorbell_controller::clock::SystemClock;
use doorbell_controller::config::{DeviceConfig, DEFAULT_CONFIG_PATH};
use doorbell_controller::hardware::GpioBoard;
use doorbell_controller::network::{self, SystemNetwork};
use doorbell_controller::provisioning::CredentialsFile;
use doorbell_controller::remote::firebase::FirebaseStore;
use doorbell_controller::remote::DevicePaths;
use doorbell_controller::supervisor::{Controller, RunOutcome, Scheduler, Timing};
use doorbell_controller::sync::RemoteSyncAdapter;
use doorbell_controller::{http, term_on_err};

const APP_NAME: &str = "doorbell-controller";
// Non-zero so the service manager brings the device back up unprovisioned.
const RESTART_EXIT_CODE: i32 = 3;

fn main() -> Result<(), io::Error> {
    init_logging();

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))?;

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| String::from(DEFAULT_CONFIG_PATH));
    let config = match DeviceConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            eprintln!("Unable to load config: {}", err);
            process::exit(1);
        }
    };
    let device_id = match &config.device_id {
        Some(id) => id.clone(),
        None => network::mac_address(&config.interface)?,
    };
    info!("device id={}", device_id);

    // Without the pins there is nothing to control.
    let board = match GpioBoard::new(
        config.button_pin,
        config.relay_pin,
        config.led_pin,
        config.led_active_low,
    ) {
        Ok(board) => board,
        Err(err) => {
            error!("Unable to set up GPIO: {}", err);
            process::exit(1);
        }
    };

    let store = FirebaseStore::new(&config.database_url, config.database_secret.clone());
    let sync = RemoteSyncAdapter::new(
        store,
        DevicePaths::new(&device_id),
        config.netstats_interval_ms,
    );
    let mut controller = Controller::new(
        Timing::from(&config),
        board,
        sync,
        SystemNetwork::new(&config.interface, &config.public_ip_url),
        CredentialsFile::new(&config.credentials_path),
    );

    let clock = SystemClock::new();
    let status = Arc::new(RwLock::new(controller.status()));

    // The status page is optional, the doorbell works without it.
    let server = match http::Server::new(config.status_addr.as_str()) {
        Ok(server) => {
            info!("http server running on {}", config.status_addr);
            Some(Arc::new(server))
        }
        Err(err) => {
            warn!(
                "Unable to start http server on {}: {}",
                config.status_addr, err
            );
            None
        }
    };
    let server_thread = server.as_ref().map(|server| {
        let server = Arc::clone(server);
        let status = Arc::clone(&status);
        thread::spawn(move || {
            server.handle_requests(status, clock);
            info!("server thread exiting");
        })
    });

    let scheduler = Scheduler::new(clock, Duration::from_millis(config.tick_ms));
    let outcome = {
        let status = Arc::clone(&status);
        let term_flag = Arc::clone(&term);
        scheduler.run(&mut controller, &term, move |new_status| {
            *term_on_err!(status.write(), &term_flag) = *new_status;
        })
    };

    if let Some(server) = server {
        server.shutdown();
    }
    if let Some(thread) = server_thread {
        let _ = thread.join();
    }

    match outcome {
        RunOutcome::Terminated => Ok(()),
        RunOutcome::Restart => {
            // exit skips destructors, so the pins are not reset for us
            controller.power_down();
            // Make sure the removed credentials are on disk before going down.
            unsafe { libc::sync() };
            process::exit(RESTART_EXIT_CODE);
        }
    }
}

fn init_logging() {
    let level = env::var("DOORBELL_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(LevelFilter::Info);
    if let Err(err) = syslog::init(Facility::LOG_DAEMON, level, Some(APP_NAME)) {
        eprintln!("Unable to connect to syslog: {}", err);
    }
}
