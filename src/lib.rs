pub mod clock;
pub mod config;
pub mod debounce;
pub mod error;
pub mod feedback;
pub mod gesture;
pub mod hardware;
pub mod http;
mod led;
pub mod network;
pub mod provisioning;
pub mod relay;
pub mod remote;
pub mod supervisor;
pub mod sync;

use config::RemoteConfig;
use relay::RelayState;

/// Milliseconds on the monotonic clock since boot.
pub type Millis = u64;

#[macro_export]
macro_rules! term_on_err {
    ($expr:expr, $term:expr) => {
        match $expr {
            std::result::Result::Ok(val) => val,
            std::result::Result::Err(err) => {
                log::error!("setting term due to error: {}", err);
                $term.store(true, std::sync::atomic::Ordering::SeqCst);
                return;
            }
        }
    };
}

/// What the control loop publishes for the status page.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub relay: RelayState,
    pub connected: bool,
    pub config: RemoteConfig,
}
