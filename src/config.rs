use std::fs;
use std::path::Path;

use json::JsonValue;
use log::{debug, info};

use crate::error::ConfigError;
use crate::Millis;

pub const DEFAULT_ON_TIMEOUT_MS: Millis = 4000;
pub const DEFAULT_PRESS_COUNT: u32 = 5;
pub const DEFAULT_PRESS_TIMEOUT_MS: Millis = 4000;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/doorbell/config.json";

/// Settings mirrored from the remote document.
///
/// Setters never store an invalid value: anything out of range falls back to
/// the compiled default.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RemoteConfig {
    pub on_timeout_ms: Millis,
    pub press_count_threshold: u32,
    pub press_timeout_ms: Millis,
    pub system_enabled: bool,
    pub pending_command_id: Option<i64>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            on_timeout_ms: DEFAULT_ON_TIMEOUT_MS,
            press_count_threshold: DEFAULT_PRESS_COUNT,
            press_timeout_ms: DEFAULT_PRESS_TIMEOUT_MS,
            system_enabled: true,
            pending_command_id: None,
        }
    }
}

impl RemoteConfig {
    pub fn set_on_timeout(&mut self, raw: i64) -> Millis {
        self.on_timeout_ms = positive_or(raw, DEFAULT_ON_TIMEOUT_MS);
        self.on_timeout_ms
    }

    pub fn set_press_count(&mut self, raw: i64) -> u32 {
        self.press_count_threshold = if raw < 2 || raw > i64::from(u32::MAX) {
            DEFAULT_PRESS_COUNT
        } else {
            raw as u32
        };
        self.press_count_threshold
    }

    pub fn set_press_timeout(&mut self, raw: i64) -> Millis {
        self.press_timeout_ms = positive_or(raw, DEFAULT_PRESS_TIMEOUT_MS);
        self.press_timeout_ms
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.system_enabled != enabled {
            info!("system enabled: {}", enabled);
        }
        self.system_enabled = enabled;
    }
}

fn positive_or(raw: i64, default: Millis) -> Millis {
    if raw <= 0 {
        default
    } else {
        raw as Millis
    }
}

/// Local settings for one device, read once at boot.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// Key of the remote document. `None` means "use the interface MAC".
    pub device_id: Option<String>,
    pub database_url: String,
    pub database_secret: Option<String>,
    pub interface: String,
    pub button_pin: u8,
    pub relay_pin: u8,
    pub led_pin: u8,
    pub led_active_low: bool,
    pub debounce_ms: Millis,
    pub reset_hold_ms: Millis,
    pub tick_ms: Millis,
    pub connectivity_check_ms: Millis,
    pub primary_resume_delay_ms: Millis,
    pub netstats_interval_ms: Millis,
    pub credentials_path: String,
    pub status_addr: String,
    pub public_ip_url: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            device_id: None,
            database_url: String::new(),
            database_secret: None,
            interface: String::from("wlan0"),
            button_pin: 17,
            relay_pin: 27,
            led_pin: 22,
            led_active_low: false,
            debounce_ms: crate::debounce::DEFAULT_DEBOUNCE_MS,
            reset_hold_ms: crate::gesture::DEFAULT_RESET_HOLD_MS,
            tick_ms: 5,
            connectivity_check_ms: 500,
            primary_resume_delay_ms: 0,
            netstats_interval_ms: 0,
            credentials_path: String::from("/etc/wpa_supplicant/wpa_supplicant.conf"),
            status_addr: String::from("0.0.0.0:8888"),
            public_ip_url: String::from("http://api.ipify.org/"),
        }
    }
}

impl DeviceConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DeviceConfig, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = DeviceConfig::parse(&text)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<DeviceConfig, ConfigError> {
        let doc = json::parse(text)?;
        if !doc.is_object() {
            return Err(ConfigError::NotAnObject);
        }

        let mut config = DeviceConfig::default();
        config.device_id = optional_string(&doc, "device_id")?;
        if let Some(url) = optional_string(&doc, "database_url")? {
            config.database_url = url.trim_end_matches('/').to_string();
        }
        config.database_secret = optional_string(&doc, "database_secret")?;
        if let Some(interface) = optional_string(&doc, "interface")? {
            config.interface = interface;
        }
        read_pin(&doc, "button_pin", &mut config.button_pin)?;
        read_pin(&doc, "relay_pin", &mut config.relay_pin)?;
        read_pin(&doc, "led_pin", &mut config.led_pin)?;
        if !doc["led_active_low"].is_null() {
            config.led_active_low = doc["led_active_low"]
                .as_bool()
                .ok_or(ConfigError::InvalidValue("led_active_low"))?;
        }
        read_millis(&doc, "debounce_ms", &mut config.debounce_ms)?;
        read_millis(&doc, "reset_hold_ms", &mut config.reset_hold_ms)?;
        read_millis(&doc, "tick_ms", &mut config.tick_ms)?;
        read_millis(&doc, "connectivity_check_ms", &mut config.connectivity_check_ms)?;
        read_millis(
            &doc,
            "primary_resume_delay_ms",
            &mut config.primary_resume_delay_ms,
        )?;
        read_millis(&doc, "netstats_interval_ms", &mut config.netstats_interval_ms)?;
        if let Some(path) = optional_string(&doc, "credentials_path")? {
            config.credentials_path = path;
        }
        if let Some(addr) = optional_string(&doc, "status_addr")? {
            config.status_addr = addr;
        }
        if let Some(url) = optional_string(&doc, "public_ip_url")? {
            config.public_ip_url = url;
        }

        if config.database_url.is_empty() {
            return Err(ConfigError::Missing("database_url"));
        }
        debug!("device config: {:?}", config);
        Ok(config)
    }
}

fn optional_string(doc: &JsonValue, key: &'static str) -> Result<Option<String>, ConfigError> {
    let value = &doc[key];
    if value.is_null() {
        return Ok(None);
    }
    value
        .as_str()
        .map(|s| Some(s.to_string()))
        .ok_or(ConfigError::InvalidValue(key))
}

fn read_pin(doc: &JsonValue, key: &'static str, pin: &mut u8) -> Result<(), ConfigError> {
    if !doc[key].is_null() {
        *pin = doc[key].as_u8().ok_or(ConfigError::InvalidValue(key))?;
    }
    Ok(())
}

fn read_millis(doc: &JsonValue, key: &'static str, ms: &mut Millis) -> Result<(), ConfigError> {
    if !doc[key].is_null() {
        *ms = doc[key].as_u64().ok_or(ConfigError::InvalidValue(key))?;
    }
    Ok(())
}
