use std::fs;
use std::io;
use std::net::Ipv4Addr;
use std::process::Command;
use std::time::Duration;

use log::{debug, warn};
use systemstat::{Platform, System};
use ureq::{Agent, AgentBuilder};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything reported to the remote document about the current link.
/// Values that could not be determined are left out.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetDiagnostics {
    pub public_ip: Option<String>,
    pub gateway_ip: Option<Ipv4Addr>,
    pub local_ip: Option<Ipv4Addr>,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub channel: Option<u32>,
    pub rssi: Option<i32>,
}

impl NetDiagnostics {
    pub fn to_json(&self) -> json::JsonValue {
        let mut obj = json::JsonValue::new_object();
        if let Some(ip) = &self.public_ip {
            obj["public_ip"] = ip.as_str().into();
        }
        if let Some(ip) = self.gateway_ip {
            obj["gateway_ip"] = ip.to_string().into();
        }
        if let Some(ip) = self.local_ip {
            obj["local_ip"] = ip.to_string().into();
        }
        if let Some(ssid) = &self.ssid {
            obj["ssid"] = ssid.as_str().into();
        }
        if let Some(bssid) = &self.bssid {
            obj["bssid"] = bssid.as_str().into();
        }
        if let Some(channel) = self.channel {
            obj["channel"] = channel.into();
        }
        if let Some(rssi) = self.rssi {
            obj["rssi"] = rssi.into();
        }
        obj
    }
}

pub trait Network {
    fn is_connected(&mut self) -> bool;

    /// Signal strength in dBm.
    fn signal_strength(&mut self) -> Option<i32>;

    /// Gathers link details, including a public IP lookup. Blocks.
    fn diagnostics(&mut self) -> NetDiagnostics;
}

/// The device's wireless interface, as seen through procfs, sysfs and
/// `iwgetid`.
pub struct SystemNetwork {
    interface: String,
    public_ip_url: String,
    agent: Agent,
    system: System,
}

impl SystemNetwork {
    pub fn new(interface: &str, public_ip_url: &str) -> Self {
        SystemNetwork {
            interface: interface.to_string(),
            public_ip_url: public_ip_url.to_string(),
            agent: AgentBuilder::new().timeout(LOOKUP_TIMEOUT).build(),
            system: System::new(),
        }
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        let networks = match self.system.networks() {
            Ok(networks) => networks,
            Err(err) => {
                debug!("unable to list interfaces: {}", err);
                return None;
            }
        };
        networks
            .get(&self.interface)?
            .addrs
            .iter()
            .find_map(|addrs| match addrs.addr {
                systemstat::IpAddr::V4(ip) => Some(ip),
                _ => None,
            })
    }

    fn public_ip(&self) -> Option<String> {
        let result = self
            .agent
            .get(&self.public_ip_url)
            .call()
            .map_err(|err| err.to_string())
            .and_then(|response| response.into_string().map_err(|err| err.to_string()));
        match result {
            Ok(body) => Some(body.trim().to_string()),
            Err(err) => {
                warn!("public IP lookup failed: {}", err);
                None
            }
        }
    }

    fn iwgetid(&self, flag: Option<&str>) -> Option<String> {
        let mut command = Command::new("iwgetid");
        command.arg(&self.interface).arg("-r");
        if let Some(flag) = flag {
            command.arg(flag);
        }
        let output = command.output().ok()?;
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl Network for SystemNetwork {
    fn is_connected(&mut self) -> bool {
        let operstate = fs::read_to_string(format!("/sys/class/net/{}/operstate", self.interface))
            .unwrap_or_default();
        operstate.trim() == "up" && self.local_ip().is_some()
    }

    fn signal_strength(&mut self) -> Option<i32> {
        let text = fs::read_to_string("/proc/net/wireless").ok()?;
        parse_signal_level(&text, &self.interface)
    }

    fn diagnostics(&mut self) -> NetDiagnostics {
        let gateway_ip = fs::read_to_string("/proc/net/route")
            .ok()
            .and_then(|text| parse_default_gateway(&text, &self.interface));
        NetDiagnostics {
            public_ip: self.public_ip(),
            gateway_ip,
            local_ip: self.local_ip(),
            ssid: self.iwgetid(None),
            bssid: self.iwgetid(Some("--ap")),
            channel: self.iwgetid(Some("--channel")).and_then(|c| c.parse().ok()),
            rssi: self.signal_strength(),
        }
    }
}

/// MAC address of `interface` in upper case, used as the default device id.
pub fn mac_address(interface: &str) -> io::Result<String> {
    let address = fs::read_to_string(format!("/sys/class/net/{}/address", interface))?;
    Ok(address.trim().to_uppercase())
}

fn parse_signal_level(text: &str, interface: &str) -> Option<i32> {
    let prefix = format!("{}:", interface);
    let line = text.lines().find(|line| line.trim_start().starts_with(&prefix))?;
    // iface: status link level noise ...
    let level = line.split_whitespace().nth(3)?;
    level.trim_end_matches('.').parse().ok()
}

fn parse_default_gateway(text: &str, interface: &str) -> Option<Ipv4Addr> {
    text.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [iface, "00000000", gateway, ..] if *iface == interface => {
                let raw = u32::from_str_radix(gateway, 16).ok()?;
                Some(Ipv4Addr::from(raw.to_le_bytes()))
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRELESS: &str = "Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
 wlan0: 0000   54.  -56.  -256        0      0      0      0    133        0
";

    const ROUTE: &str = "Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
eth0\t00000000\t0100000A\t0003\t0\t0\t100\t00000000\t0\t0\t0
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t303\t00FFFFFF\t0\t0\t0
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t303\t00000000\t0\t0\t0
";

    #[test]
    fn reads_signal_level_for_interface() {
        assert_eq!(parse_signal_level(WIRELESS, "wlan0"), Some(-56));
        assert_eq!(parse_signal_level(WIRELESS, "wlan1"), None);
    }

    #[test]
    fn reads_default_gateway_for_interface() {
        assert_eq!(
            parse_default_gateway(ROUTE, "wlan0"),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(
            parse_default_gateway(ROUTE, "eth0"),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(parse_default_gateway(ROUTE, "usb0"), None);
    }

    #[test]
    fn diagnostics_json_skips_unknown_values() {
        let diagnostics = NetDiagnostics {
            public_ip: Some(String::from("203.0.113.7")),
            rssi: Some(-61),
            ..NetDiagnostics::default()
        };
        let obj = diagnostics.to_json();
        assert_eq!(obj["public_ip"], "203.0.113.7");
        assert_eq!(obj["rssi"], -61);
        assert!(!obj.has_key("ssid"));
    }
}
