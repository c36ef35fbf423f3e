//! URL-encoded form handling for the config save endpoint.

use std::net::Ipv4Addr;
use std::str::FromStr;

use tracing::info;

/// Extract one parameter from an URL-encoded body and decode it.
pub fn parse_post_param(body: &str, key: &str) -> Option<String> {
    for pair in body.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        if k == key {
            return Some(url_decode(v));
        }
    }
    None
}

/// Decode `+` and `%XX` escapes; malformed escapes pass through.
pub fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 2 < bytes.len() {
                    let hi = (bytes[i + 1] as char).to_digit(16);
                    let lo = (bytes[i + 2] as char).to_digit(16);
                    if let (Some(hi), Some(lo)) = (hi, lo) {
                        out.push((hi * 16 + lo) as u8);
                        i += 3;
                        continue;
                    }
                }
                out.push(b'%');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Strict IPv4 check, the same validation the station bring-up uses.
pub fn is_valid_ip(value: &str) -> bool {
    !value.is_empty() && Ipv4Addr::from_str(value).is_ok()
}

/// Round a battery limit to two decimals before it is stored.
pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Validation failure, rendered as the HTML error modal.
#[derive(Debug, PartialEq, Eq)]
pub struct InvalidField {
    pub title: &'static str,
    pub message: &'static str,
}

/// All recognized form fields, parsed but not yet applied.
#[derive(Debug, Default)]
pub struct ConfigForm {
    pub wifi_ssid: Option<String>,
    pub wifi_pass: Option<String>,
    pub wifi_static_ip: Option<String>,
    pub wifi_gateway: Option<String>,
    pub wifi_netmask: Option<String>,
    pub mqtt_uri: Option<String>,
    pub cell_v_min: Option<String>,
    pub cell_v_max: Option<String>,
    pub pack_v_min: Option<String>,
    pub pack_v_max: Option<String>,
    pub current_min: Option<String>,
    pub current_max: Option<String>,
}

impl ConfigForm {
    pub fn parse(body: &str) -> Self {
        Self {
            wifi_ssid: parse_post_param(body, "wifi_ssid"),
            wifi_pass: parse_post_param(body, "wifi_pass"),
            wifi_static_ip: parse_post_param(body, "wifi_static_ip"),
            wifi_gateway: parse_post_param(body, "wifi_gateway"),
            wifi_netmask: parse_post_param(body, "wifi_netmask"),
            mqtt_uri: parse_post_param(body, "mqtt_uri"),
            cell_v_min: parse_post_param(body, "cell_v_min"),
            cell_v_max: parse_post_param(body, "cell_v_max"),
            pack_v_min: parse_post_param(body, "pack_v_min"),
            pack_v_max: parse_post_param(body, "pack_v_max"),
            current_min: parse_post_param(body, "current_min"),
            current_max: parse_post_param(body, "current_max"),
        }
    }

    /// Check every address field before anything is mutated, so a
    /// rejected form leaves the configuration untouched.
    pub fn validate(&self) -> Result<(), InvalidField> {
        if let Some(ip) = &self.wifi_static_ip {
            if !ip.is_empty() && !is_valid_ip(ip) {
                return Err(InvalidField {
                    title: "Invalid Static IP Address",
                    message: "The IP address format is invalid. Please enter a valid IPv4 \
                              address (e.g., 192.168.1.100).",
                });
            }
        }
        if let Some(gw) = &self.wifi_gateway {
            if !gw.is_empty() && !is_valid_ip(gw) {
                return Err(InvalidField {
                    title: "Invalid Gateway Address",
                    message: "The gateway address format is invalid. Please enter a valid IPv4 \
                              address (e.g., 192.168.1.1).",
                });
            }
        }
        if let Some(mask) = &self.wifi_netmask {
            if !mask.is_empty() && !is_valid_ip(mask) {
                return Err(InvalidField {
                    title: "Invalid Netmask",
                    message: "The netmask format is invalid. Please enter a valid IPv4 netmask \
                              (e.g., 255.255.255.0).",
                });
            }
        }
        Ok(())
    }

    /// Overlay the validated form onto the configuration singleton.
    pub fn apply(self) {
        bms_config::update(|cfg| {
            if let Some(v) = self.wifi_ssid {
                cfg.wifi.ssid = v;
            }
            if let Some(v) = self.wifi_static_ip {
                cfg.wifi.static_ip = v;
            }
            if let Some(v) = self.wifi_gateway {
                cfg.wifi.gateway = v;
            }
            if let Some(v) = self.wifi_netmask {
                cfg.wifi.netmask = v;
            }
            // An empty password field keeps the stored one.
            match self.wifi_pass {
                Some(v) if !v.is_empty() => {
                    info!("updating wifi password");
                    cfg.wifi.pass = v;
                }
                Some(_) => info!("password field empty, keeping existing password"),
                None => {}
            }
            if let Some(v) = self.mqtt_uri {
                cfg.mqtt.uri = v;
            }

            // Unparseable numbers collapse to 0.0, as the firmware's
            // atof did.
            if let Some(v) = self.cell_v_min {
                cfg.battery.cell_v_min = round2(v.parse().unwrap_or(0.0));
            }
            if let Some(v) = self.cell_v_max {
                cfg.battery.cell_v_max = round2(v.parse().unwrap_or(0.0));
            }
            if let Some(v) = self.pack_v_min {
                cfg.battery.pack_v_min = round2(v.parse().unwrap_or(0.0));
            }
            if let Some(v) = self.pack_v_max {
                cfg.battery.pack_v_max = round2(v.parse().unwrap_or(0.0));
            }
            if let Some(v) = self.current_min {
                cfg.battery.current_min = round2(v.parse().unwrap_or(0.0));
            }
            if let Some(v) = self.current_max {
                cfg.battery.current_max = round2(v.parse().unwrap_or(0.0));
            }
        });
    }
}
