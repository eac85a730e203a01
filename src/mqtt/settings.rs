// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::{anyhow, Context as _};
use hmac::{Hmac, Mac, NewMac};
use rumqttc::{LastWill, MqttOptions, QoS, TlsConfiguration, Transport};
use serde::Deserialize;
use sha2::Sha256;
use tokio_rustls::rustls::ClientConfig;
use tracing::{debug, trace, warn};
use url::Url;

use std::convert::{TryFrom, TryInto};
use std::str::FromStr;
use std::sync::Arc;

use crate::aggregate::Statistic;
use crate::temperature::TemperatureUnit;

use super::external_value::ExternalValue;

type HmacSha256 = Hmac<Sha256>;

pub(crate) const DEFAULT_MQTT_PORT: u16 = 1883;
pub(crate) const DEFAULT_MQTTS_PORT: u16 = 8883;
const APPLICATION_KEY: &[u8; 16] =
    b"\x2b\x91\x5e\x07\xc4\x3a\x4f\x18\x9d\x62\xa0\x1c\x77\xe5\x3b\xd4";

/// The first component of every topic this program publishes to.
const TOPIC_ROOT: &str = "thermal_frame_stats";

/// Published values are `f32`, more digits than this are just noise.
const MAX_ACCURACY_DECIMALS: u8 = 6;

/// rumqttc refuses keep-alive intervals shorter than this.
const MIN_KEEP_ALIVE: u16 = 5;

fn default_home_assistant_topic() -> String {
    "homeassistant".to_string()
}

fn default_accuracy_decimals() -> u8 {
    1
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct HomeAssistantSettings {
    /// Publish MQTT discovery configs so the statistics show up in Home Assistant.
    #[serde(default)]
    pub(crate) enabled: bool,

    /// The MQTT discovery prefix Home Assistant is listening on.
    #[serde(default = "default_home_assistant_topic")]
    pub(crate) topic: String,

    /// The unit temperatures are published in.
    #[serde(default)]
    pub(crate) unit: TemperatureUnit,
}

impl Default for HomeAssistantSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: default_home_assistant_topic(),
            unit: TemperatureUnit::default(),
        }
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub(crate) struct MqttSettings {
    /// A name for the base topic for this device.
    pub(crate) name: String,

    /// Override the unique ID for this device.
    ///
    /// The unique ID is only used with the Home Assistant integration. If not provided, an ID is
    /// generated automatically. The generated ID should be stable across a system install, but if
    /// you want to guarantee that (or re-use an existing ID) you can specify it here. If
    /// specified, the ID is used *exactly* as written.
    #[serde(default)]
    unique_id: Option<String>,

    /// The MQTT server username, if required.
    #[serde(default)]
    username: Option<String>,

    /// The MQTT server password, if required.
    ///
    /// This can be given either as a plain string, or as a map of the key "file" to the path of a
    /// file holding the password.
    #[serde(default)]
    password: Option<ExternalValue>,

    /// A URL for the MQTT server to connect to. Valid schemes are 'mqtt' for MQTT over TCP and
    /// 'mqtts' for MQTT over TLS. If a port is not given, 1883 is used for MQTT over TCP, and 8883
    /// for MQTT over TLS.
    server: MqttUrl,

    /// Home Assistant integration settings.
    #[serde(default)]
    pub(crate) home_assistant: HomeAssistantSettings,

    /// Enable MQTT keep-alive, in seconds.
    #[serde(default)]
    keep_alive: Option<u16>,

    /// The number of digits after the decimal point in published temperatures.
    #[serde(default = "default_accuracy_decimals")]
    pub(crate) accuracy_decimals: u8,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(try_from = "Url")]
pub(crate) struct MqttUrl(Url);

impl MqttUrl {
    fn is_tls(&self) -> bool {
        self.0.scheme() == "mqtts"
    }

    /// The host and port of the server.
    fn host_port(&self) -> anyhow::Result<(&str, u16)> {
        let host = self
            .0
            .host_str()
            .ok_or_else(|| anyhow!("MQTT URL '{}' doesn't have a host", self.0))?;
        let port = self
            .0
            .port()
            .ok_or_else(|| anyhow!("Unset port for the MQTT URL '{}'", self.0))?;
        Ok((host, port))
    }
}

impl TryFrom<Url> for MqttUrl {
    type Error = anyhow::Error;

    /// Attempt to create an [MqttUrl] from a [Url].
    ///
    /// It is an error if the URL scheme is something other than 'mqtt' or 'mqtts'. The default
    /// ports for those schemes are also applied if no port is given.
    fn try_from(mut url: Url) -> anyhow::Result<Self> {
        let default_port = match url.scheme() {
            "mqtt" => DEFAULT_MQTT_PORT,
            "mqtts" => DEFAULT_MQTTS_PORT,
            invalid => return Err(anyhow!("invalid scheme '{}'", invalid)),
        };
        if url.host_str().is_none() {
            return Err(anyhow!("MQTT URL '{}' is missing a host", url));
        }
        if url.port().is_none() {
            url.set_port(Some(default_port))
                .map_err(|_| anyhow!("unable to set the default port for '{}'", url))?;
        }
        Ok(Self(url))
    }
}

impl FromStr for MqttUrl {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let url: url::Url = s.parse()?;
        url.try_into()
    }
}

impl MqttSettings {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.accuracy_decimals > MAX_ACCURACY_DECIMALS {
            return Err(anyhow!(
                "mqtt.accuracy_decimals must be at most {}, not {}",
                MAX_ACCURACY_DECIMALS,
                self.accuracy_decimals
            ));
        }
        Ok(())
    }

    pub(crate) fn server_url(&self) -> &Url {
        &self.server.0
    }

    /// The topic all of this device's other topics are under.
    pub(crate) fn base_topic(&self) -> String {
        format!("{}/{}", TOPIC_ROOT, self.name)
    }

    /// The topic with the online/offline status of this device.
    pub(crate) fn status_topic(&self) -> String {
        format!("{}/status", self.base_topic())
    }

    /// The topic a statistic's values are published to.
    pub(crate) fn state_topic(&self, statistic: Statistic) -> String {
        format!("{}/{}", self.base_topic(), statistic.key())
    }

    /// Get the unique ID for this device.
    ///
    /// If one was provided, use that. If not, retrieve a machine-specific ID from the OS and hash
    /// it. If a machine-specific ID is not able to be found, the configured name is used instead
    /// (also hashed).
    pub(crate) fn unique_id(&self) -> String {
        if let Some(uid) = &self.unique_id {
            return uid.clone();
        }
        let machine_id = machine_uid::get()
            .map_err(|e| anyhow!("{}", e))
            .and_then(|machine_id| {
                let hex_digits: String = machine_id
                    .to_ascii_lowercase()
                    .matches(|c: char| c.is_ascii_hexdigit())
                    .collect();
                // trace level can log possibly sensitive information, which includes the raw
                // (unhashed) machine ID
                trace!(machine_id = %hex_digits, "extracted machine ID");
                hex::decode(hex_digits).context("machine ID is not hexadecimal")
            });
        let machine_id: Vec<u8> = match machine_id {
            Ok(machine_id) => machine_id,
            Err(e) => {
                warn!(error = ?e, "Unable to get machine ID, using '{}' instead", self.name);
                self.name.as_bytes().into()
            }
        };
        // The machine ID is keyed with an application-specific key so the raw ID isn't exposed,
        // as systemd's machine-id documentation recommends.
        let mut mac = HmacSha256::new_from_slice(APPLICATION_KEY)
            .expect("HMAC can be created from embedded key");
        mac.update(&machine_id);
        let uid = hex::encode(mac.finalize().into_bytes());
        debug!(unique_id = %uid, "generated unique ID");
        uid
    }

    /// Build the client options for connecting to the configured server.
    ///
    /// The last will marks this device offline on the status topic.
    pub(crate) fn mqtt_options(&self) -> anyhow::Result<MqttOptions> {
        let (host, port) = self.server.host_port()?;
        let mut options = MqttOptions::new(self.name.clone(), host, port);
        if let Some(keep_alive) = self.keep_alive {
            if keep_alive < MIN_KEEP_ALIVE {
                warn!(
                    keep_alive,
                    "MQTT keep-alive is too short, using {} seconds", MIN_KEEP_ALIVE
                );
            }
            options.set_keep_alive(keep_alive.max(MIN_KEEP_ALIVE));
        }
        if let Some(username) = &self.username {
            let password = self
                .password
                .as_ref()
                .map_or("", ExternalValue::as_str);
            options.set_credentials(username.clone(), password.to_string());
        } else if self.password.is_some() {
            warn!("An MQTT password was given without a username, ignoring it");
        }
        options.set_last_will(LastWill::new(
            self.status_topic(),
            "offline",
            QoS::AtLeastOnce,
            true,
        ));
        if self.server.is_tls() {
            let mut tls_config = ClientConfig::new();
            tls_config
                .root_store
                .add_server_trust_anchors(&webpki_roots::TLS_SERVER_ROOTS);
            options.set_transport(Transport::Tls(TlsConfiguration::Rustls(Arc::new(
                tls_config,
            ))));
        }
        Ok(options)
    }
}

#[cfg(test)]
mod test {
    use super::{HomeAssistantSettings, MqttSettings};
    use crate::aggregate::Statistic;
    use crate::temperature::TemperatureUnit;

    #[test]
    fn defaults() {
        let source = r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        "#;
        let parsed = toml::from_str(source);
        assert!(parsed.is_ok(), "Unable to parse TOML: {:?}", parsed);
        let parsed: MqttSettings = parsed.unwrap();
        let expected = MqttSettings {
            name: "example".to_string(),
            unique_id: None,
            username: None,
            password: None,
            server: "mqtt://127.0.0.1".parse().unwrap(),
            home_assistant: HomeAssistantSettings::default(),
            keep_alive: None,
            accuracy_decimals: 1,
        };
        assert_eq!(parsed, expected);
        assert_eq!(parsed.home_assistant.topic, "homeassistant");
        assert!(!parsed.home_assistant.enabled);
    }

    #[test]
    fn accuracy_decimals_bound() {
        let settings = |decimals: u8| -> MqttSettings {
            toml::from_str(&format!(
                "name = \"example\"\nserver = \"mqtt://127.0.0.1\"\naccuracy_decimals = {}",
                decimals
            ))
            .unwrap()
        };
        assert!(settings(0).validate().is_ok());
        assert!(settings(6).validate().is_ok());
        assert!(settings(7).validate().is_err());
        assert!(settings(u8::MAX).validate().is_err());
    }

    #[test]
    fn home_assistant_fahrenheit() {
        let source = r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        accuracy_decimals = 2
        home_assistant = { enabled = true, unit = "fahrenheit" }
        "#;
        let parsed: MqttSettings = toml::from_str(source).unwrap();
        assert!(parsed.home_assistant.enabled);
        assert_eq!(parsed.home_assistant.unit, TemperatureUnit::Fahrenheit);
        assert_eq!(parsed.accuracy_decimals, 2);
    }

    #[test]
    fn topics() {
        let source = r#"
        name = "garage"
        server = "mqtt://127.0.0.1"
        "#;
        let parsed: MqttSettings = toml::from_str(source).unwrap();
        assert_eq!(parsed.status_topic(), "thermal_frame_stats/garage/status");
        assert_eq!(
            parsed.state_topic(Statistic::Median),
            "thermal_frame_stats/garage/median_temperature"
        );
    }

    #[test]
    fn specified_unique_id() {
        let unique_id = "abcdefghijklmnopqrstuvwxyz0123456789";
        let source = format!(
            r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        unique_id = "{}"
        "#,
            unique_id
        );
        let parsed: MqttSettings = toml::from_str(&source).unwrap();
        assert_eq!(parsed.unique_id(), unique_id.to_string());
    }

    #[test]
    fn generate_unique_id() {
        let source = r#"
        name = "example"
        server = "mqtt://127.0.0.1"
        "#;
        let parsed: MqttSettings = toml::from_str(source).unwrap();
        let unique_id = parsed.unique_id();
        // Whether or not a machine ID is available, the result is a hex-encoded SHA256 HMAC.
        assert_eq!(unique_id.len(), 64, "Unexpected unique ID {}", unique_id);
        assert!(unique_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(unique_id, parsed.unique_id(), "Unique ID is not stable");
    }

    #[test]
    fn options_for_plain_server() {
        let source = r#"
        name = "example"
        server = "mqtt://broker.test"
        username = "user"
        password = "hunter2"
        keep_alive = 30
        "#;
        let parsed: MqttSettings = toml::from_str(source).unwrap();
        let options = parsed.mqtt_options().unwrap();
        assert_eq!(options.broker_address(), ("broker.test".to_string(), 1883));
        assert_eq!(options.client_id(), "example");
    }
}
