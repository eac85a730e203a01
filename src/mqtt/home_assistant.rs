// SPDX-License-Identifier: GPL-3.0-or-later
//! Home Assistant MQTT discovery payloads.
//!
//! Only the subset of the discovery schema needed to describe temperature sensors is modelled.
use mac_address::MacAddress;
use serde::ser::{SerializeTuple, Serializer};
use serde::Serialize;
use tracing::warn;

use crate::aggregate::Statistic;
use crate::temperature::TemperatureUnit;

/// Used by serde's `skip_serializing_if` to leave out unset fields.
pub(crate) fn is_default<T>(value: &T) -> bool
where
    T: Default + PartialEq,
{
    *value == T::default()
}

/// A way Home Assistant can link a device to other integrations.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Connection {
    MacAddress(MacAddress),
}

impl Serialize for Connection {
    /// Serialize a Connection as a 2-tuple of the connection type and value.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tuple_serializer = serializer.serialize_tuple(2)?;
        match self {
            Connection::MacAddress(mac) => {
                tuple_serializer.serialize_element("mac")?;
                tuple_serializer.serialize_element(&mac.to_string().to_ascii_lowercase())?;
            }
        }
        tuple_serializer.end()
    }
}

/// An entry in the Home Assistant device registry.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Device {
    #[serde(skip_serializing_if = "is_default")]
    connections: Vec<Connection>,

    #[serde(skip_serializing_if = "is_default")]
    identifiers: Vec<String>,

    #[serde(skip_serializing_if = "is_default")]
    pub(crate) model: Option<String>,

    #[serde(skip_serializing_if = "is_default")]
    pub(crate) name: Option<String>,

    #[serde(skip_serializing_if = "is_default")]
    pub(crate) sw_version: Option<String>,
}

impl Device {
    /// Create a device for this host, identified by `unique_id`.
    ///
    /// Every non-zero MAC address on the host is added as a connection, so Home Assistant can
    /// merge this device with others it already knows about.
    pub(crate) fn for_host(name: &str, unique_id: &str) -> Self {
        let mut device = Self::default();
        match mac_address::MacAddressIterator::new() {
            Ok(addresses) => {
                // Skip all-zero MAC addresses (like from a loopback interface)
                for address in addresses.filter(|a| a.bytes() != [0u8; 6]) {
                    device.add_mac_connection(address);
                }
            }
            Err(e) => warn!("unable to access MAC addresses: {:?}", e),
        }
        device.name = Some(name.to_string());
        device.add_identifier(unique_id);
        device.sw_version = Some(format!(
            "{} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        device
    }

    pub(crate) fn add_mac_connection(&mut self, mac: MacAddress) {
        let connection = Connection::MacAddress(mac);
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    pub(crate) fn add_identifier<S>(&mut self, id: S)
    where
        S: Into<String>,
    {
        let id = id.into();
        if !self.identifiers.contains(&id) {
            self.identifiers.push(id);
        }
    }
}

/// The discovery config for one temperature statistic.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct TemperatureSensor<'a> {
    name: String,
    unique_id: String,
    state_topic: String,
    availability_topic: String,
    device_class: &'static str,
    state_class: &'static str,
    unit_of_measurement: &'static str,
    suggested_display_precision: u8,
    device: &'a Device,
}

impl<'a> TemperatureSensor<'a> {
    pub(crate) fn new(
        statistic: Statistic,
        device: &'a Device,
        unique_id: &str,
        state_topic: String,
        availability_topic: String,
        unit: TemperatureUnit,
        precision: u8,
    ) -> Self {
        let name = match &device.name {
            Some(device_name) => format!("{} {}", device_name, statistic.name()),
            None => statistic.name().to_string(),
        };
        Self {
            name,
            unique_id: Self::object_id(unique_id, statistic),
            state_topic,
            availability_topic,
            device_class: "temperature",
            state_class: "measurement",
            unit_of_measurement: unit.symbol(),
            suggested_display_precision: precision,
            device,
        }
    }

    fn object_id(unique_id: &str, statistic: Statistic) -> String {
        format!("{}_{}", unique_id, statistic.key())
    }

    /// The topic this config is published to for Home Assistant to find it.
    pub(crate) fn discovery_topic(prefix: &str, unique_id: &str, statistic: Statistic) -> String {
        format!(
            "{}/sensor/{}/config",
            prefix,
            Self::object_id(unique_id, statistic)
        )
    }
}

#[cfg(test)]
mod test {
    use mac_address::MacAddress;
    use serde_json::{json, Value};

    use super::{Device, TemperatureSensor};
    use crate::aggregate::Statistic;
    use crate::temperature::TemperatureUnit;

    fn test_device() -> Device {
        let mut device = Device::default();
        device.name = Some("Garage".to_string());
        device.add_identifier("abc123");
        device.add_identifier("abc123");
        device.add_mac_connection(MacAddress::new([0x02, 0x00, 0x00, 0xAB, 0xCD, 0xEF]));
        device
    }

    #[test]
    fn device_serialization() {
        let device = test_device();
        let value = serde_json::to_value(&device).unwrap();
        assert_eq!(
            value,
            json!({
                "connections": [["mac", "02:00:00:ab:cd:ef"]],
                "identifiers": ["abc123"],
                "name": "Garage",
            })
        );
    }

    #[test]
    fn empty_device() {
        let value = serde_json::to_value(&Device::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn sensor_config() {
        let device = test_device();
        let sensor = TemperatureSensor::new(
            Statistic::Maximum,
            &device,
            "abc123",
            "thermal_frame_stats/garage/max_temperature".to_string(),
            "thermal_frame_stats/garage/status".to_string(),
            TemperatureUnit::Celsius,
            1,
        );
        let value: Value = serde_json::to_value(&sensor).unwrap();
        assert_eq!(value["name"], "Garage Max Temperature");
        assert_eq!(value["unique_id"], "abc123_max_temperature");
        assert_eq!(value["device_class"], "temperature");
        assert_eq!(value["state_class"], "measurement");
        assert_eq!(value["unit_of_measurement"], "°C");
        assert_eq!(value["suggested_display_precision"], 1);
        assert_eq!(
            value["state_topic"],
            "thermal_frame_stats/garage/max_temperature"
        );
        assert_eq!(
            value["availability_topic"],
            "thermal_frame_stats/garage/status"
        );
        assert_eq!(value["device"]["identifiers"], json!(["abc123"]));
    }

    #[test]
    fn discovery_topic() {
        assert_eq!(
            TemperatureSensor::discovery_topic("homeassistant", "abc123", Statistic::Mean),
            "homeassistant/sensor/abc123_mean_temperature/config"
        );
    }
}
