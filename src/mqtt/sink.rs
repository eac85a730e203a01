// SPDX-License-Identifier: GPL-3.0-or-later
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace, warn};
use tracing_futures::Instrument;

use crate::aggregate::{EnabledStatistics, Statistic};
use crate::publish::{format_temperature, StatisticsSink};
use crate::temperature::Temperature;

use super::home_assistant::{Device, TemperatureSensor};
use super::settings::MqttSettings;

/// How many requests can be queued for the event loop before publishing waits.
const REQUEST_CAPACITY: usize = 20;

/// How long to wait after a connection error before the event loop tries again.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publishes the retained availability status and Home Assistant discovery configs.
///
/// These have to be sent again every time the client (re)connects, as the broker will have
/// published the `offline` last will when the previous connection dropped.
#[derive(Clone)]
struct Announcer {
    client: AsyncClient,
    settings: MqttSettings,
    enabled: EnabledStatistics,
    device: Device,
    unique_id: String,
}

impl Announcer {
    async fn announce(&self) -> anyhow::Result<()> {
        let status_topic = self.settings.status_topic();
        info!(server = %self.settings.server_url(), %status_topic, "Announcing MQTT device");
        self.client
            .publish(status_topic, QoS::AtLeastOnce, true, "online")
            .await
            .context("Unable to queue online status")?;
        if self.settings.home_assistant.enabled {
            self.publish_discovery().await?;
        }
        Ok(())
    }

    async fn publish_discovery(&self) -> anyhow::Result<()> {
        let hass = &self.settings.home_assistant;
        for statistic in self.enabled.iter() {
            let config = TemperatureSensor::new(
                statistic,
                &self.device,
                &self.unique_id,
                self.settings.state_topic(statistic),
                self.settings.status_topic(),
                hass.unit,
                self.settings.accuracy_decimals,
            );
            let topic = TemperatureSensor::discovery_topic(&hass.topic, &self.unique_id, statistic);
            let payload = serde_json::to_vec(&config)
                .context("Unable to serialize Home Assistant discovery config")?;
            debug!(%topic, %statistic, "Publishing Home Assistant discovery config");
            self.client
                .publish(topic, QoS::AtLeastOnce, true, payload)
                .await
                .context("Unable to queue Home Assistant discovery config")?;
        }
        Ok(())
    }

    /// Announce again in the background if `event` is a new connection.
    ///
    /// The announcement can't be awaited from the event loop task, as publishing waits on the
    /// request queue that only the event loop drains.
    fn handle_event(&self, event: &Event) -> Option<JoinHandle<anyhow::Result<()>>> {
        if !is_connected(event) {
            return None;
        }
        debug!("Connected to MQTT broker");
        let announcer = self.clone();
        Some(tokio::spawn(
            async move {
                let result = announcer.announce().await;
                if let Err(err) = &result {
                    warn!("Unable to announce after connecting: {:?}", err);
                }
                result
            }
            .in_current_span(),
        ))
    }
}

fn is_connected(event: &Event) -> bool {
    matches!(event, Event::Incoming(Packet::ConnAck(_)))
}

/// The half of the MQTT client that talks to the broker.
pub(crate) struct MqttConnection {
    event_loop: EventLoop,
    announcer: Announcer,
}

/// Publishes statistics to an MQTT broker.
pub(crate) struct MqttSink {
    announcer: Announcer,
}

impl MqttSink {
    /// Create a sink for the configured broker.
    ///
    /// The returned [`MqttConnection`] must be driven with [`run_event_loop`] for anything to
    /// actually be sent.
    pub(crate) fn new(
        settings: MqttSettings,
        enabled: EnabledStatistics,
        device: Device,
    ) -> anyhow::Result<(Self, MqttConnection)> {
        let options = settings
            .mqtt_options()
            .context("Invalid MQTT connection settings")?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let unique_id = settings.unique_id();
        let announcer = Announcer {
            client,
            settings,
            enabled,
            device,
            unique_id,
        };
        let connection = MqttConnection {
            event_loop,
            announcer: announcer.clone(),
        };
        Ok((Self { announcer }, connection))
    }
}

#[async_trait]
impl StatisticsSink for MqttSink {
    async fn announce(&mut self) -> anyhow::Result<()> {
        self.announcer.announce().await
    }

    async fn publish(&mut self, statistic: Statistic, value: Temperature) -> anyhow::Result<()> {
        let settings = &self.announcer.settings;
        let payload = format_temperature(
            value,
            settings.home_assistant.unit,
            settings.accuracy_decimals,
        );
        let topic = settings.state_topic(statistic);
        trace!(%topic, %payload, "Publishing statistic");
        self.announcer
            .client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("Unable to queue {} for publishing", statistic))
    }
}

/// Drive the MQTT connection forever.
///
/// Connection errors are logged, and the connection is retried after a short delay. The
/// availability status is published again after every reconnection.
pub(crate) async fn run_event_loop(connection: MqttConnection) -> anyhow::Result<()> {
    let MqttConnection {
        mut event_loop,
        announcer,
    } = connection;
    loop {
        match event_loop.poll().await {
            Ok(event) => {
                trace!(?event, "MQTT event");
                announcer.handle_event(&event);
            }
            Err(err) => {
                warn!("MQTT connection error: {:?}", err);
                time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
