// SPDX-License-Identifier: GPL-3.0-or-later
use anyhow::Context as _;
use futures::future::{Future, FutureExt};
use futures::ready;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::spawn_blocking;
use tracing::{debug, info, info_span};
use tracing_futures::Instrument;

use std::pin::Pin;
use std::task::{Context, Poll};

use crate::aggregate::AggregatorConfig;
use crate::camera::{CameraSettings, RetryingReader};
use crate::mqtt::{run_event_loop, Device, MqttSettings, MqttSink};
use crate::poller::Poller;
use crate::publish::{LogSink, StatisticsSink};
use crate::settings::Settings;
use crate::util::flatten_join_result;

type InnerTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type TaskList = FuturesUnordered<InnerTask>;

/// All of the tasks making up the program.
///
/// The pipeline completes as soon as any one of its tasks does, with that task's result.
pub(crate) struct Pipeline {
    tasks: TaskList,
}

impl Pipeline {
    pub(crate) async fn new(config: Settings) -> anyhow::Result<Self> {
        let camera_settings = config.camera.clone();
        // Opening the camera reads its calibration data over I2C, which blocks.
        let camera = spawn_blocking(move || camera_settings.create_camera())
            .map(flatten_join_result)
            .await
            .context("Error configuring camera")?;
        let grid_size = camera.grid_size();
        let reader = RetryingReader::new(camera, config.retry);
        let enabled = config.statistics.enabled;
        let aggregator_config =
            AggregatorConfig::new(grid_size, enabled, config.statistics.valid_range()?);
        let tasks = TaskList::new();
        let sink: Box<dyn StatisticsSink> = match config.mqtt {
            Some(mqtt_config) => {
                let device = Self::create_device(&mqtt_config, &config.camera);
                let (sink, connection) = MqttSink::new(mqtt_config, enabled, device)?;
                debug!("Starting MQTT event loop");
                tasks.push(
                    tokio::spawn(run_event_loop(connection).instrument(info_span!("mqtt")))
                        .map(flatten_join_result)
                        .boxed(),
                );
                Box::new(sink)
            }
            None => Box::new(LogSink::new(enabled)),
        };
        info!(
            %grid_size,
            interval = ?config.update_interval,
            "Starting statistics poller"
        );
        let poller = Poller::new(reader, aggregator_config, sink, config.update_interval);
        tasks.push(
            tokio::spawn(poller.run().instrument(info_span!("poller")))
                .map(flatten_join_result)
                .boxed(),
        );
        Ok(Self { tasks })
    }

    fn create_device(mqtt_config: &MqttSettings, camera: &CameraSettings) -> Device {
        let mut device = Device::for_host(&mqtt_config.name, &mqtt_config.unique_id());
        device.model = Some(
            match camera {
                CameraSettings::Mlx90640 { .. } => "MLX90640",
                CameraSettings::MockCamera { .. } => "Mock Camera",
            }
            .to_string(),
        );
        device
    }
}

impl Future for Pipeline {
    type Output = anyhow::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let res = ready!(self.tasks.poll_next_unpin(cx)).unwrap_or(Ok(()));
        debug!(result = ?res, "Pipeline terminating");
        Poll::Ready(res)
    }
}
