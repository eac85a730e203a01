// SPDX-License-Identifier: GPL-3.0-or-later
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use tokio::task::spawn_blocking;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use crate::aggregate::{aggregate, AggregateResult, AggregatorConfig};
use crate::camera::FrameSource;
use crate::frame::ThermalFrame;
use crate::publish::StatisticsSink;
use crate::temperature::Temperature;
use crate::util::flatten_join_result;

/// Where the poller is within a tick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum PollState {
    Idle,
    Reading,
    Publishing,
}

/// Read a frame on the blocking thread pool.
async fn read_frame<F>(source: Arc<Mutex<F>>) -> anyhow::Result<ThermalFrame>
where
    F: FrameSource + Send + 'static,
{
    let read_result = spawn_blocking(move || {
        let mut source = source
            .lock()
            .map_err(|_| anyhow!("frame source lock was poisoned"))?;
        source.read_frame()
    })
    .await;
    flatten_join_result(read_result)
}

/// Reads a frame from the camera on every tick, and publishes its statistics.
pub(crate) struct Poller<F, S> {
    source: Arc<Mutex<F>>,
    config: AggregatorConfig,
    sink: S,
    update_interval: Duration,
    state: PollState,
}

impl<F, S> Poller<F, S>
where
    F: FrameSource + Send + 'static,
    S: StatisticsSink,
{
    pub(crate) fn new(
        source: F,
        config: AggregatorConfig,
        sink: S,
        update_interval: Duration,
    ) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            config,
            sink,
            update_interval,
            state: PollState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> PollState {
        self.state
    }

    /// Run a single read-compute-publish cycle.
    ///
    /// A frame that can't be read is logged and skipped, so `Ok(None)` is returned. A frame that
    /// doesn't match the configured grid is an error, as every later frame will have the same
    /// problem.
    pub(crate) async fn tick(&mut self) -> anyhow::Result<Option<AggregateResult>> {
        self.state = PollState::Reading;
        let frame = match read_frame(Arc::clone(&self.source)).await {
            Ok(frame) => frame,
            Err(err) => {
                error!("Skipping update, unable to read frame: {:?}", err);
                self.state = PollState::Idle;
                return Ok(None);
            }
        };
        let result = match aggregate(&frame, &self.config) {
            Ok(result) => result,
            Err(err) => {
                self.state = PollState::Idle;
                return Err(err.into());
            }
        };
        debug!(
            min = ?result.min,
            max = ?result.max,
            mean = ?result.mean,
            median = ?result.median,
            valid_count = result.valid_count,
            ambient = ?frame.ambient(),
            "Frame statistics"
        );
        if result.is_empty() {
            debug!("No statistics to publish for this frame");
        }
        self.state = PollState::Publishing;
        for (statistic, value) in result.present() {
            if let Err(err) = self
                .sink
                .publish(statistic, Temperature::Celsius(value))
                .await
            {
                warn!(%statistic, "Unable to publish statistic: {:?}", err);
            }
        }
        self.state = PollState::Idle;
        Ok(Some(result))
    }

    /// Poll the camera every update interval until a fatal error occurs.
    ///
    /// The first tick happens immediately. If a tick takes longer than the interval, the missed
    /// ticks are skipped instead of being run back to back.
    pub(crate) async fn run(mut self) -> anyhow::Result<()> {
        self.sink
            .announce()
            .await
            .context("Unable to announce statistics")?;
        let mut interval = time::interval(self.update_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            trace!("Poll tick");
            self.tick()
                .await
                .context("Stopping statistics polling")?;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;

    use crate::aggregate::{AggregatorConfig, EnabledStatistics, Statistic, ValidRange};
    use crate::camera::{FrameSource, MockCamera, RefreshRate, RepeatMode};
    use crate::error::AggregateError;
    use crate::frame::{GridSize, ThermalFrame};
    use crate::publish::StatisticsSink;
    use crate::temperature::Temperature;

    use super::{PollState, Poller};

    type Published = Arc<Mutex<Vec<(Statistic, Temperature)>>>;

    #[derive(Default)]
    struct RecordingSink {
        published: Published,
    }

    #[async_trait]
    impl StatisticsSink for RecordingSink {
        async fn announce(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn publish(
            &mut self,
            statistic: Statistic,
            value: Temperature,
        ) -> anyhow::Result<()> {
            self.published.lock().unwrap().push((statistic, value));
            Ok(())
        }
    }

    struct BrokenCamera;

    impl FrameSource for BrokenCamera {
        fn grid_size(&self) -> GridSize {
            GridSize::new(2, 2).unwrap()
        }

        fn read_frame(&mut self) -> anyhow::Result<ThermalFrame> {
            Err(anyhow!("camera unplugged"))
        }

        fn set_refresh_rate(&mut self, _refresh_rate: RefreshRate) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn camera(frames: Vec<Vec<f32>>) -> MockCamera {
        let size = GridSize::new(2, 2).unwrap();
        let frames = frames
            .into_iter()
            .map(|readings| ThermalFrame::new(size, readings).unwrap())
            .collect();
        MockCamera::new(size, frames, RepeatMode::Loop).unwrap()
    }

    fn config(grid: GridSize, enabled: EnabledStatistics) -> AggregatorConfig {
        AggregatorConfig::new(grid, enabled, ValidRange::default())
    }

    fn poller<F: FrameSource + Send + 'static>(
        source: F,
        enabled: EnabledStatistics,
    ) -> (Poller<F, RecordingSink>, Published) {
        let sink = RecordingSink::default();
        let published = Arc::clone(&sink.published);
        let grid = source.grid_size();
        let poller = Poller::new(source, config(grid, enabled), sink, Duration::from_secs(60));
        (poller, published)
    }

    #[tokio::test]
    async fn publishes_enabled_statistics() {
        let enabled = EnabledStatistics::default().with(Statistic::Median, false);
        let (mut poller, published) = poller(camera(vec![vec![10.0, 20.0, 30.0, 40.0]]), enabled);
        assert_eq!(poller.state(), PollState::Idle);
        let result = poller.tick().await.unwrap().expect("a frame to be read");
        assert_eq!(result.median, None);
        assert_eq!(poller.state(), PollState::Idle);
        let published = published.lock().unwrap();
        assert_eq!(
            *published,
            vec![
                (Statistic::Minimum, Temperature::Celsius(10.0)),
                (Statistic::Maximum, Temperature::Celsius(40.0)),
                (Statistic::Mean, Temperature::Celsius(25.0)),
            ]
        );
    }

    #[tokio::test]
    async fn skips_invalid_frames() {
        let nan = f32::NAN;
        let (mut poller, published) = poller(
            camera(vec![vec![nan, nan, 500.0, -100.0]]),
            EnabledStatistics::default(),
        );
        let result = poller.tick().await.unwrap().expect("a frame to be read");
        assert!(result.is_empty());
        assert_eq!(result.valid_count, 0);
        assert!(published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn survives_read_failures() {
        let (mut poller, published) = poller(BrokenCamera, EnabledStatistics::default());
        assert!(poller.tick().await.unwrap().is_none());
        assert!(poller.tick().await.unwrap().is_none());
        assert_eq!(poller.state(), PollState::Idle);
        assert!(published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stops_on_dimension_mismatch() {
        let sink = RecordingSink::default();
        let published = Arc::clone(&sink.published);
        let wrong_grid = GridSize::MLX90640;
        let mut poller = Poller::new(
            camera(vec![vec![1.0, 2.0, 3.0, 4.0]]),
            config(wrong_grid, EnabledStatistics::default()),
            sink,
            Duration::from_millis(1),
        );
        let err = poller.tick().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<AggregateError>(),
            Some(&AggregateError::DimensionMismatch {
                expected: 768,
                actual: 4
            })
        );
        assert_eq!(poller.state(), PollState::Idle);
        assert!(published.lock().unwrap().is_empty());
        // run() announces, then stops at the first tick.
        assert!(poller.run().await.is_err());
    }

    #[tokio::test]
    async fn runs_as_a_task_with_boxed_sink() {
        let sink: Box<dyn StatisticsSink> = Box::new(RecordingSink::default());
        let source: Box<dyn FrameSource + Send> = Box::new(camera(vec![vec![1.0, 2.0, 3.0, 4.0]]));
        let poller = Poller::new(
            source,
            config(GridSize::MLX90640, EnabledStatistics::default()),
            sink,
            Duration::from_millis(1),
        );
        let err = tokio::spawn(poller.run()).await.unwrap().unwrap_err();
        assert!(err.root_cause().downcast_ref::<AggregateError>().is_some());
    }

    #[tokio::test]
    async fn each_tick_reads_a_new_frame() {
        let (mut poller, published) = poller(
            camera(vec![vec![1.0, 1.0, 1.0, 1.0], vec![2.0, 2.0, 2.0, 2.0]]),
            EnabledStatistics::none().with(Statistic::Maximum, true),
        );
        for _ in 0..3 {
            poller.tick().await.unwrap();
        }
        let values: Vec<f32> = published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, value)| value.in_celsius())
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 1.0]);
    }
}
