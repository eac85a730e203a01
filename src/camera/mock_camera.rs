// SPDX-License-Identifier: GPL-3.0-or-later
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context as _};
use tracing::{debug, trace};

use crate::frame::{GridSize, ThermalFrame};

use super::settings::RefreshRate;
use super::thermal_camera::FrameSource;

/// The on-disk format for recorded frames.
///
/// ```toml
/// width = 2
/// height = 1
///
/// [[frames]]
/// values = [20.5, 21.0]
/// ambient = 30.0
/// ```
#[derive(Clone, Debug, serde::Deserialize)]
struct Recording {
    width: usize,
    height: usize,
    frames: Vec<RecordedFrame>,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct RecordedFrame {
    values: Vec<f32>,

    #[serde(default)]
    ambient: Option<f32>,
}

/// Controls how frames are repeated by [`MockCamera`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum RepeatMode {
    /// Don't repeat.
    ///
    /// Once the end of the frames has been reached, an error is returned.
    None,

    /// Loop over the frames. This is the default mode.
    Loop,

    /// Alternate between forward and reverse playback.
    ///
    /// The frames at either end of the recording are *not* repeated.
    Bounce,
}

impl Default for RepeatMode {
    fn default() -> Self {
        Self::Loop
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeatMode::None => "none",
            RepeatMode::Loop => "loop",
            RepeatMode::Bounce => "bounce",
        };
        write!(f, "{}", s)
    }
}

/// A camera that plays back previously recorded frames.
pub(crate) struct MockCamera {
    grid_size: GridSize,
    frames: Vec<ThermalFrame>,
    index: Box<dyn Iterator<Item = usize> + Send + Sync>,
    refresh_rate: RefreshRate,
}

impl MockCamera {
    pub(crate) fn new(
        grid_size: GridSize,
        frames: Vec<ThermalFrame>,
        repeat: RepeatMode,
    ) -> anyhow::Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("a mock camera needs at least one frame"));
        }
        if let Some(bad_frame) = frames.iter().find(|f| f.size() != grid_size) {
            return Err(anyhow!(
                "recorded frame is {}, but the mock camera is {}",
                bad_frame.size(),
                grid_size
            ));
        }
        let num_frames = frames.len();
        let index: Box<dyn Iterator<Item = usize> + Send + Sync> = match repeat {
            RepeatMode::None => Box::new(0..num_frames),
            RepeatMode::Loop => Box::new((0..num_frames).cycle()),
            RepeatMode::Bounce => {
                let forwards = 0..num_frames;
                let backwards = (1..num_frames.saturating_sub(1)).rev();
                Box::new(forwards.chain(backwards).cycle())
            }
        };
        Ok(Self {
            grid_size,
            frames,
            index,
            refresh_rate: RefreshRate::default(),
        })
    }

    /// Load a recording from a TOML file.
    pub(crate) fn from_path<P: AsRef<Path>>(path: P, repeat: RepeatMode) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Unable to read mock camera data from {}", path.display()))?;
        let recording: Recording = toml::from_str(&contents)
            .with_context(|| format!("Invalid mock camera data in {}", path.display()))?;
        let grid_size = GridSize::new(recording.width, recording.height)?;
        let frames = recording
            .frames
            .into_iter()
            .enumerate()
            .map(|(index, recorded)| {
                let ambient = recorded.ambient;
                ThermalFrame::new(grid_size, recorded.values)
                    .map(|frame| frame.with_ambient(ambient))
                    .with_context(|| format!("Recorded frame {} is malformed", index))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        debug!(
            path = %path.display(),
            %grid_size,
            count = frames.len(),
            %repeat,
            "Loaded mock camera recording"
        );
        Self::new(grid_size, frames, repeat)
    }
}

impl fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockCamera")
            .field("grid_size", &self.grid_size)
            .field("frames", &self.frames.len())
            .field("refresh_rate", &self.refresh_rate)
            .finish()
    }
}

impl FrameSource for MockCamera {
    fn grid_size(&self) -> GridSize {
        self.grid_size
    }

    fn read_frame(&mut self) -> anyhow::Result<ThermalFrame> {
        let index = self
            .index
            .next()
            .ok_or_else(|| anyhow!("No more frames in recording"))?;
        trace!(index, "Playing back recorded frame");
        // Frames share their readings, so this clone doesn't copy the data.
        Ok(self.frames[index].clone())
    }

    fn set_refresh_rate(&mut self, refresh_rate: RefreshRate) -> anyhow::Result<()> {
        self.refresh_rate = refresh_rate;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use crate::camera::FrameSource;
    use crate::frame::{GridSize, ThermalFrame};

    use super::{MockCamera, RepeatMode};

    const NUM_TINY_FRAMES: usize = 5;

    fn tiny_frames() -> Vec<ThermalFrame> {
        (0..NUM_TINY_FRAMES)
            .map(|offset| ThermalFrame::from_readings(vec![20.0 + offset as f32]).unwrap())
            .collect()
    }

    fn tiny_camera(repeat: RepeatMode) -> MockCamera {
        MockCamera::new(GridSize::new(1, 1).unwrap(), tiny_frames(), repeat).unwrap()
    }

    fn first_readings(camera: &mut MockCamera, count: usize) -> Vec<f32> {
        (0..count)
            .map(|_| camera.read_frame().unwrap()[0])
            .collect()
    }

    #[test]
    fn repeat_none() {
        let mut camera = tiny_camera(RepeatMode::None);
        let readings = first_readings(&mut camera, NUM_TINY_FRAMES);
        assert_eq!(readings, vec![20.0, 21.0, 22.0, 23.0, 24.0]);
        assert!(camera.read_frame().is_err());
    }

    #[test]
    fn repeat_loop() {
        let mut camera = tiny_camera(RepeatMode::Loop);
        let readings = first_readings(&mut camera, NUM_TINY_FRAMES + 2);
        assert_eq!(readings, vec![20.0, 21.0, 22.0, 23.0, 24.0, 20.0, 21.0]);
    }

    #[test]
    fn repeat_bounce() {
        let mut camera = tiny_camera(RepeatMode::Bounce);
        let readings = first_readings(&mut camera, 10);
        assert_eq!(
            readings,
            vec![20.0, 21.0, 22.0, 23.0, 24.0, 23.0, 22.0, 21.0, 20.0, 21.0]
        );
    }

    #[test]
    fn bounce_single_frame() {
        let frames = vec![ThermalFrame::from_readings(vec![5.0]).unwrap()];
        let mut camera =
            MockCamera::new(GridSize::new(1, 1).unwrap(), frames, RepeatMode::Bounce).unwrap();
        assert_eq!(first_readings(&mut camera, 3), vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn rejects_empty_recording() {
        let result = MockCamera::new(GridSize::new(1, 1).unwrap(), vec![], RepeatMode::Loop);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_mismatched_frames() {
        let result = MockCamera::new(GridSize::new(2, 1).unwrap(), tiny_frames(), RepeatMode::Loop);
        assert!(result.is_err());
    }

    #[test]
    fn repeat_mode_names() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            repeat: RepeatMode,
        }
        let modes = [RepeatMode::None, RepeatMode::Loop, RepeatMode::Bounce];
        for mode in modes.iter() {
            let source = format!("repeat = \"{}\"", mode);
            let parsed: Wrapper = toml::from_str(&source).unwrap();
            assert_eq!(parsed.repeat, *mode);
        }
        assert!(toml::from_str::<Wrapper>("repeat = \"sideways\"").is_err());
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
width = 2
height = 2

[[frames]]
values = [20.0, 21.0, 22.0, 23.0]
ambient = 31.5

[[frames]]
values = [nan, 21.0, 22.0, 23.0]
"#
        )
        .unwrap();
        let mut camera = MockCamera::from_path(file.path(), RepeatMode::None).unwrap();
        assert_eq!(camera.grid_size(), GridSize::new(2, 2).unwrap());
        let first = camera.read_frame().unwrap();
        assert_eq!(first.readings(), &[20.0f32, 21.0, 22.0, 23.0][..]);
        assert_eq!(first.ambient(), Some(31.5));
        let second = camera.read_frame().unwrap();
        assert!(second[0].is_nan());
        assert_eq!(second.ambient(), None);
    }

    #[test]
    fn from_path_wrong_length() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
width = 2
height = 2

[[frames]]
values = [20.0, 21.0, 22.0]
"#
        )
        .unwrap();
        assert!(MockCamera::from_path(file.path(), RepeatMode::Loop).is_err());
    }

    #[test]
    fn from_missing_path() {
        assert!(MockCamera::from_path("/nonexistent/recording.toml", RepeatMode::Loop).is_err());
    }

    #[test]
    fn demo_recording() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/warm_spot.toml");
        let mut camera = MockCamera::from_path(path, RepeatMode::Bounce).unwrap();
        assert_eq!(camera.grid_size(), GridSize::new(4, 4).unwrap());
        let frame = camera.read_frame().unwrap();
        assert_eq!(frame.ambient(), Some(21.5));
        assert!(frame.iter().all(|reading| *reading >= 20.0));
    }
}
