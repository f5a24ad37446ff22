use super::{apply_with_rollback, CaptureBackend};
use crate::errors::CameraError;
use crate::types::{DeviceIdentity, Frame, PixelEncoding, VideoMode};
use std::path::Path;
use v4l::buffer::Type;
use v4l::control::{Control, Value};
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const V4L2_EXPOSURE_MANUAL: i64 = 1;

const BUFFER_COUNT: u32 = 4;
const FALLBACK_FPS: u32 = 30;

/// Sizes tried against drivers that only advertise a stepwise range
const STEPWISE_CANDIDATES: [(u32, u32); 4] = [(1280, 720), (640, 480), (320, 240), (160, 120)];

/// V4L2 capture device
pub struct V4l2Backend {
    identity: DeviceIdentity,
    device: Device,
    mode: Option<VideoMode>,
    // Recreated after every mode change; buffers are sized for the old format.
    stream: Option<MmapStream<'static>>,
}

impl V4l2Backend {
    pub fn open(identity: &DeviceIdentity) -> Result<Self, CameraError> {
        let device = Device::with_path(&identity.path).map_err(|e| {
            CameraError::InitializationError(format!("Failed to open {}: {}", identity, e))
        })?;
        log::debug!("Opened V4L2 device {}", identity);

        Ok(Self {
            identity: identity.clone(),
            device,
            mode: None,
            stream: None,
        })
    }

    fn frame_rates(&self, fourcc: FourCC, width: u32, height: u32) -> Vec<u32> {
        let intervals = match self.device.enum_frameintervals(fourcc, width, height) {
            Ok(intervals) => intervals,
            Err(e) => {
                log::debug!("No frame intervals for {}x{} {}: {}", width, height, fourcc, e);
                return vec![FALLBACK_FPS];
            }
        };

        let mut rates: Vec<u32> = intervals
            .into_iter()
            .map(|interval| match interval.interval {
                FrameIntervalEnum::Discrete(frac) if frac.numerator > 0 => {
                    frac.denominator / frac.numerator
                }
                _ => FALLBACK_FPS,
            })
            .collect();
        rates.dedup();
        if rates.is_empty() {
            rates.push(FALLBACK_FPS);
        }
        rates
    }

    /// Set format and frame rate, failing if the driver substitutes a size
    fn apply_format(&self, mode: &VideoMode) -> Result<(), CameraError> {
        let fourcc = mode.encoding.fourcc().ok_or_else(|| {
            CameraError::InitializationError(format!(
                "{} has no V4L2 pixel format",
                mode.encoding
            ))
        })?;

        let requested = Format::new(mode.width, mode.height, FourCC::new(&fourcc));
        let applied = self.device.set_format(&requested).map_err(|e| {
            CameraError::InitializationError(format!(
                "Failed to set format {} on {}: {}",
                mode, self.identity, e
            ))
        })?;
        if applied.width != mode.width || applied.height != mode.height {
            return Err(CameraError::InitializationError(format!(
                "{} applied {}x{} instead of {}",
                self.identity, applied.width, applied.height, mode
            )));
        }

        if let Err(e) = self.device.set_params(&Parameters::with_fps(mode.fps)) {
            log::warn!("{} refused {} fps: {}", self.identity, mode.fps, e);
        }
        Ok(())
    }

    /// Map a 0-100 percentage onto the control's native range
    fn scale_percent(&self, id: u32, percent: i32) -> i64 {
        let percent = percent.clamp(0, 100) as i64;
        match self.device.query_controls() {
            Ok(controls) => match controls.iter().find(|c| c.id == id) {
                Some(desc) => desc.minimum + (desc.maximum - desc.minimum) * percent / 100,
                None => percent,
            },
            Err(e) => {
                log::debug!("Control query failed on {}: {}", self.identity, e);
                percent
            }
        }
    }

    fn write_control(&self, id: u32, value: i64) -> Result<(), CameraError> {
        self.device
            .set_control(Control {
                id,
                value: Value::Integer(value),
            })
            .map_err(|e| {
                CameraError::ControlError(format!(
                    "Failed to set control {:#x} on {}: {}",
                    id, self.identity, e
                ))
            })
    }
}

impl CaptureBackend for V4l2Backend {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn enumerate_modes(&mut self) -> Result<Vec<VideoMode>, CameraError> {
        let formats = self.device.enum_formats().map_err(|e| {
            CameraError::InitializationError(format!(
                "Failed to enumerate formats on {}: {}",
                self.identity, e
            ))
        })?;

        let mut modes = Vec::new();
        for description in formats {
            let encoding = PixelEncoding::from_fourcc(&description.fourcc.repr);
            let sizes = match self.device.enum_framesizes(description.fourcc) {
                Ok(sizes) => sizes,
                Err(e) => {
                    log::debug!("No frame sizes for {}: {}", description.fourcc, e);
                    continue;
                }
            };

            for size in sizes {
                let resolutions: Vec<(u32, u32)> = match size.size {
                    FrameSizeEnum::Discrete(discrete) => vec![(discrete.width, discrete.height)],
                    FrameSizeEnum::Stepwise(step) => STEPWISE_CANDIDATES
                        .iter()
                        .copied()
                        .filter(|&(w, h)| {
                            w >= step.min_width
                                && w <= step.max_width
                                && h >= step.min_height
                                && h <= step.max_height
                        })
                        .collect(),
                };

                for (width, height) in resolutions {
                    for fps in self.frame_rates(description.fourcc, width, height) {
                        modes.push(VideoMode::new(width, height, fps, encoding));
                    }
                }
            }
        }

        log::debug!("{} advertises {} modes", self.identity, modes.len());
        Ok(modes)
    }

    fn set_mode(&mut self, mode: &VideoMode) -> Result<(), CameraError> {
        // Buffers must be released before the format can change.
        self.stream = None;

        apply_with_rollback(|m| self.apply_format(m), mode, self.mode)?;

        self.mode = Some(*mode);
        log::info!("{} switched to {}", self.identity, mode);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        Path::new(&self.identity.path).exists()
    }

    fn grab(&mut self, frame: &mut Frame) -> Result<(), CameraError> {
        let mode = self
            .mode
            .ok_or_else(|| CameraError::CaptureError("No video mode applied".to_string()))?;

        if self.stream.is_none() {
            let stream = MmapStream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| {
                    CameraError::CaptureError(format!(
                        "Failed to start stream on {}: {}",
                        self.identity, e
                    ))
                })?;
            self.stream = Some(stream);
        }

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::CaptureError("Stream unavailable".to_string()))?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureError(format!("Failed to capture frame: {}", e)))?;

        let used = (meta.bytesused as usize).min(buf.len());
        frame.fill(&buf[..used], mode.width, mode.height, mode.encoding);
        Ok(())
    }

    fn set_brightness(&mut self, value: i32) -> Result<(), CameraError> {
        let raw = self.scale_percent(V4L2_CID_BRIGHTNESS, value);
        self.write_control(V4L2_CID_BRIGHTNESS, raw)
    }

    fn set_exposure(&mut self, value: i32) -> Result<(), CameraError> {
        self.write_control(V4L2_CID_EXPOSURE_AUTO, V4L2_EXPOSURE_MANUAL)?;
        let raw = self.scale_percent(V4L2_CID_EXPOSURE_ABSOLUTE, value);
        self.write_control(V4L2_CID_EXPOSURE_ABSOLUTE, raw)
    }
}

impl Drop for V4l2Backend {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Stopped stream on {}", self.identity);
        }
    }
}

// The mmap arena is only touched through the owning camera's device lock.
unsafe impl Send for V4l2Backend {}

/// Linux-specific utilities
pub mod utils {
    use super::*;
    use crate::types::DeviceInfo;

    /// Check if V4L2 is available on the system
    pub fn is_v4l2_available() -> bool {
        Path::new("/dev/video0").exists()
    }

    /// List V4L2 capture nodes with their card names
    pub fn list_v4l2_devices() -> Result<Vec<DeviceInfo>, CameraError> {
        let mut devices = Vec::new();
        for node in v4l::context::enum_devices() {
            let path = node.path().to_string_lossy().into_owned();
            let name = node
                .name()
                .unwrap_or_else(|| format!("video{}", node.index()));

            let driver = match Device::with_path(&path).and_then(|dev| dev.query_caps()) {
                Ok(caps) => Some(caps.driver),
                Err(e) => {
                    log::debug!("Skipping capabilities for {}: {}", path, e);
                    None
                }
            };

            devices.push(DeviceInfo {
                identity: DeviceIdentity::new(name, path),
                driver,
            });
        }
        devices.sort_by(|a, b| a.identity.path.cmp(&b.identity.path));
        Ok(devices)
    }
}
