//! Capture-device lifecycle and pipeline-slot management
//!
//! A [`Camera`] owns one opened device, the modes it accepts, the active mode
//! with its calibration, the pipeline slots and the output channel frames are
//! published to. It is shared between capture, processing and configuration
//! threads behind an `Arc`.
//!
//! Locking: mode state is taken before the device, the pipeline registry is
//! taken before the device, and the output guard is never held while another
//! lock is taken. A frame captured just after a mode switch may still carry
//! the old resolution; channels reject such frames with a stream error.

use crate::calibration::{CalibrationValues, DEFAULT_FOV};
use crate::errors::CameraError;
use crate::notify::SettingsNotifier;
use crate::pipeline::{PipelineRegistry, PipelineSettings};
use crate::platform::{self, CaptureBackend};
use crate::stream::{ChannelFactory, OutputChannel, StreamEndpoint};
use crate::timing::{wait_until, Clock, FrameTokens, MonotonicClock, WaitOutcome};
use crate::types::{DeviceIdentity, Frame, VideoMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

/// How long a freshly opened device may take to report itself connected
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Minimum acceptable capture modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeFilter {
    pub min_fps: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for ModeFilter {
    fn default() -> Self {
        Self {
            min_fps: 30,
            min_width: 320,
            min_height: 200,
        }
    }
}

impl ModeFilter {
    pub fn accepts(&self, mode: &VideoMode) -> bool {
        mode.fps >= self.min_fps && mode.width >= self.min_width && mode.height >= self.min_height
    }

    /// Keep acceptable modes in their native order
    pub fn apply(&self, native: &[VideoMode]) -> Vec<VideoMode> {
        native.iter().copied().filter(|m| self.accepts(m)).collect()
    }
}

/// Whether a control change reached the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareSync {
    Applied,
    /// The value was stored in the pipeline but the device rejected it
    Diverged { reason: String },
}

impl HardwareSync {
    pub fn is_applied(&self) -> bool {
        matches!(self, HardwareSync::Applied)
    }

    fn from_push(result: Result<(), CameraError>) -> Self {
        match result {
            Ok(()) => HardwareSync::Applied,
            Err(e) => {
                log::warn!("Control stored but not applied: {}", e);
                HardwareSync::Diverged {
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Construction parameters for [`Camera`]
#[derive(Clone)]
pub struct CameraParams {
    pub identity: DeviceIdentity,
    pub field_of_view: f64,
    pub pipelines: BTreeMap<usize, PipelineSettings>,
    pub preferred_mode: Option<usize>,
    pub ready_timeout: Duration,
    pub mode_filter: ModeFilter,
    pub clock: Arc<dyn Clock>,
}

impl CameraParams {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            field_of_view: DEFAULT_FOV,
            pipelines: BTreeMap::new(),
            preferred_mode: None,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            mode_filter: ModeFilter::default(),
            clock: Arc::new(MonotonicClock::new()),
        }
    }

    pub fn with_fov(mut self, field_of_view: f64) -> Self {
        self.field_of_view = field_of_view;
        self
    }

    pub fn with_pipelines(mut self, pipelines: BTreeMap<usize, PipelineSettings>) -> Self {
        self.pipelines = pipelines;
        self
    }

    pub fn with_preferred_mode(mut self, index: usize) -> Self {
        self.preferred_mode = Some(index);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn with_mode_filter(mut self, filter: ModeFilter) -> Self {
        self.mode_filter = filter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

struct ModeState {
    active_index: usize,
    field_of_view: f64,
    calibration: CalibrationValues,
}

/// One managed capture device
pub struct Camera {
    identity: DeviceIdentity,
    modes: Vec<VideoMode>,
    state: RwLock<ModeState>,
    device: Mutex<Box<dyn CaptureBackend>>,
    output: Mutex<Box<dyn OutputChannel>>,
    pipelines: Mutex<PipelineRegistry>,
    channels: Arc<dyn ChannelFactory>,
    notifier: Arc<dyn SettingsNotifier>,
    tokens: FrameTokens,
}

impl Camera {
    /// Set up an already opened backend.
    ///
    /// Fails with [`CameraError::BadDevice`] when none of the device's modes
    /// pass the filter; the backend is closed and no channel is created.
    pub fn new(
        params: CameraParams,
        mut backend: Box<dyn CaptureBackend>,
        channels: Arc<dyn ChannelFactory>,
        notifier: Arc<dyn SettingsNotifier>,
    ) -> Result<Self, CameraError> {
        let identity = params.identity.clone();

        if backend.connects_asynchronously() && !backend.is_connected() {
            log::info!("Waiting on camera {}...", identity);
            let outcome = wait_until(params.clock.as_ref(), params.ready_timeout, || {
                backend.is_connected()
            });
            match outcome {
                WaitOutcome::Ready(elapsed) => {
                    log::info!("Camera initialized in {:.2}ms", elapsed.as_secs_f64() * 1000.0)
                }
                WaitOutcome::TimedOut(elapsed) => log::warn!(
                    "Camera {} not connected after {:.2}ms, continuing",
                    identity,
                    elapsed.as_secs_f64() * 1000.0
                ),
            }
        }

        let native = backend.enumerate_modes()?;
        let modes = params.mode_filter.apply(&native);
        if modes.is_empty() {
            log::error!("Camera {} not supported: no acceptable video modes", identity);
            drop(backend);
            return Err(CameraError::BadDevice {
                device: identity.to_string(),
                native_modes: native.len(),
            });
        }

        let active_index = params
            .preferred_mode
            .filter(|&index| index < modes.len())
            .unwrap_or(0);
        let mode = modes[active_index];
        backend.set_mode(&mode)?;

        let calibration = CalibrationValues::compute(mode.resolution(), params.field_of_view);
        let channel = channels.create_channel(&identity.name, mode.width, mode.height)?;

        log::info!(
            "Camera {} ready at {} ({} of {} native modes acceptable)",
            identity,
            mode,
            modes.len(),
            native.len()
        );

        Ok(Self {
            identity,
            modes,
            state: RwLock::new(ModeState {
                active_index,
                field_of_view: params.field_of_view,
                calibration,
            }),
            device: Mutex::new(backend),
            output: Mutex::new(channel),
            pipelines: Mutex::new(PipelineRegistry::from_slots(params.pipelines)),
            channels,
            notifier,
            tokens: FrameTokens::new(params.clock),
        })
    }

    /// Open the device with the platform backend and set it up
    pub fn open(
        params: CameraParams,
        channels: Arc<dyn ChannelFactory>,
        notifier: Arc<dyn SettingsNotifier>,
    ) -> Result<Self, CameraError> {
        let backend = platform::open_device(&params.identity)?;
        Self::new(params, backend, channels, notifier)
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// Acceptable modes, in the device's native order
    pub fn available_modes(&self) -> &[VideoMode] {
        &self.modes
    }

    pub fn stream_endpoint(&self) -> Option<StreamEndpoint> {
        self.channels.endpoint(&self.identity.name)
    }

    /// Switch the device to `modes[index]`.
    ///
    /// With `propagate` set and an output channel whose size differs from the
    /// new mode, the channel is replaced by one of the new size and the
    /// notifier fires once. This also resizes a channel left stale by an
    /// earlier non-propagating switch or failed channel creation. A failed
    /// device push leaves every piece of state untouched.
    pub fn set_active_mode(&self, index: usize, propagate: bool) -> Result<(), CameraError> {
        let mut state = self.write_state();
        let mode = *self.modes.get(index).ok_or(CameraError::InvalidModeIndex {
            index,
            available: self.modes.len(),
        })?;
        let previous = self.modes[state.active_index];

        self.lock_device().set_mode(&mode)?;

        state.active_index = index;
        state.calibration = CalibrationValues::compute(mode.resolution(), state.field_of_view);
        log::debug!("{} active mode {} -> {}", self.identity.name, previous, mode);

        if !propagate {
            return Ok(());
        }
        let channel_fits = {
            let output = self.lock_output();
            output.width() == mode.width && output.height() == mode.height
        };
        if channel_fits {
            return Ok(());
        }

        let channel = self
            .channels
            .create_channel(&self.identity.name, mode.width, mode.height)?;
        let retired = {
            let mut output = self.lock_output();
            std::mem::replace(&mut *output, channel)
        };
        drop(retired);
        drop(state);

        log::info!("{} output resized to {}", self.identity.name, mode.resolution());
        self.notifier.notify_settings_changed(&self.identity.name);
        Ok(())
    }

    pub fn active_mode(&self) -> VideoMode {
        self.modes[self.read_state().active_index]
    }

    pub fn active_mode_index(&self) -> usize {
        self.read_state().active_index
    }

    pub fn set_field_of_view(&self, field_of_view: f64) {
        let mut state = self.write_state();
        let resolution = self.modes[state.active_index].resolution();
        state.field_of_view = field_of_view;
        state.calibration = CalibrationValues::compute(resolution, field_of_view);
    }

    pub fn field_of_view(&self) -> f64 {
        self.read_state().field_of_view
    }

    pub fn calibration(&self) -> CalibrationValues {
        self.read_state().calibration
    }

    /// Add a default slot at `index`, or at the current slot count.
    ///
    /// An existing slot is left alone. Returns the index addressed.
    pub fn add_pipeline(&self, index: Option<usize>) -> usize {
        let mut pipelines = self.lock_pipelines();
        let index = index.unwrap_or_else(|| pipelines.next_index());
        if pipelines.insert_default(index) {
            log::debug!("{} added pipeline {}", self.identity.name, index);
        }
        index
    }

    pub fn current_pipeline(&self) -> Option<PipelineSettings> {
        self.lock_pipelines().current().cloned()
    }

    pub fn current_pipeline_index(&self) -> usize {
        self.lock_pipelines().current_index()
    }

    pub fn set_current_pipeline_index(&self, index: usize) -> bool {
        let accepted = self.lock_pipelines().set_current_index(index);
        if !accepted {
            log::debug!("{} ignored pipeline index {}", self.identity.name, index);
        }
        accepted
    }

    /// Snapshot of every slot
    pub fn pipelines(&self) -> BTreeMap<usize, PipelineSettings> {
        self.lock_pipelines().slots().clone()
    }

    /// Run `f` on the current slot under the registry guard
    pub fn with_current_pipeline<R>(
        &self,
        f: impl FnOnce(&mut PipelineSettings) -> R,
    ) -> Result<R, CameraError> {
        let mut pipelines = self.lock_pipelines();
        let index = pipelines.current_index();
        let slot = pipelines
            .current_mut()
            .ok_or(CameraError::NoPipeline(index))?;
        Ok(f(slot))
    }

    pub fn brightness(&self) -> Option<i32> {
        self.lock_pipelines().current().map(|slot| slot.brightness)
    }

    pub fn exposure(&self) -> Option<i32> {
        self.lock_pipelines().current().map(|slot| slot.exposure)
    }

    /// Store brightness in the current slot and push it to the device
    pub fn set_brightness(&self, value: i32) -> Result<HardwareSync, CameraError> {
        let mut pipelines = self.lock_pipelines();
        let index = pipelines.current_index();
        let slot = pipelines
            .current_mut()
            .ok_or(CameraError::NoPipeline(index))?;
        slot.brightness = value;
        Ok(HardwareSync::from_push(self.lock_device().set_brightness(value)))
    }

    /// Store exposure in the current slot and push it as manual exposure
    pub fn set_exposure(&self, value: i32) -> Result<HardwareSync, CameraError> {
        let mut pipelines = self.lock_pipelines();
        let index = pipelines.current_index();
        let slot = pipelines
            .current_mut()
            .ok_or(CameraError::NoPipeline(index))?;
        slot.exposure = value;
        Ok(HardwareSync::from_push(self.lock_device().set_exposure(value)))
    }

    /// Pull the next raw frame into `frame`.
    ///
    /// Returns a strictly increasing frame token, or `None` when the device
    /// produced nothing.
    pub fn capture_frame(&self, frame: &mut Frame) -> Option<u64> {
        let mut device = self.lock_device();
        match device.grab(frame) {
            Ok(()) => Some(self.tokens.next()),
            Err(e) => {
                log::trace!("{} capture failed: {}", self.identity.name, e);
                None
            }
        }
    }

    /// Publish a processed frame to the current output channel
    pub fn publish_frame(&self, frame: &Frame) -> Result<(), CameraError> {
        self.lock_output().put_frame(frame)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ModeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ModeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_device(&self) -> MutexGuard<'_, Box<dyn CaptureBackend>> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_output(&self) -> MutexGuard<'_, Box<dyn OutputChannel>> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pipelines(&self) -> MutexGuard<'_, PipelineRegistry> {
        self.pipelines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelEncoding;

    fn mode(width: u32, height: u32, fps: u32) -> VideoMode {
        VideoMode::new(width, height, fps, PixelEncoding::Yuyv)
    }

    #[test]
    fn test_mode_filter_thresholds_are_inclusive() {
        let filter = ModeFilter::default();
        assert!(filter.accepts(&mode(320, 200, 30)));
        assert!(!filter.accepts(&mode(319, 200, 30)));
        assert!(!filter.accepts(&mode(320, 199, 30)));
        assert!(!filter.accepts(&mode(320, 200, 29)));
    }

    #[test]
    fn test_mode_filter_keeps_order() {
        let native = [mode(640, 480, 30), mode(160, 120, 60), mode(320, 240, 30)];
        assert_eq!(
            ModeFilter::default().apply(&native),
            vec![mode(640, 480, 30), mode(320, 240, 30)]
        );
    }

    #[test]
    fn test_params_builder() {
        let params = CameraParams::new(DeviceIdentity::new("cam", "/dev/video0"))
            .with_fov(70.0)
            .with_preferred_mode(2)
            .with_ready_timeout(Duration::from_millis(10));
        assert_eq!(params.field_of_view, 70.0);
        assert_eq!(params.preferred_mode, Some(2));
        assert_eq!(params.ready_timeout, Duration::from_millis(10));
        assert_eq!(params.mode_filter, ModeFilter::default());
    }

    #[test]
    fn test_hardware_sync_from_push() {
        assert!(HardwareSync::from_push(Ok(())).is_applied());
        let diverged =
            HardwareSync::from_push(Err(CameraError::ControlError("busy".to_string())));
        assert!(matches!(diverged, HardwareSync::Diverged { ref reason } if reason.contains("busy")));
    }
}
