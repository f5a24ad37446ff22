//! In-memory capture device
//!
//! [`SyntheticDevice`] implements [`CaptureBackend`] over a fixed mode list.
//! A cloned [`DeviceHandle`] stays with the test after the device has been
//! handed to a camera and shows what the camera did to it.

use super::synthetic_data::fill_synthetic;
use crate::errors::CameraError;
use crate::platform::CaptureBackend;
use crate::timing::ManualClock;
use crate::types::{DeviceIdentity, Frame, VideoMode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct DeviceLog {
    set_modes: Vec<VideoMode>,
    brightness: Vec<i32>,
    exposure: Vec<i32>,
    connect_polls: usize,
    grabs: u64,
    closed: bool,
    fail_set_mode: bool,
    fail_controls: bool,
    fail_grab: bool,
}

/// Shared view of a [`SyntheticDevice`]'s history and failure switches
#[derive(Debug, Clone, Default)]
pub struct DeviceHandle {
    log: Arc<Mutex<DeviceLog>>,
}

impl DeviceHandle {
    fn lock(&self) -> MutexGuard<'_, DeviceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every mode pushed to the device, oldest first
    pub fn set_mode_calls(&self) -> Vec<VideoMode> {
        self.lock().set_modes.clone()
    }

    pub fn brightness_pushes(&self) -> Vec<i32> {
        self.lock().brightness.clone()
    }

    pub fn exposure_pushes(&self) -> Vec<i32> {
        self.lock().exposure.clone()
    }

    pub fn connect_polls(&self) -> usize {
        self.lock().connect_polls
    }

    pub fn grabs(&self) -> u64 {
        self.lock().grabs
    }

    /// Whether the device has been dropped
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn fail_set_mode(&self, fail: bool) {
        self.lock().fail_set_mode = fail;
    }

    pub fn fail_controls(&self, fail: bool) {
        self.lock().fail_controls = fail;
    }

    pub fn fail_grab(&self, fail: bool) {
        self.lock().fail_grab = fail;
    }
}

/// Capture device backed by memory
pub struct SyntheticDevice {
    identity: DeviceIdentity,
    modes: Vec<VideoMode>,
    current: Option<VideoMode>,
    asynchronous: bool,
    polls_until_connected: Option<usize>,
    poll_clock: Option<(ManualClock, Duration)>,
    handle: DeviceHandle,
}

impl SyntheticDevice {
    pub fn new(name: &str, modes: Vec<VideoMode>) -> Self {
        Self {
            identity: DeviceIdentity::new(name, format!("/dev/synthetic/{}", name)),
            modes,
            current: None,
            asynchronous: false,
            polls_until_connected: Some(0),
            poll_clock: None,
            handle: DeviceHandle::default(),
        }
    }

    /// Report readiness asynchronously, connecting after `polls` checks.
    ///
    /// `None` never connects.
    pub fn connecting_after(mut self, polls: Option<usize>) -> Self {
        self.asynchronous = true;
        self.polls_until_connected = polls;
        self
    }

    /// Advance `clock` by `step` on every connection check
    pub fn advancing(mut self, clock: ManualClock, step: Duration) -> Self {
        self.poll_clock = Some((clock, step));
        self
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    pub fn boxed(self) -> Box<dyn CaptureBackend> {
        Box::new(self)
    }
}

impl CaptureBackend for SyntheticDevice {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn enumerate_modes(&mut self) -> Result<Vec<VideoMode>, CameraError> {
        Ok(self.modes.clone())
    }

    fn set_mode(&mut self, mode: &VideoMode) -> Result<(), CameraError> {
        let mut log = self.handle.lock();
        if log.fail_set_mode {
            return Err(CameraError::InitializationError(format!(
                "synthetic device refused {}",
                mode
            )));
        }
        log.set_modes.push(*mode);
        self.current = Some(*mode);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        if let Some((clock, step)) = &self.poll_clock {
            clock.advance(*step);
        }
        let mut log = self.handle.lock();
        log.connect_polls += 1;
        match self.polls_until_connected {
            Some(polls) => log.connect_polls > polls,
            None => false,
        }
    }

    fn connects_asynchronously(&self) -> bool {
        self.asynchronous
    }

    fn grab(&mut self, frame: &mut Frame) -> Result<(), CameraError> {
        let mode = self
            .current
            .ok_or_else(|| CameraError::CaptureError("no mode applied".to_string()))?;
        let grabs = {
            let mut log = self.handle.lock();
            if log.fail_grab {
                return Err(CameraError::CaptureError("synthetic grab failure".to_string()));
            }
            log.grabs += 1;
            log.grabs
        };
        fill_synthetic(frame, grabs, mode.width, mode.height);
        Ok(())
    }

    fn set_brightness(&mut self, value: i32) -> Result<(), CameraError> {
        let mut log = self.handle.lock();
        if log.fail_controls {
            return Err(CameraError::ControlError("brightness rejected".to_string()));
        }
        log.brightness.push(value);
        Ok(())
    }

    fn set_exposure(&mut self, value: i32) -> Result<(), CameraError> {
        let mut log = self.handle.lock();
        if log.fail_controls {
            return Err(CameraError::ControlError("exposure rejected".to_string()));
        }
        log.exposure.push(value);
        Ok(())
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.handle.lock().closed = true;
    }
}
