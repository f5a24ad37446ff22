//! Capture backends
//!
//! A [`CaptureBackend`] is one opened device. Linux talks to V4L2 directly;
//! every other platform goes through nokhwa.

use crate::errors::CameraError;
use crate::types::{DeviceIdentity, DeviceInfo, Frame, Platform, VideoMode};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod native;

/// An opened capture device
pub trait CaptureBackend: Send {
    fn identity(&self) -> &DeviceIdentity;

    /// Every mode the driver advertises, in driver order
    fn enumerate_modes(&mut self) -> Result<Vec<VideoMode>, CameraError>;

    fn set_mode(&mut self, mode: &VideoMode) -> Result<(), CameraError>;

    /// Whether the device is currently reachable
    fn is_connected(&self) -> bool;

    /// Whether the device may report itself connected some time after open.
    ///
    /// Callers wait for [`is_connected`](Self::is_connected) only on backends
    /// where this is true.
    fn connects_asynchronously(&self) -> bool {
        Platform::current().has_async_device_readiness()
    }

    /// Grab the next frame into `frame`, reusing its buffer
    fn grab(&mut self, frame: &mut Frame) -> Result<(), CameraError>;

    fn set_brightness(&mut self, value: i32) -> Result<(), CameraError>;

    /// Switch to manual exposure and apply `value`
    fn set_exposure(&mut self, value: i32) -> Result<(), CameraError>;
}

/// Push `mode` with `apply`, pushing `previous` again if that fails.
///
/// Drivers may have partly applied a rejected mode, so the hardware is put
/// back into the mode callers still consider active. The first error is
/// returned either way.
pub fn apply_with_rollback<F>(
    mut apply: F,
    mode: &VideoMode,
    previous: Option<VideoMode>,
) -> Result<(), CameraError>
where
    F: FnMut(&VideoMode) -> Result<(), CameraError>,
{
    let error = match apply(mode) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if let Some(previous) = previous.filter(|previous| previous != mode) {
        match apply(&previous) {
            Ok(()) => log::warn!("Restored {} after failing to apply {}", previous, mode),
            Err(restore) => log::error!("Could not restore {}: {}", previous, restore),
        }
    }
    Err(error)
}

/// Open the device named by `identity` with the platform backend
pub fn open_device(identity: &DeviceIdentity) -> Result<Box<dyn CaptureBackend>, CameraError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::V4l2Backend::open(identity)?))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(Box::new(native::NativeBackend::open(identity)?))
    }
}

/// Enumerate capture devices on this machine
pub fn list_devices() -> Result<Vec<DeviceInfo>, CameraError> {
    #[cfg(target_os = "linux")]
    {
        linux::utils::list_v4l2_devices()
    }

    #[cfg(not(target_os = "linux"))]
    {
        native::list_devices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelEncoding;

    fn mode(width: u32, height: u32) -> VideoMode {
        VideoMode::new(width, height, 30, PixelEncoding::Yuyv)
    }

    #[test]
    fn test_rollback_not_needed_on_success() {
        let mut pushed = Vec::new();
        let result = apply_with_rollback(
            |m| {
                pushed.push(*m);
                Ok(())
            },
            &mode(640, 480),
            Some(mode(320, 240)),
        );
        assert!(result.is_ok());
        assert_eq!(pushed, vec![mode(640, 480)]);
    }

    #[test]
    fn test_failed_push_restores_previous_mode() {
        let mut pushed = Vec::new();
        let result = apply_with_rollback(
            |m| {
                pushed.push(*m);
                if m.width == 640 {
                    Err(CameraError::InitializationError("driver chose 800x600".to_string()))
                } else {
                    Ok(())
                }
            },
            &mode(640, 480),
            Some(mode(320, 240)),
        );
        assert!(matches!(result, Err(CameraError::InitializationError(ref msg)) if msg.contains("800x600")));
        assert_eq!(pushed, vec![mode(640, 480), mode(320, 240)]);
    }

    #[test]
    fn test_first_error_wins_when_restore_fails() {
        let mut attempts = 0;
        let result = apply_with_rollback(
            |_| {
                attempts += 1;
                Err(CameraError::InitializationError(format!("attempt {}", attempts)))
            },
            &mode(640, 480),
            Some(mode(320, 240)),
        );
        assert!(matches!(result, Err(CameraError::InitializationError(ref msg)) if msg == "attempt 1"));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_no_restore_without_previous_mode() {
        let mut attempts = 0;
        let result = apply_with_rollback(
            |_| {
                attempts += 1;
                Err(CameraError::InitializationError("busy".to_string()))
            },
            &mode(640, 480),
            None,
        );
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
