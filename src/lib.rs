//! visioncam: capture-device lifecycle and pipeline-slot management for
//! robotics vision cameras
//!
//! This crate opens a physical capture device, negotiates an acceptable video
//! mode, hands raw frames to a processing thread and republishes processed
//! frames to an output stream that is resized whenever the mode changes.
//!
//! # Features
//! - Video mode filtering by minimum frame rate and resolution
//! - Thread-safe output channel replacement on resolution change
//! - Indexed pipeline slots with brightness and exposure pushed to hardware
//! - Calibration values derived from field of view
//! - MJPEG-over-HTTP stream server
//! - Managed or unmanaged host network configuration
//!
//! # Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use visioncam::{BroadcastChannels, Camera, CameraParams, DeviceIdentity, Frame, NoopNotifier};
//!
//! # fn main() -> Result<(), visioncam::CameraError> {
//! let params = CameraParams::new(DeviceIdentity::new("front", "/dev/video0"));
//! let camera = Camera::open(params, Arc::new(BroadcastChannels::new()), Arc::new(NoopNotifier))?;
//!
//! let mut frame = Frame::empty();
//! if camera.capture_frame(&mut frame).is_some() {
//!     camera.publish_frame(&frame)?;
//! }
//! # Ok(())
//! # }
//! ```
pub mod calibration;
pub mod camera;
pub mod config;
pub mod errors;
pub mod network;
pub mod notify;
pub mod pipeline;
pub mod platform;
pub mod stream;
pub mod timing;
pub mod types;

// Testing utilities - synthetic devices for offline testing
pub mod testing;

// Re-exports for convenience
pub use calibration::CalibrationValues;
pub use camera::{Camera, CameraParams, HardwareSync, ModeFilter};
pub use config::VisionCameraConfig;
pub use errors::CameraError;
pub use network::{NetworkManager, NetworkSettings};
pub use notify::{ChannelNotifier, NoopNotifier, SettingsNotifier};
pub use pipeline::{PipelineRegistry, PipelineSettings};
pub use platform::CaptureBackend;
pub use stream::{BroadcastChannels, ChannelFactory, MjpegServer, OutputChannel, StreamEndpoint};
pub use types::{DeviceIdentity, DeviceInfo, Frame, PixelEncoding, Platform, Resolution, VideoMode};

/// Detect the current platform using the Platform enum
pub fn current_platform() -> Platform {
    Platform::current()
}

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "visioncam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        platform: Platform::current(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub platform: Platform,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = current_platform();
        assert_eq!(platform, Platform::current());
    }

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "visioncam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_is_repeatable() {
        init_logging();
        init_logging();
    }
}
