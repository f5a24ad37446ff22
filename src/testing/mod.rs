//! Testing utilities for visioncam
//!
//! Provides a synthetic capture device and recording collaborators, enabling
//! reliable offline testing of [`Camera`](crate::camera::Camera) without
//! requiring hardware.

pub mod recording;
pub mod synthetic_data;
pub mod synthetic_device;

pub use recording::{ChannelRecord, CountingNotifier, RecordingChannels};
pub use synthetic_data::synthetic_video_frame;
pub use synthetic_device::{DeviceHandle, SyntheticDevice};
