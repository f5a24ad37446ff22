//! Output channels for processed frames
//!
//! A camera publishes into exactly one [`OutputChannel`] at a time. When the
//! resolution changes the camera asks its [`ChannelFactory`] for a new
//! channel of the right size and swaps it in; channels themselves never
//! change size.

pub mod broadcast;
pub mod mjpeg;

pub use broadcast::{BroadcastChannel, BroadcastChannels};
pub use mjpeg::MjpegServer;

use crate::errors::CameraError;
use crate::types::Frame;
use serde::{Deserialize, Serialize};

/// Fixed-size sink for published frames
pub trait OutputChannel: Send {
    fn name(&self) -> &str;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Publish one frame.
    ///
    /// Frames whose dimensions differ from the channel's are rejected with
    /// [`CameraError::StreamError`].
    fn put_frame(&mut self, frame: &Frame) -> Result<(), CameraError>;
}

/// Creates channels and reports where they can be reached from outside
pub trait ChannelFactory: Send + Sync {
    fn create_channel(
        &self,
        name: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn OutputChannel>, CameraError>;

    fn endpoint(&self, name: &str) -> Option<StreamEndpoint>;
}

/// External access point for a named stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// TCP port of the MJPEG server, when one is attached
    pub port: Option<u16>,
}

/// Check that a frame fits a channel before publishing it
pub fn check_frame_size(channel: &dyn OutputChannel, frame: &Frame) -> Result<(), CameraError> {
    if frame.width != channel.width() || frame.height != channel.height() {
        return Err(CameraError::StreamError(format!(
            "frame {}x{} does not match channel '{}' ({}x{})",
            frame.width,
            frame.height,
            channel.name(),
            channel.width(),
            channel.height()
        )));
    }
    Ok(())
}
