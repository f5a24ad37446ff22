//! Collaborators that record how a camera used them

use crate::errors::CameraError;
use crate::notify::SettingsNotifier;
use crate::stream::{check_frame_size, ChannelFactory, OutputChannel, StreamEndpoint};
use crate::types::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One channel handed out by [`RecordingChannels`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frames accepted by this channel
    pub frames: usize,
}

#[derive(Debug, Default)]
struct Recorded {
    channels: Vec<ChannelRecord>,
    fail_next: bool,
}

/// Channel factory that remembers every channel it created
#[derive(Debug, Clone, Default)]
pub struct RecordingChannels {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingChannels {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Channels in creation order
    pub fn created(&self) -> Vec<ChannelRecord> {
        self.lock().channels.clone()
    }

    pub fn creations(&self) -> usize {
        self.lock().channels.len()
    }

    /// Make the next `create_channel` call fail
    pub fn fail_next_creation(&self) {
        self.lock().fail_next = true;
    }
}

impl ChannelFactory for RecordingChannels {
    fn create_channel(
        &self,
        name: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn OutputChannel>, CameraError> {
        let mut recorded = self.lock();
        if recorded.fail_next {
            recorded.fail_next = false;
            return Err(CameraError::StreamError(format!(
                "refusing to create channel {}",
                name
            )));
        }
        recorded.channels.push(ChannelRecord {
            name: name.to_string(),
            width,
            height,
            frames: 0,
        });
        Ok(Box::new(RecordingChannel {
            name: name.to_string(),
            width,
            height,
            slot: recorded.channels.len() - 1,
            recorded: self.recorded.clone(),
        }))
    }

    fn endpoint(&self, name: &str) -> Option<StreamEndpoint> {
        self.lock()
            .channels
            .iter()
            .rev()
            .find(|record| record.name == name)
            .map(|record| StreamEndpoint {
                name: record.name.clone(),
                width: record.width,
                height: record.height,
                port: None,
            })
    }
}

struct RecordingChannel {
    name: String,
    width: u32,
    height: u32,
    slot: usize,
    recorded: Arc<Mutex<Recorded>>,
}

impl OutputChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn put_frame(&mut self, frame: &Frame) -> Result<(), CameraError> {
        check_frame_size(self, frame)?;
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.channels[self.slot].frames += 1;
        Ok(())
    }
}

/// Notifier that counts signals per camera
#[derive(Debug, Clone, Default)]
pub struct CountingNotifier {
    cameras: Arc<Mutex<Vec<String>>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Camera names in notification order
    pub fn cameras(&self) -> Vec<String> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SettingsNotifier for CountingNotifier {
    fn notify_settings_changed(&self, camera: &str) {
        self.cameras
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(camera.to_string());
    }
}
