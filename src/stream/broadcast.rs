//! In-process frame broadcast
//!
//! Every stream name owns one long-lived broadcast sender. Creating a channel
//! for an existing name hands out a new, differently sized [`BroadcastChannel`]
//! on the same sender, so subscribers (such as the MJPEG server) keep
//! receiving across resolution changes.

use super::{check_frame_size, ChannelFactory, OutputChannel, StreamEndpoint};
use crate::errors::CameraError;
use crate::types::Frame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Frames buffered per subscriber before the slowest one starts lagging
pub const DEFAULT_CAPACITY: usize = 4;

struct StreamEntry {
    sender: broadcast::Sender<Arc<Frame>>,
    width: u32,
    height: u32,
    port: Option<u16>,
}

/// Channel factory backed by `tokio::sync::broadcast`
#[derive(Clone)]
pub struct BroadcastChannels {
    streams: Arc<Mutex<HashMap<String, StreamEntry>>>,
    capacity: usize,
}

impl BroadcastChannels {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            streams: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Receive frames published to `name` from now on
    pub fn subscribe(&self, name: &str) -> Option<broadcast::Receiver<Arc<Frame>>> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.get(name).map(|entry| entry.sender.subscribe())
    }

    /// Record the port an external server exposes `name` on
    pub fn set_port(&self, name: &str, port: Option<u16>) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = streams.get_mut(name) {
            entry.port = port;
        }
    }

    pub fn names(&self) -> Vec<String> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.keys().cloned().collect()
    }
}

impl Default for BroadcastChannels {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelFactory for BroadcastChannels {
    fn create_channel(
        &self,
        name: &str,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn OutputChannel>, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::StreamError(format!(
                "cannot create channel '{}' with size {}x{}",
                name, width, height
            )));
        }

        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.capacity;
        let entry = streams.entry(name.to_string()).or_insert_with(|| StreamEntry {
            sender: broadcast::channel(capacity).0,
            width,
            height,
            port: None,
        });
        entry.width = width;
        entry.height = height;

        log::debug!("Created output channel {} at {}x{}", name, width, height);
        Ok(Box::new(BroadcastChannel {
            name: name.to_string(),
            width,
            height,
            sender: entry.sender.clone(),
        }))
    }

    fn endpoint(&self, name: &str) -> Option<StreamEndpoint> {
        let streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.get(name).map(|entry| StreamEndpoint {
            name: name.to_string(),
            width: entry.width,
            height: entry.height,
            port: entry.port,
        })
    }
}

/// One fixed-size view onto a named broadcast stream
pub struct BroadcastChannel {
    name: String,
    width: u32,
    height: u32,
    sender: broadcast::Sender<Arc<Frame>>,
}

impl OutputChannel for BroadcastChannel {
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
        // No subscribers is not an error; the frame is simply dropped.
        let _ = self.sender.send(Arc::new(frame.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelEncoding;

    fn gray(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0; (width * height) as usize],
            width,
            height,
            PixelEncoding::Gray8,
        )
    }

    #[test]
    fn test_subscribers_survive_channel_replacement() {
        let channels = BroadcastChannels::new();
        let mut first = channels.create_channel("cam", 4, 2).unwrap();
        let mut receiver = channels.subscribe("cam").unwrap();

        first.put_frame(&gray(4, 2)).unwrap();
        let mut second = channels.create_channel("cam", 8, 4).unwrap();
        second.put_frame(&gray(8, 4)).unwrap();

        assert_eq!(receiver.try_recv().unwrap().width, 4);
        assert_eq!(receiver.try_recv().unwrap().width, 8);
    }

    #[test]
    fn test_rejects_mismatched_frame() {
        let channels = BroadcastChannels::new();
        let mut channel = channels.create_channel("cam", 4, 2).unwrap();
        let result = channel.put_frame(&gray(8, 4));
        assert!(matches!(result, Err(CameraError::StreamError(_))));
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let channels = BroadcastChannels::new();
        let mut channel = channels.create_channel("cam", 4, 2).unwrap();
        assert!(channel.put_frame(&gray(4, 2)).is_ok());
    }

    #[test]
    fn test_endpoint_tracks_size_and_port() {
        let channels = BroadcastChannels::new();
        assert!(channels.endpoint("cam").is_none());
        channels.create_channel("cam", 320, 240).unwrap();
        channels.set_port("cam", Some(1181));
        channels.create_channel("cam", 640, 480).unwrap();

        let endpoint = channels.endpoint("cam").unwrap();
        assert_eq!((endpoint.width, endpoint.height), (640, 480));
        assert_eq!(endpoint.port, Some(1181));
        assert_eq!(channels.names(), vec!["cam".to_string()]);
    }

    #[test]
    fn test_zero_size_channel_rejected() {
        let channels = BroadcastChannels::new();
        assert!(channels.create_channel("cam", 0, 240).is_err());
    }
}
