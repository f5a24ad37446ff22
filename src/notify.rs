//! Settings-changed notifications
//!
//! The camera fires a notification after a mode switch replaces its output
//! channel. Delivery is fire-and-forget: nothing is acknowledged and a
//! missing listener is not an error.

use tokio::sync::mpsc;

/// Receiver of settings-changed signals
pub trait SettingsNotifier: Send + Sync {
    fn notify_settings_changed(&self, camera: &str);
}

impl<F> SettingsNotifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify_settings_changed(&self, camera: &str) {
        self(camera)
    }
}

/// Notifier that drops every signal
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl SettingsNotifier for NoopNotifier {
    fn notify_settings_changed(&self, _camera: &str) {}
}

/// A settings-changed event as delivered by [`ChannelNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsChanged {
    pub camera: String,
}

/// Forwards signals into an unbounded async channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<SettingsChanged>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SettingsChanged>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl SettingsNotifier for ChannelNotifier {
    fn notify_settings_changed(&self, camera: &str) {
        let event = SettingsChanged {
            camera: camera.to_string(),
        };
        if self.sender.send(event).is_err() {
            log::debug!("Settings listener for {} is gone, dropping notification", camera);
        }
    }
}
