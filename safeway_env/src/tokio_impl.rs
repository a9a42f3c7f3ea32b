//! Production implementation of LocationSource using Tokio channels.

use crate::location::LocationSource;
use crate::types::{DeviceEvent, LocationFix};
use crate::error::EnvError;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// Location source backed by a Tokio mpsc channel.
///
/// The platform layer keeps the [`DeviceEventSender`] and pushes events at its
/// own cadence; dropping every sender closes the source.
pub struct ChannelLocationSource {
    rx: Mutex<mpsc::Receiver<DeviceEvent>>,
}

/// Sending half handed to the platform layer.
#[derive(Clone)]
pub struct DeviceEventSender {
    tx: mpsc::Sender<DeviceEvent>,
}

impl ChannelLocationSource {
    /// Creates a source and its sender with the given buffer size.
    pub fn channel(buffer: usize) -> (DeviceEventSender, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            DeviceEventSender { tx },
            Self {
                rx: Mutex::new(rx),
            },
        )
    }
}

impl DeviceEventSender {
    /// Pushes any device event.
    pub async fn send(&self, event: DeviceEvent) -> Result<(), EnvError> {
        self.tx.send(event).await.map_err(|_| EnvError::SourceClosed)
    }

    /// Pushes a location fix.
    pub async fn send_fix(&self, fix: LocationFix) -> Result<(), EnvError> {
        self.send(DeviceEvent::Fix(fix)).await
    }

    /// Signals that the preference store was written externally.
    pub async fn preferences_changed(&self) -> Result<(), EnvError> {
        self.send(DeviceEvent::PreferencesChanged).await
    }

    /// Signals a location-service capability change.
    pub async fn services_changed(&self, enabled: bool) -> Result<(), EnvError> {
        self.send(DeviceEvent::ServicesChanged(enabled)).await
    }
}

#[async_trait]
impl LocationSource for ChannelLocationSource {
    async fn next_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;

    #[tokio::test]
    async fn test_channel_source_preserves_order() {
        let (tx, source) = ChannelLocationSource::channel(8);

        tx.send_fix(LocationFix::new(Coordinate::new(1.0, 2.0), 10)).await.unwrap();
        tx.preferences_changed().await.unwrap();
        tx.services_changed(false).await.unwrap();
        drop(tx);

        assert!(matches!(source.next_event().await, Some(DeviceEvent::Fix(_))));
        assert_eq!(source.next_event().await, Some(DeviceEvent::PreferencesChanged));
        assert_eq!(source.next_event().await, Some(DeviceEvent::ServicesChanged(false)));
        assert_eq!(source.next_event().await, None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (tx, source) = ChannelLocationSource::channel(1);
        drop(source);

        let result = tx.preferences_changed().await;
        assert!(matches!(result, Err(EnvError::SourceClosed)));
    }
}
