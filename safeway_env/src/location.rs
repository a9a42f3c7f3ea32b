//! Location source abstraction for SafeWay sessions.

use async_trait::async_trait;
use crate::types::DeviceEvent;

/// Abstraction for the device's push stream of location fixes.
///
/// # Implementations
///
/// - **Production**: [`crate::ChannelLocationSource`], fed by the platform layer
/// - **Simulation**: scripted sources replaying a recorded or generated track
///
/// # Event Flow
///
/// ```text
/// Platform                 LocationSource               SessionRuntime
///   |                           |                             |
///   |-- push(Fix) ------------->|                             |
///   |-- push(ServicesChanged) ->|                             |
///   |                           |-- next_event() -> event --->|
/// ```
///
/// Events are delivered one at a time; the runtime processes each to
/// completion before asking for the next.
#[async_trait]
pub trait LocationSource: Send + Sync + 'static {
    /// Waits for the next device event.
    ///
    /// # Returns
    /// * `Some(event)` - The next event in arrival order
    /// * `None` - The source was shut down (teardown)
    async fn next_event(&self) -> Option<DeviceEvent>;
}
