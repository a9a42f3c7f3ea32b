//! SafeWay Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary between the geofencing engine
//! and the device it runs on. Everything the engine cannot compute by itself
//! is behind a trait:
//! - Position stream (`LocationSource`)
//! - Persisted settings (`PreferenceStore`)
//! - User-facing alerts (`NotificationSink`)
//!
//! The same session code runs against the production implementations here
//! and against the scripted ones in `safeway_sim`.
//!
//! # Example
//!
//! ```ignore
//! use safeway_env::{ChannelLocationSource, MemoryPreferenceStore, TracingNotificationSink};
//!
//! let (tx, source) = ChannelLocationSource::channel(64);
//! let store = MemoryPreferenceStore::new();
//! let sink = TracingNotificationSink;
//!
//! // Platform layer
//! tx.send_fix(fix).await?;
//! ```

mod error;
mod location;
mod notification;
mod preferences;
mod tokio_impl;
mod types;

pub use error::EnvError;
pub use location::LocationSource;
pub use notification::{NotificationSink, TracingNotificationSink};
pub use preferences::{MemoryPreferenceStore, PreferenceStore, SledPreferenceStore};
pub use tokio_impl::{ChannelLocationSource, DeviceEventSender};
pub use types::{Alert, Coordinate, DeviceEvent, LocationFix, RiskLevel, SessionId};
