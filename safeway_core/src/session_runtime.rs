//! Session Runtime - drives a GeofenceSession from device events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SessionRuntime                      │
//! │                                                      │
//! │  LocationSource ──► next_event() ──┐                 │
//! │                                    ▼                 │
//! │    Fix ─────────────► GeofenceSession ──► Sink       │
//! │    PreferencesChanged ──► PreferenceStore (re-read)  │
//! │    ServicesChanged ─────► services flag (logged)     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use safeway_core::session_runtime::SessionRuntime;
//! use safeway_env::{ChannelLocationSource, SledPreferenceStore, TracingNotificationSink};
//!
//! let (tx, source) = ChannelLocationSource::channel(64);
//! let runtime = SessionRuntime::new(
//!     Arc::new(source),
//!     Arc::new(TracingNotificationSink),
//!     Arc::new(SledPreferenceStore::open("prefs")?),
//!     grid,
//!     &config,
//! );
//!
//! let stats = runtime.run().await;
//! ```

use safeway_env::{DeviceEvent, LocationSource, NotificationSink, PreferenceStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::grid::RiskGrid;
use crate::notifier::Decision;
use crate::session::{GeofenceSession, SessionStats};
use crate::threshold::read_preference;

/// Async event loop around one session.
///
/// Generic over the source, sink and store so production and simulation
/// share the loop.
pub struct SessionRuntime<Src, Sink, Store>
where
    Src: LocationSource,
    Sink: NotificationSink,
    Store: PreferenceStore + ?Sized,
{
    source: Arc<Src>,
    store: Arc<Store>,
    session: GeofenceSession<Sink>,

    /// Last reported location-service state, `None` until the platform says
    services_enabled: Option<bool>,
}

impl<Src, Sink, Store> SessionRuntime<Src, Sink, Store>
where
    Src: LocationSource,
    Sink: NotificationSink,
    Store: PreferenceStore + ?Sized,
{
    /// Creates a runtime, reading the initial preference from the store.
    pub fn new(
        source: Arc<Src>,
        sink: Arc<Sink>,
        store: Arc<Store>,
        grid: Arc<RiskGrid>,
        config: &EngineConfig,
    ) -> Self {
        let preference = read_preference(store.as_ref());
        let session = GeofenceSession::new(grid, sink, config, preference);
        Self::from_session(source, store, session)
    }

    /// Wraps an existing session. The session's preference is kept as-is.
    pub fn from_session(source: Arc<Src>, store: Arc<Store>, session: GeofenceSession<Sink>) -> Self {
        Self {
            source,
            store,
            session,
            services_enabled: None,
        }
    }

    pub fn session(&self) -> &GeofenceSession<Sink> {
        &self.session
    }

    pub fn services_enabled(&self) -> Option<bool> {
        self.services_enabled
    }

    /// Handles one event to completion.
    ///
    /// Returns the session decision for fixes, `None` for other events.
    pub fn handle_event(&mut self, event: DeviceEvent) -> Option<Decision> {
        match event {
            DeviceEvent::Fix(fix) => {
                if self.services_enabled == Some(false) {
                    debug!(session = %self.session.id(), "Fix received while services reported disabled");
                }
                Some(self.session.on_fix(&fix))
            }
            DeviceEvent::PreferencesChanged => {
                self.session.refresh_preference(self.store.as_ref());
                None
            }
            DeviceEvent::ServicesChanged(enabled) => {
                if self.services_enabled != Some(enabled) {
                    if enabled {
                        info!(session = %self.session.id(), "Location services enabled");
                    } else {
                        warn!(session = %self.session.id(), "Location services disabled");
                    }
                }
                self.services_enabled = Some(enabled);
                None
            }
        }
    }

    /// Runs until the source closes and returns the final counters.
    pub async fn run(mut self) -> SessionStats {
        info!(
            session = %self.session.id(),
            preference = %self.session.preference(),
            "Session runtime started"
        );

        while let Some(event) = self.source.next_event().await {
            self.handle_event(event);
        }

        let stats = self.session.stats();
        info!(
            session = %self.session.id(),
            fixes = stats.fixes,
            notifications = stats.notifications,
            "Location source closed, session finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safeway_env::{
        Alert, ChannelLocationSource, Coordinate, EnvError, LocationFix, MemoryPreferenceStore,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::threshold::{write_preference, NotificationPreference, PREFERENCE_KEY};

    #[derive(Default)]
    struct CountingSink {
        count: AtomicUsize,
    }

    impl NotificationSink for CountingSink {
        fn emit(&self, _alert: &Alert) -> Result<(), EnvError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Store that counts reads.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryPreferenceStore,
        reads: AtomicUsize,
        last_written: Mutex<Option<String>>,
    }

    impl PreferenceStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>, EnvError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), EnvError> {
            *self.last_written.lock().unwrap() = Some(value.to_string());
            self.inner.set(key, value)
        }
    }

    fn grid() -> Arc<RiskGrid> {
        let ring = vec![
            Coordinate::from_lon_lat(0.0, 0.0),
            Coordinate::from_lon_lat(0.0, 1.0),
            Coordinate::from_lon_lat(1.0, 1.0),
            Coordinate::from_lon_lat(1.0, 0.0),
        ];
        Arc::new(RiskGrid::from_parts(vec![(ring, 1200)]))
    }

    fn fix(lat: f64, lon: f64) -> LocationFix {
        LocationFix::new(Coordinate::new(lat, lon), 0)
    }

    #[tokio::test]
    async fn test_runtime_processes_fixes_until_close() {
        let (tx, source) = ChannelLocationSource::channel(16);
        let sink = Arc::new(CountingSink::default());
        let store = Arc::new(MemoryPreferenceStore::with_value(PREFERENCE_KEY, "high"));

        let runtime = SessionRuntime::new(
            Arc::new(source),
            sink.clone(),
            store,
            grid(),
            &EngineConfig::default(),
        );

        let handle = tokio::spawn(runtime.run());

        for (lat, lon) in [(0.5, 0.5), (0.5, 0.5), (5.0, 5.0), (0.5, 0.5)] {
            tx.send_fix(fix(lat, lon)).await.unwrap();
        }
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.fixes, 4);
        assert_eq!(stats.notifications, 2);
        assert_eq!(sink.count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_preference_reread_only_on_change_event() {
        let (tx, source) = ChannelLocationSource::channel(16);
        let store = Arc::new(CountingStore::default());

        let mut runtime = SessionRuntime::new(
            Arc::new(source),
            Arc::new(CountingSink::default()),
            store.clone(),
            grid(),
            &EngineConfig::default(),
        );
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.session().preference(), NotificationPreference::Moderate);

        // Written behind the runtime's back: not visible until signalled
        write_preference(store.as_ref(), NotificationPreference::Disabled).unwrap();
        assert!(runtime.handle_event(DeviceEvent::Fix(fix(0.5, 0.5))).unwrap().is_notify());
        assert!(runtime.handle_event(DeviceEvent::Fix(fix(5.0, 5.0))).is_some());
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        runtime.handle_event(DeviceEvent::PreferencesChanged);
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
        assert_eq!(runtime.session().preference(), NotificationPreference::Disabled);
        assert_eq!(store.last_written.lock().unwrap().as_deref(), Some("none"));

        assert_eq!(
            runtime.handle_event(DeviceEvent::Fix(fix(0.5, 0.5))),
            Some(Decision::Idle)
        );
        drop(tx);
    }

    #[tokio::test]
    async fn test_fixes_processed_while_services_disabled() {
        let (tx, source) = ChannelLocationSource::channel(16);
        let sink = Arc::new(CountingSink::default());
        let runtime = SessionRuntime::new(
            Arc::new(source),
            sink.clone(),
            Arc::new(MemoryPreferenceStore::new()),
            grid(),
            &EngineConfig::default(),
        );
        let handle = tokio::spawn(runtime.run());

        tx.services_changed(false).await.unwrap();
        tx.send_fix(fix(0.5, 0.5)).await.unwrap();
        tx.services_changed(true).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.notifications, 1);
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_services_flag_tracks_last_event() {
        let (_tx, source) = ChannelLocationSource::channel(1);
        let mut runtime = SessionRuntime::new(
            Arc::new(source),
            Arc::new(CountingSink::default()),
            Arc::new(MemoryPreferenceStore::new()),
            grid(),
            &EngineConfig::default(),
        );
        assert_eq!(runtime.services_enabled(), None);

        runtime.handle_event(DeviceEvent::ServicesChanged(false));
        assert_eq!(runtime.services_enabled(), Some(false));
        runtime.handle_event(DeviceEvent::ServicesChanged(true));
        assert_eq!(runtime.services_enabled(), Some(true));
    }
}
