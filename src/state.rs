use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clock::{Clock, SystemClock};
use crate::config::RideSettings;
use crate::notify::{BroadcastNotifier, Notification, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::RideStore;

pub struct AppState {
    pub store: Arc<dyn RideStore>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub notifications_tx: broadcast::Sender<Notification>,
    pub settings: RideSettings,
    pub metrics: Metrics,
}

impl AppState {
    /// State wired with the system clock and the broadcast notifier.
    pub fn new(store: Arc<dyn RideStore>, settings: RideSettings, event_buffer_size: usize) -> Self {
        let (notifications_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(BroadcastNotifier::new(notifications_tx.clone())),
            notifications_tx,
            settings,
            metrics: Metrics::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}
