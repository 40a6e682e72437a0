// ── In-memory settings store ──

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use super::SettingsStore;
use crate::model::Settings;

/// Single-record settings store.
///
/// `current()` is a wait-free `ArcSwap` load; every `replace()` also
/// publishes the new value to `watch` subscribers.
pub struct MemorySettingsStore {
    value: ArcSwap<Settings>,
    publisher: watch::Sender<Arc<Settings>>,
}

impl MemorySettingsStore {
    pub fn new(initial: Settings) -> Self {
        let initial = Arc::new(initial);
        let (publisher, _) = watch::channel(Arc::clone(&initial));
        Self {
            value: ArcSwap::new(initial),
            publisher,
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SettingsStore for MemorySettingsStore {
    fn current(&self) -> Arc<Settings> {
        self.value.load_full()
    }

    fn replace(&self, settings: Settings) {
        let next = Arc::new(settings);
        self.value.store(Arc::clone(&next));
        self.publisher.send_replace(next);
    }

    fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.publisher.subscribe()
    }
}
