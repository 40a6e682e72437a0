// ── Reactive snapshot streams ──
//
// Subscription handle for any value published through a `watch`
// channel: the tunnel list, the settings record, the VPN state.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to a snapshot-replaced value.
///
/// Provides both point-in-time access and reactive change notification
/// via [`changed()`](Self::changed) or by converting to a `Stream`.
pub struct SnapshotStream<T: Send + Sync + 'static> {
    current: Arc<T>,
    receiver: watch::Receiver<Arc<T>>,
}

impl<T: Send + Sync + 'static> SnapshotStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<T>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation time or at the last `changed()`.
    pub fn current(&self) -> &Arc<T> {
        &self.current
    }

    /// Latest published snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<T> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the publisher has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> SnapshotWatchStream<T> {
        SnapshotWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each published snapshot.
pub struct SnapshotWatchStream<T: Send + Sync + 'static> {
    inner: WatchStream<Arc<T>>,
}

impl<T: Send + Sync + 'static> Stream for SnapshotWatchStream<T> {
    type Item = Arc<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // `Arc<T>` is always Unpin, so the inner WatchStream is too.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
