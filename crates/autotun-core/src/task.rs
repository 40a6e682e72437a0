// ── Detached background work ──
//
// Fire-and-forget work triggered from outside the controller (shortcut
// requests). The task is detached: nobody holds its handle and nothing
// cancels it. It must not capture anything the caller needs back.

use std::future::Future;

use tracing::debug;

/// Runs its release action exactly once when dropped.
///
/// Dropping happens on normal completion and while unwinding from a
/// panic, so the release cannot be skipped.
pub struct CompletionGuard {
    label: &'static str,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CompletionGuard {
    pub fn new(label: &'static str, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label,
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            debug!(task = self.label, "detached task released");
        }
    }
}

/// Spawn `work` on the current runtime without keeping its handle.
///
/// `guard` is moved into the task and dropped when the task ends, however
/// it ends.
pub fn spawn_detached<F>(guard: CompletionGuard, work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    debug!(task = guard.label, "spawning detached task");
    drop(tokio::spawn(async move {
        let _guard = guard;
        work.await;
    }));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn guard_releases_after_completion() {
        let (tx, rx) = oneshot::channel();
        let guard = CompletionGuard::new("test", move || {
            let _ = tx.send(());
        });
        spawn_detached(guard, async {});
        rx.await.unwrap();
    }

    #[tokio::test]
    async fn guard_releases_when_work_panics() {
        let released = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();
        let counter = Arc::clone(&released);
        let guard = CompletionGuard::new("panicking", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(());
        });

        let explode = true;
        spawn_detached(guard, async move {
            if explode {
                panic!("boom");
            }
        });
        rx.await.unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
