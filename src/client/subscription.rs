// Live query plumbing shared by every subscribe_* method.
// A subscription owns a background task that reloads a full snapshot each
// time a relevant change arrives and pushes it down an mpsc channel.
// Dropping the subscription aborts the task, which is the teardown.

use std::future::Future;

use log::{debug, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::Result;

pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, task: JoinHandle<()>) -> Self {
        Subscription { rx, task }
    }

    /// Wait for the next snapshot; `None` once the feed has ended
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already buffered
    pub fn try_next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Outcome of waiting on a change feed
pub(crate) enum Wake {
    Reload,
    Closed,
}

/// Block until `changes` yields something `relevant`. A lagged receiver
/// reloads too, since it may have skipped a relevant change.
pub(crate) async fn wait_for<E, R>(changes: &mut broadcast::Receiver<E>, relevant: &R) -> Wake
where
    E: Clone,
    R: Fn(&E) -> bool,
{
    loop {
        match changes.recv().await {
            Ok(event) if relevant(&event) => return Wake::Reload,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!("Subscription lagged by {} changes, reloading", skipped);
                return Wake::Reload;
            }
            Err(RecvError::Closed) => return Wake::Closed,
        }
    }
}

/// Spawn a snapshot subscription over a single change feed.
/// `changes` must be subscribed before the call so nothing slips in between
/// the first load and the first wait.
pub(crate) fn spawn_snapshots<E, T, R, L, Fut>(
    mut changes: broadcast::Receiver<E>,
    buffer: usize,
    relevant: R,
    load: L,
) -> Subscription<T>
where
    E: Clone + Send + 'static,
    T: Send + 'static,
    R: Fn(&E) -> bool + Send + Sync + 'static,
    L: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(async move {
        loop {
            match load().await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        debug!("Subscriber went away");
                        return;
                    }
                }
                Err(e) => warn!("Failed to load subscription snapshot: {}", e),
            }

            if let Wake::Closed = wait_for(&mut changes, &relevant).await {
                debug!("Change feed closed, ending subscription");
                return;
            }
        }
    });
    Subscription::new(rx, task)
}
