// Child Comment Loader - request-scoped batching of "children of X" lookups
//
// The first `load` in a fresh window starts a timer. The window is flushed
// with exactly one `child_comments_batch` call when the timer fires or when
// the number of distinct keys reaches `max_batch`, whichever comes first.
// Results are grouped by parent and fanned out to every waiter; a failed
// call fails every waiter of that window with the same error. Cancelling the
// owning request fails undispatched waiters with `AppError::Cancelled`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, warn};

use crate::config::LoaderConfig;
use crate::error::{AppError, AppResult};
use crate::infrastructure::storage::StorageBackend;
use crate::models::{Comment, CommentId};

type Waiter = oneshot::Sender<AppResult<Vec<Comment>>>;

/// Keys registered since the last flush.
struct Window {
    id: u64,
    keys: Vec<CommentId>,
    waiters: HashMap<CommentId, Vec<Waiter>>,
}

impl Window {
    fn new(id: u64) -> Self {
        Self {
            id,
            keys: Vec::new(),
            waiters: HashMap::new(),
        }
    }

    fn register(&mut self, key: CommentId, waiter: Waiter) {
        let waiters = self.waiters.entry(key).or_default();
        if waiters.is_empty() {
            self.keys.push(key);
        }
        waiters.push(waiter);
    }

    fn fail(self, err: AppError) {
        for waiter in self.waiters.into_values().flatten() {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}

#[derive(Default)]
struct LoaderState {
    windows_opened: u64,
    open: Option<Window>,
    /// Children already resolved during this request.
    memo: HashMap<CommentId, Vec<Comment>>,
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Timer,
    Capacity,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Capacity => "capacity",
        }
    }
}

/// One instance per incoming request. Never shared across requests.
pub struct ChildCommentLoader {
    storage: Arc<dyn StorageBackend>,
    config: LoaderConfig,
    state: Arc<Mutex<LoaderState>>,
    cancelled: watch::Receiver<bool>,
}

impl ChildCommentLoader {
    /// `cancelled` flips to `true` (or its sender is dropped) when the
    /// owning request goes away.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        config: LoaderConfig,
        cancelled: watch::Receiver<bool>,
    ) -> Self {
        Self {
            storage,
            config: LoaderConfig {
                max_batch: config.max_batch.max(1),
                ..config
            },
            state: Arc::new(Mutex::new(LoaderState::default())),
            cancelled,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.cancelled.has_changed().is_err()
    }

    /// Children of `parent_id` in (created_at DESC, id DESC) order.
    pub async fn load(&self, parent_id: CommentId) -> AppResult<Vec<Comment>> {
        if self.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let receiver = {
            let mut state = self.state.lock().await;
            if let Some(children) = state.memo.get(&parent_id) {
                return Ok(children.clone());
            }

            let mut window = match state.open.take() {
                Some(window) => window,
                None => {
                    state.windows_opened += 1;
                    let id = state.windows_opened;
                    self.spawn_timer(id);
                    Window::new(id)
                }
            };

            let (tx, rx) = oneshot::channel();
            window.register(parent_id, tx);

            if window.keys.len() >= self.config.max_batch {
                tokio::spawn(dispatch(
                    Arc::clone(&self.storage),
                    Arc::clone(&self.state),
                    window,
                    Trigger::Capacity,
                ));
            } else {
                state.open = Some(window);
            }
            rx
        };

        receiver.await.map_err(|_| {
            AppError::Internal("child comment batch dropped before resolving".to_string())
        })?
    }

    fn spawn_timer(&self, window_id: u64) {
        let storage = Arc::clone(&self.storage);
        let state = Arc::clone(&self.state);
        let mut cancelled = self.cancelled.clone();
        let wait = self.config.wait();

        tokio::spawn(async move {
            let fired = tokio::select! {
                biased;
                _ = cancellation(&mut cancelled) => false,
                _ = tokio::time::sleep(wait) => true,
            };

            let window = {
                let mut state = state.lock().await;
                match state.open.as_ref() {
                    Some(open) if open.id == window_id => state.open.take(),
                    // Already flushed on capacity.
                    _ => None,
                }
            };
            let Some(window) = window else {
                return;
            };

            if fired {
                dispatch(storage, state, window, Trigger::Timer).await;
            } else {
                debug!(
                    window = window.id,
                    keys = window.keys.len(),
                    "request cancelled before child comment batch dispatch"
                );
                window.fail(AppError::Cancelled);
            }
        });
    }
}

/// Resolves once the request is cancelled or its scope has been dropped.
async fn cancellation(cancelled: &mut watch::Receiver<bool>) {
    let _ = cancelled.wait_for(|cancelled| *cancelled).await;
}

async fn dispatch(
    storage: Arc<dyn StorageBackend>,
    state: Arc<Mutex<LoaderState>>,
    window: Window,
    trigger: Trigger,
) {
    debug!(
        window = window.id,
        keys = window.keys.len(),
        trigger = trigger.as_str(),
        "dispatching child comment batch"
    );

    let children = match storage.child_comments_batch(&window.keys).await {
        Ok(children) => children,
        Err(err) => {
            warn!(window = window.id, error = %err, "child comment batch failed");
            window.fail(err);
            return;
        }
    };

    let mut groups: HashMap<CommentId, Vec<Comment>> = HashMap::new();
    for child in children {
        if let Some(parent_id) = child.parent_id {
            groups.entry(parent_id).or_default().push(child);
        }
    }

    let mut state = state.lock().await;
    for (parent_id, waiters) in window.waiters {
        let children = groups.remove(&parent_id).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(Ok(children.clone()));
        }
        state.memo.insert(parent_id, children);
    }
}
