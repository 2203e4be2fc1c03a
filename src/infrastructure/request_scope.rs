// Request Scope - one child comment loader and one cancellation signal per request
// Handlers build a scope at the request boundary and pass its loader explicitly
// to whatever resolves nested children. Dropping the scope cancels it.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::config::LoaderConfig;
use crate::infrastructure::batch_loader::ChildCommentLoader;
use crate::infrastructure::storage::StorageBackend;

pub struct RequestScope {
    request_id: String,
    cancel: watch::Sender<bool>,
    loader: Arc<ChildCommentLoader>,
}

impl RequestScope {
    pub fn new(storage: Arc<dyn StorageBackend>, config: LoaderConfig) -> Self {
        let (cancel, cancelled) = watch::channel(false);
        let loader = Arc::new(ChildCommentLoader::new(storage, config, cancelled));
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancel,
            loader,
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn loader(&self) -> Arc<ChildCommentLoader> {
        Arc::clone(&self.loader)
    }

    /// Fail every undispatched load with `Cancelled`.
    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            debug!(request_id = %self.request_id, "request scope cancelled");
        }
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.cancel();
    }
}
