use parking_lot::RwLock;
use std::sync::Arc;

type LogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Fan-out of human-readable session messages.
///
/// Every message is also emitted as a `tracing` event.
#[derive(Clone, Default)]
pub struct SessionLog {
    callbacks: Arc<RwLock<Vec<LogCallback>>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    pub fn emit(&self, message: &str) {
        tracing::info!(target: "jitmux::session", "{message}");
        // Snapshot so a callback may register further callbacks.
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(message);
        }
    }
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("callbacks", &self.callbacks.read().len())
            .finish()
    }
}
