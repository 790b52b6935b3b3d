use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tunnelgate_common::{SessionId, User};

/// Session id -> authenticated user, mutated from the SSH auth callback
/// (insert) and the session teardown path (remove). An entry exists only
/// while the session state machine holds an active connection for that id.
#[derive(Clone, Default)]
pub struct SessionBindings {
    inner: Arc<Mutex<HashMap<SessionId, User>>>,
}

impl SessionBindings {
    pub async fn bind(&self, session_id: SessionId, user: User) {
        self.inner.lock().await.insert(session_id, user);
    }

    /// Removes the binding for `session_id`. Idempotent: calling it more
    /// than once, or on a session that was never bound (unrestricted auth),
    /// is harmless.
    pub async fn release(&self, session_id: &SessionId) {
        self.inner.lock().await.remove(session_id);
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<User> {
        self.inner.lock().await.get(session_id).cloned()
    }
}
