//! Snapshot of the most recent upload batch.
//!
//! A session is immutable once built. Uploads build a complete replacement and swap it in, so
//! a question either sees the previous batch or the new one, never a partial index.

use crate::index::VectorIndex;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Index and metadata for one upload batch.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    filenames: Vec<String>,
    index: VectorIndex,
}

impl Session {
    /// Wrap a freshly built index.
    pub fn new(filenames: Vec<String>, index: VectorIndex) -> Self {
        Self {
            id: Uuid::new_v4(),
            filenames,
            index,
        }
    }

    /// Unique identifier used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Filenames uploaded in this batch, in upload order.
    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// Vector index over the batch's chunks.
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

/// Holder for the active session.
#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Active session, if any upload has completed.
    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.read().await.clone()
    }

    /// Replace the active session, returning the one it displaced.
    pub async fn replace(&self, session: Session) -> Option<Arc<Session>> {
        let mut guard = self.current.write().await;
        guard.replace(Arc::new(session))
    }
}
