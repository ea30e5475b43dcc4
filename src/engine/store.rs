use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::models::Session;

/// Destination for completed sessions.
pub trait SessionStore: Send {
    fn append(&self, session: &Session) -> Result<()>;
    fn list_all(&self) -> Result<Vec<Session>>;
}

/// Keeps completed sessions in memory. Clones share the same backing list.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<Vec<Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn append(&self, session: &Session) -> Result<()> {
        self.sessions
            .lock()
            .map_err(|_| anyhow!("session list lock poisoned"))?
            .push(session.clone());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .lock()
            .map_err(|_| anyhow!("session list lock poisoned"))?
            .clone())
    }
}
