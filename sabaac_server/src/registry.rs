use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use sabaac_core::{GameVariant, Session};

/// One registered session behind its own lock. All mutation and all
/// snapshot projection happen under this mutex, so every broadcast
/// reflects exactly one committed state.
pub struct SessionHandle {
    pub session: Mutex<Session>,
}

/// Process-wide code -> session map. Finished sessions stay registered
/// (flagged inactive) for the life of the process.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry {
            sessions: DashMap::new(),
        }
    }

    /// Build a fresh active session. Codes are short, so a collision with
    /// a live session is possible; regenerate until the code is unique.
    pub fn create(&self, variant: GameVariant) -> Arc<SessionHandle> {
        loop {
            let session = Session::new(variant);
            match self.sessions.entry(session.code.clone()) {
                Entry::Occupied(_) => {
                    debug!(code = %session.code, "session code collision, regenerating");
                    continue;
                }
                Entry::Vacant(entry) => {
                    let handle = Arc::new(SessionHandle {
                        session: Mutex::new(session),
                    });
                    entry.insert(handle.clone());
                    return handle;
                }
            }
        }
    }

    /// Look up a session by code, active sessions only.
    pub fn lookup(&self, code: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.get(code)?.clone();
        if handle.session.lock().is_active {
            Some(handle)
        } else {
            None
        }
    }

    /// Every session still accepting play.
    pub fn list_active(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().session.lock().is_active)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_lookup_round_trip() {
        let registry = SessionRegistry::new();
        let handle = registry.create(GameVariant::CorellianGambit);
        let code = handle.session.lock().code.clone();

        let found = registry.lookup(&code).expect("session must be found");
        assert!(Arc::ptr_eq(&handle, &found));
        assert_eq!(registry.list_active().len(), 1);
    }

    #[test]
    fn test_lookup_unknown_code() {
        let registry = SessionRegistry::new();
        registry.create(GameVariant::CorellianGambit);
        assert!(registry.lookup("zzzzzz").is_none());
    }

    #[test]
    fn test_lookup_skips_inactive_sessions() {
        let registry = SessionRegistry::new();
        let handle = registry.create(GameVariant::CorellianGambit);
        let code = handle.session.lock().code.clone();

        handle.session.lock().is_active = false;
        assert!(registry.lookup(&code).is_none());
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_created_codes_are_unique() {
        let registry = SessionRegistry::new();
        let mut codes = std::collections::HashSet::new();
        for _ in 0..64 {
            let handle = registry.create(GameVariant::CorellianGambit);
            assert!(codes.insert(handle.session.lock().code.clone()));
        }
        assert_eq!(registry.list_active().len(), 64);
    }
}
