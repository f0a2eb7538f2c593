//! Viewer account collaborator: identity, contacts, and persisted toggles.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Account-scoped state injected into orchestrators.
///
/// Toggle persistence is best effort; implementations log their own failures
/// and `toggle` simply returns `None` for anything never set.
pub trait AccountState: Send + Sync {
    /// Pubkey of the signed-in viewer.
    fn pubkey(&self) -> String;

    /// Pubkeys the viewer follows.
    fn following(&self) -> Vec<String>;

    /// Relays configured on the account.
    fn relays(&self) -> Vec<String>;

    /// Read a persisted boolean toggle.
    fn toggle(&self, key: &str) -> Option<bool>;

    /// Persist a boolean toggle.
    fn set_toggle(&self, key: &str, value: bool);
}

/// Fixed account data with in-memory toggle storage.
#[derive(Debug, Default)]
pub struct StaticAccount {
    /// Viewer pubkey.
    pub pubkey: String,
    /// Followed pubkeys.
    pub following: Vec<String>,
    /// Account relay list.
    pub relays: Vec<String>,
    toggles: Mutex<HashMap<String, bool>>,
}

impl StaticAccount {
    /// Build an account from its identity, contacts, and relay list.
    pub fn new(pubkey: impl Into<String>, following: Vec<String>, relays: Vec<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            following,
            relays,
            toggles: Mutex::new(HashMap::new()),
        }
    }
}

impl AccountState for StaticAccount {
    fn pubkey(&self) -> String {
        self.pubkey.clone()
    }

    fn following(&self) -> Vec<String> {
        self.following.clone()
    }

    fn relays(&self) -> Vec<String> {
        self.relays.clone()
    }

    fn toggle(&self, key: &str) -> Option<bool> {
        self.toggles.lock().get(key).copied()
    }

    fn set_toggle(&self, key: &str, value: bool) {
        self.toggles.lock().insert(key.to_string(), value);
    }
}
