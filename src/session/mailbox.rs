//! Single-slot input mailbox

use crate::game::input::KeyState;
use crate::util::time::unix_millis;

/// Holds only the most recent key state. Posting overwrites whatever was
/// there, reading never consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputMailbox {
    latest: KeyState,
    posted_at: Option<u64>,
}

impl InputMailbox {
    pub fn post(&mut self, keys: KeyState) {
        self.latest = keys;
        self.posted_at = Some(unix_millis());
    }

    pub fn latest(&self) -> KeyState {
        self.latest
    }

    /// Unix millis of the last post, if any
    pub fn posted_at(&self) -> Option<u64> {
        self.posted_at
    }

    /// Drop any held keys, e.g. when the connection goes away
    pub fn clear(&mut self) {
        self.latest = KeyState::default();
    }
}
