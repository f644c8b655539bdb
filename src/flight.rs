//! Keyed single-flight locks.
//!
//! `acquire(key)` waits until no other holder of the same key remains.
//! Each entry counts the tasks holding or awaiting it, and the last one to
//! leave removes it, whether it finished or was cancelled while waiting. The
//! table therefore only holds keys that are in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters
    users: usize,
}

#[derive(Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, Slot>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &str) -> FlightGuard<'_> {
        let lock = {
            let mut locks = self.table();
            let slot = locks.entry(key.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before the wait so a cancelled waiter still checks out
        let mut flight = FlightGuard {
            owner: self,
            key: key.to_string(),
            guard: None,
        };
        flight.guard = Some(lock.lock_owned().await);
        flight
    }

    /// Keys currently held or awaited
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct FlightGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut locks = self.owner.table();
        if let Some(slot) = locks.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}
