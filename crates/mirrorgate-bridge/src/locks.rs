// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mutual exclusion per local message.
//!
//! Every path that decides between creating and updating a mirror copy, or
//! that sends a mirror reply through a session, holds the lock of the local
//! message for the whole read-decide-call-record sequence. Live events,
//! sweeper retries, and operator retries for one message therefore never
//! interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mirrorgate_core::MirrorgateError;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by local message id. A slot is removed once nobody
/// holds or waits on it.
#[derive(Debug, Default)]
pub(crate) struct MessageLocks {
    slots: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one reconciliation step.
pub(crate) struct MessageGuard<'a> {
    locks: &'a MessageLocks,
    key: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl MessageLocks {
    pub(crate) async fn lock(&self, key: i64) -> Result<MessageGuard<'_>, MirrorgateError> {
        let slot = {
            let mut slots = self.slots.lock().map_err(|e| {
                MirrorgateError::Internal(format!("message lock table poisoned: {e}"))
            })?;
            Arc::clone(slots.entry(key).or_default())
        };
        let guard = slot.lock_owned().await;
        Ok(MessageGuard {
            locks: self,
            key,
            guard: Some(guard),
        })
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or_default()
    }
}

impl Drop for MessageGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the slot, so a count of one means
        // only the table still references it.
        if let Ok(mut slots) = self.locks.slots.lock()
            && slots
                .get(&self.key)
                .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(MessageLocks::default());
        let order = Arc::new(AsyncMutex::new(Vec::new()));

        let first = locks.lock(7).await.unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let _guard = locks.lock(7).await.unwrap();
                order.lock().await.push("second");
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        order.lock().await.push("first");
        drop(first);
        waiter.await.unwrap();

        assert_eq!(*order.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = MessageLocks::default();
        let _a = locks.lock(1).await.unwrap();
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn released_slots_are_removed() {
        let locks = MessageLocks::default();
        {
            let _a = locks.lock(1).await.unwrap();
            let _b = locks.lock(2).await.unwrap();
            assert_eq!(locks.slot_count(), 2);
        }
        assert_eq!(locks.slot_count(), 0);
    }
}
