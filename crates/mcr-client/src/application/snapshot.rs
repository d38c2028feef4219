//! Observable state container.
//!
//! A [`StateStore`] holds one value that is only ever replaced as a whole: a
//! writer receives the current snapshot, builds the next one, and the store
//! swaps it in atomically.  Any number of readers can take a copy at any time
//! or subscribe to change notifications.
//!
//! # Why `tokio::sync::watch`? (for beginners)
//!
//! A `watch` channel keeps only the latest value.  Subscribers that fall
//! behind simply see the newest snapshot the next time they look, which is
//! exactly what a UI wants: it never needs to replay intermediate states.
//!
//! [`StateStore::update`] runs the transformation while holding the channel's
//! write lock, so two concurrent updates can never interleave half-way.  The
//! closure must not call back into the same store.

use tokio::sync::watch;

/// Single-writer, multi-reader snapshot container.
#[derive(Debug)]
pub struct StateStore<T> {
    tx: watch::Sender<T>,
}

impl<T> StateStore<T>
where
    T: Clone + PartialEq,
{
    pub fn new(initial: T) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Returns a copy of the current snapshot.
    pub fn snapshot(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Subscribes to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Replaces the snapshot with `f(current)`.
    ///
    /// Subscribers are notified only if the new snapshot differs from the old
    /// one.  Returns `true` when a replacement happened.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        self.tx.send_if_modified(|current| {
            let next = f(current);
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_replaces_and_reports_change() {
        // Arrange
        let store = StateStore::new(1u32);

        // Act
        let changed = store.update(|v| v + 1);

        // Assert
        assert!(changed);
        assert_eq!(store.snapshot(), 2);
    }

    #[test]
    fn test_identical_update_does_not_notify() {
        let store = StateStore::new(String::from("a"));
        let rx = store.subscribe();

        let changed = store.update(|v| v.clone());

        assert!(!changed);
        assert!(!rx.has_changed().unwrap_or(true));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_the_latest_snapshot() {
        // Arrange
        let store = StateStore::new(0u8);
        let mut first = store.subscribe();
        let mut second = store.subscribe();

        // Act
        store.update(|_| 5);
        store.update(|_| 9);

        // Assert
        first.changed().await.expect("sender alive");
        second.changed().await.expect("sender alive");
        assert_eq!(*first.borrow_and_update(), 9);
        assert_eq!(*second.borrow_and_update(), 9);
    }
}
