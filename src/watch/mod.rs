//! A small shared-state cell used to notify readers when a value changes.
//!
//! [State] is the single-writer/multi-reader primitive used throughout
//! `serve` and `session` to fan data out without polling: a writer mutates
//! the value and every reader waiting on [Ref::modified] wakes up. It's
//! deliberately minimal compared to `tokio::sync::watch`: the value isn't
//! required to be `Clone`, and [State::split] hands back one write-capable
//! handle and one read-only handle sharing the same cell.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

mod queue;
pub use queue::Queue;

struct Inner<T> {
    value: T,
    epoch: u64,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    writers: AtomicUsize,
    closed: AtomicBool,
}

/// Shared state with change notification.
///
/// Every clone of a write-capable handle keeps the cell open; once the last
/// one is dropped, `lock_mut`/`into_mut`/`modified` start returning `None` so
/// readers can stop waiting instead of hanging forever.
pub struct State<T> {
    shared: Arc<Shared<T>>,
    writer: bool,
}

impl<T> State<T> {
    pub fn new(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner { value, epoch: 0 }),
                notify: Notify::new(),
                writers: AtomicUsize::new(1),
                closed: AtomicBool::new(false),
            }),
            writer: true,
        }
    }

    /// Take a read lock on the current value.
    pub fn lock(&self) -> Ref<'_, T> {
        let guard = self.shared.inner.lock().unwrap();
        let epoch = guard.epoch;
        Ref {
            shared: &self.shared,
            guard,
            epoch,
        }
    }

    /// Take a write lock, unless every write-capable handle has been dropped.
    pub fn lock_mut(&self) -> Option<RefMut<'_, T>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return None;
        }
        let guard = self.shared.inner.lock().unwrap();
        Some(RefMut {
            shared: &self.shared,
            guard,
        })
    }

    /// Split into a write-capable handle and a read-only handle, both
    /// pointing at the same underlying value.
    pub fn split(self) -> (Self, Self) {
        if self.writer {
            self.shared.writers.fetch_add(1, Ordering::AcqRel);
        }
        let writer = Self {
            shared: self.shared.clone(),
            writer: self.writer,
        };
        let reader = Self {
            shared: self.shared.clone(),
            writer: false,
        };
        (writer, reader)
    }
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        if self.writer {
            self.shared.writers.fetch_add(1, Ordering::AcqRel);
        }
        Self {
            shared: self.shared.clone(),
            writer: self.writer,
        }
    }
}

impl<T> Drop for State<T> {
    fn drop(&mut self) {
        if !self.writer {
            return;
        }
        if self.shared.writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.closed.store(true, Ordering::Release);
            self.shared.notify.notify_waiters();
        }
    }
}

impl<T: Default> Default for State<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A read-only view of the current value, held under a lock.
pub struct Ref<'a, T> {
    shared: &'a Arc<Shared<T>>,
    guard: MutexGuard<'a, Inner<T>>,
    epoch: u64,
}

impl<T> Deref for Ref<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.value
    }
}

impl<'a, T> Ref<'a, T> {
    /// Wait for the value to change, returning `None` if no writer remains.
    ///
    /// Drops the read lock immediately; the returned future re-acquires it
    /// internally each time it's polled, so it's safe to await.
    pub fn modified(self) -> Option<impl Future<Output = ()> + 'a> {
        if self.shared.closed.load(Ordering::Acquire) {
            return None;
        }

        let shared = self.shared;
        let epoch = self.epoch;
        drop(self.guard);

        Some(async move {
            loop {
                let notified = shared.notify.notified();
                {
                    let guard = shared.inner.lock().unwrap();
                    if guard.epoch != epoch || shared.closed.load(Ordering::Acquire) {
                        return;
                    }
                }
                notified.await;
            }
        })
    }

    /// Upgrade this read lock into a write lock without releasing it,
    /// unless every write-capable handle has already been dropped.
    pub fn into_mut(self) -> Option<RefMut<'a, T>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return None;
        }
        Some(RefMut {
            shared: self.shared,
            guard: self.guard,
        })
    }
}

/// A write view of the current value. Bumps the epoch and wakes any waiters
/// on drop, whether or not the value actually changed.
pub struct RefMut<'a, T> {
    shared: &'a Arc<Shared<T>>,
    guard: MutexGuard<'a, Inner<T>>,
}

impl<T> Deref for RefMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.value
    }
}

impl<T> DerefMut for RefMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard.value
    }
}

impl<T> Drop for RefMut<'_, T> {
    fn drop(&mut self) {
        self.guard.epoch += 1;
        self.shared.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn modify_wakes_reader() {
        let (writer, mut reader) = State::new(0u32).split();

        let wait = tokio::spawn(async move {
            loop {
                let r = reader.lock();
                if *r > 0 {
                    return *r;
                }
                match r.modified() {
                    Some(notified) => notified.await,
                    None => return *reader.lock(),
                }
            }
        });

        tokio::task::yield_now().await;
        *writer.lock_mut().unwrap() = 7;

        assert_eq!(wait.await.unwrap(), 7);
    }

    #[test]
    fn lock_mut_none_after_writer_dropped() {
        let (writer, reader) = State::new(0u32).split();
        drop(writer);
        assert!(reader.lock_mut().is_none());
    }

    #[test]
    fn split_reader_cannot_close_cell() {
        let (writer, reader) = State::new(0u32).split();
        drop(reader);
        assert!(writer.lock_mut().is_some());
    }
}
