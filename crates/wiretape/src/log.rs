// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Caller-owned log container shared with recorders.

use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only handle to a log the caller reads back after recording.
///
/// Clones share the same storage. A panicking recorder callback never makes
/// the log unreadable; the poisoned guard is recovered.
#[derive(Debug)]
pub struct SharedLog<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> SharedLog<T> {
    pub fn new() -> Self {
        Self::from_entries(Vec::new())
    }

    pub fn from_entries(entries: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn push(&self, entry: T) {
        self.lock().push(entry);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock())
    }

    /// Run `f` with exclusive access to the entries.
    pub fn update<R>(&self, f: impl FnOnce(&mut Vec<T>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> SharedLog<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().clone()
    }
}

impl<T> Clone for SharedLog<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for SharedLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let log = SharedLog::new();
        let writer = log.clone();
        writer.push(1);
        writer.push(2);
        assert_eq!(log.snapshot(), vec![1, 2]);
        assert_eq!(log.take(), vec![1, 2]);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_poisoned_log_stays_usable() {
        let log = SharedLog::from_entries(vec!["kept"]);
        let poisoner = log.clone();
        let result = std::thread::spawn(move || {
            poisoner.update(|_| panic!("recorder callback failed"));
        })
        .join();
        assert!(result.is_err());
        log.push("after");
        assert_eq!(log.snapshot(), vec!["kept", "after"]);
    }
}
