//! One-shot broadcast notifications.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Fires at most once and carries a value to every waiter.
///
/// Waiters that arrive after the fire complete immediately.  Cloning is
/// cheap and all clones observe the same fire.
pub struct Signal<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: OnceLock<T>,
    fired: CancellationToken,
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: OnceLock::new(),
                fired: CancellationToken::new(),
            }),
        }
    }

    /// Store `value` and wake every waiter.  Returns `false` if the signal
    /// had already fired; the first value wins.
    pub(crate) fn fire(&self, value: T) -> bool {
        if self.inner.value.set(value).is_err() {
            return false;
        }
        self.inner.fired.cancel();
        true
    }

    pub fn is_fired(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// The fired value, without waiting.
    pub fn get(&self) -> Option<T> {
        self.inner.value.get().cloned()
    }

    pub async fn wait(&self) -> T {
        loop {
            if let Some(v) = self.get() {
                return v;
            }
            self.inner.fired.cancelled().await;
        }
    }
}

impl<T: Clone> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &self.inner.value.get())
            .finish()
    }
}
