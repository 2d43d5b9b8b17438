//! Deduplicating FIFO of words waiting to be typed
//!
//! The queue and the set of pending words share one mutex, so a word is never
//! observable as pending-but-gone or queued-but-not-pending.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One typable token recognised by the game
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Word(String);

impl Word {
    /// Trimmed word, or `None` when nothing is left to type.
    pub fn new(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Self(text.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct QueueInner {
    words: VecDeque<Word>,
    pending: HashSet<Word>,
}

/// Thread-safe word queue with a parallel dedup set
#[derive(Default)]
pub struct WordQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl WordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append every word not already pending. Returns how many were added.
    pub fn enqueue<I>(&self, words: I) -> usize
    where
        I: IntoIterator<Item = Word>,
    {
        let mut inner = self.lock();
        let mut added = 0;
        for word in words {
            if inner.pending.insert(word.clone()) {
                tracing::debug!(word = %word, "queued");
                inner.words.push_back(word);
                added += 1;
            }
        }
        drop(inner);

        if added > 0 {
            self.available.notify_all();
        }
        added
    }

    /// Pop the head word, waiting up to `timeout` for one to arrive.
    ///
    /// The word stays pending until [`WordQueue::mark_done`].
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Word> {
        let inner = self.lock();
        let (mut inner, _) = self
            .available
            .wait_timeout_while(inner, timeout, |inner| inner.words.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        inner.words.pop_front()
    }

    /// Release a dequeued word so it can be queued again.
    pub fn mark_done(&self, word: &Word) -> bool {
        self.lock().pending.remove(word)
    }

    /// Drop all queued words and forget every pending one.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let dropped = inner.words.len();
        inner.words.clear();
        inner.pending.clear();
        dropped
    }

    /// Words waiting in the queue
    pub fn len(&self) -> usize {
        self.lock().words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().words.is_empty()
    }

    /// Words queued or currently being typed
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, word: &Word) -> bool {
        self.lock().pending.contains(word)
    }

    /// Queued words in dispatch order
    pub fn snapshot(&self) -> Vec<Word> {
        self.lock().words.iter().cloned().collect()
    }
}
