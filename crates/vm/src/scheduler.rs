//! Cooperative scheduling state: the background run queue and the event
//! handler registry.
//!
//! This is a passive container. Running a queued action or dispatching an
//! event needs the heap and the interpreter, so those operations live on
//! [`crate::machine::Vm`] (`pump`, `raise_event`); the scheduler only
//! records which action words are pending and which handler is bound to
//! each event id. Reference-count ownership of the stored words also
//! belongs to the `Vm` methods that put them here.

use minibit_common::Word;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<Word>,
    handlers: HashMap<i32, Word>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action to the background run queue.
    pub fn enqueue(&mut self, action: Word) {
        self.queue.push_back(action);
    }

    /// Take the next queued action, FIFO order.
    pub fn dequeue(&mut self) -> Option<Word> {
        self.queue.pop_front()
    }

    /// Number of actions waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Bind `action` as the handler for `event`, returning the previous
    /// binding (whose reference the caller must release).
    pub fn set_handler(&mut self, event: i32, action: Word) -> Option<Word> {
        self.handlers.insert(event, action)
    }

    /// The handler currently bound to `event`.
    pub fn handler(&self, event: i32) -> Option<Word> {
        self.handlers.get(&event).copied()
    }
}
