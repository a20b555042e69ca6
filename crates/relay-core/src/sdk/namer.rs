use std::sync::atomic::{AtomicU64, Ordering};

/// Source of step names and message ids for one execution of a handler.
///
/// Names must depend only on call order so that re-executing the handler
/// yields the same sequence.
pub trait StepNamer: Send + Sync {
    fn next_name(&self, prefix: &str) -> String;
}

/// `relay-{prefix}-{n}` with a single counter shared by all prefixes,
/// starting at 0.
#[derive(Debug, Default)]
pub struct CounterNamer {
    counter: AtomicU64,
}

impl CounterNamer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepNamer for CounterNamer {
    fn next_name(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("relay-{prefix}-{n}")
    }
}
