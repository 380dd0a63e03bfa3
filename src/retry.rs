//! Bounded retry counter shared by every network-facing phase.
//!
//! A budget with `limit = N` grants `N + 1` attempts: the first try plus
//! `N` retries.  The FSM engine re-arms the budget on every state entry,
//! so the bound is scoped to one visit of a phase, never to the device
//! lifetime.

/// Per-phase attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts: u32,
    limit: u32,
}

impl RetryBudget {
    pub const fn new(limit: u32) -> Self {
        Self { attempts: 0, limit }
    }

    /// Consume one attempt.  Returns `false` once the budget is spent.
    pub fn attempt(&mut self) -> bool {
        if self.attempts <= self.limit {
            self.attempts += 1;
            true
        } else {
            false
        }
    }

    /// Forget all attempts made so far.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// `true` once every granted attempt has been used.
    pub fn is_exhausted(&self) -> bool {
        self.attempts > self.limit
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
