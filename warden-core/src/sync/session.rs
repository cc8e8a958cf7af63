use std::collections::VecDeque;
use std::time::Instant;

/// Attempt bookkeeping for one process session
///
/// Only replaced by an explicit session reset, never by time.
#[derive(Debug, Clone)]
pub struct SyncSession {
    started_at: Instant,
    attempts_this_session: u32,
    last_sync_at: Option<Instant>,
    errors: VecDeque<String>,
    max_errors: usize,
}

impl SyncSession {
    pub fn new(started_at: Instant, max_errors: usize) -> Self {
        Self {
            started_at,
            attempts_this_session: 0,
            last_sync_at: None,
            errors: VecDeque::new(),
            max_errors,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn attempts(&self) -> u32 {
        self.attempts_this_session
    }

    pub fn last_sync_at(&self) -> Option<Instant> {
        self.last_sync_at
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(String::as_str)
    }

    pub fn budget_exhausted(&self, max_attempts: u32) -> bool {
        self.attempts_this_session >= max_attempts
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts_this_session = self.attempts_this_session.saturating_add(1);
    }

    pub(crate) fn record_success(&mut self, at: Instant) {
        self.last_sync_at = Some(at);
        self.errors.clear();
    }

    /// Append errors, dropping the oldest beyond the bound
    pub(crate) fn record_errors<I>(&mut self, errors: I)
    where
        I: IntoIterator<Item = String>,
    {
        for error in errors {
            self.errors.push_back(error);
        }
        while self.errors.len() > self.max_errors {
            self.errors.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget() {
        let mut session = SyncSession::new(Instant::now(), 5);
        for _ in 0..3 {
            session.record_attempt();
        }
        assert!(!session.budget_exhausted(4));
        session.record_attempt();
        assert!(session.budget_exhausted(4));
    }

    #[test]
    fn test_errors_are_bounded_and_cleared_on_success() {
        let mut session = SyncSession::new(Instant::now(), 3);
        session.record_errors((0..5).map(|i| format!("error {}", i)));

        let errors: Vec<_> = session.errors().collect();
        assert_eq!(errors, vec!["error 2", "error 3", "error 4"]);

        let now = Instant::now();
        session.record_success(now);
        assert_eq!(session.errors().count(), 0);
        assert_eq!(session.last_sync_at(), Some(now));
    }
}
