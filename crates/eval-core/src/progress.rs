//! Progress State Machine (C8, spec §4.8). Generalizes the teacher's bare
//! `report::progress::{ProgressEvent, ProgressSink}` (a plain done/total
//! callback) into the full typed state/event machine the spec names.

use eval_common::{GradingResult, TokenUsage};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Initialized,
    EvaluatingRunning,
    EvaluatingSharing,
    Completed,
    Results,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalPhase {
    Initializing,
    Evaluating,
    Completed,
    Error,
}

/// One completed work item's contribution to the aggregate tallies (spec
/// glossary: "Progress delta").
#[derive(Debug, Clone)]
pub struct ProgressDelta {
    pub provider_id: String,
    pub passed: bool,
    pub errored: bool,
    pub tokens: TokenUsage,
    pub cost: f64,
}

impl ProgressDelta {
    pub fn from_result(provider_id: impl Into<String>, result: &GradingResult, errored: bool) -> Self {
        Self {
            provider_id: provider_id.into(),
            passed: result.pass,
            errored,
            tokens: result.tokens_used,
            cost: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    pub tokens: TokenUsage,
    pub cost: f64,
    pub completed: bool,
}

/// A bounded FIFO ring buffer; oldest entries evicted first on overflow
/// (spec §4.8's invariant on `errors`/`logs`).
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
}

/// The state machine itself. A single owner drives it (spec §5: "serialized
/// by a single event loop; workers enqueue events non-blockingly"); in
/// this translation that owner is whichever task calls `apply`, typically
/// the scheduler's coordinator.
#[derive(Debug)]
pub struct ProgressMachine {
    state: State,
    total_tests: usize,
    completed: usize,
    passed_tests: u64,
    failed_tests: u64,
    error_count: u64,
    total_cost: f64,
    total_tokens: TokenUsage,
    total_requests: u64,
    per_provider: HashMap<String, ProviderStats>,
    errors: RingBuffer<String>,
    logs: RingBuffer<LogEntry>,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    cancelled: bool,
    ring_capacity: usize,
}

impl ProgressMachine {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            state: State::Idle,
            total_tests: 0,
            completed: 0,
            passed_tests: 0,
            failed_tests: 0,
            error_count: 0,
            total_cost: 0.0,
            total_tokens: TokenUsage::default(),
            total_requests: 0,
            per_provider: HashMap::new(),
            errors: RingBuffer::new(ring_capacity),
            logs: RingBuffer::new(ring_capacity),
            start_time: None,
            end_time: None,
            cancelled: false,
            ring_capacity,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// `INIT(providers, totalTests, concurrency)`.
    pub fn init(&mut self, provider_ids: &[String], total_tests: usize) {
        self.total_tests = total_tests;
        for id in provider_ids {
            self.per_provider.entry(id.clone()).or_default();
        }
        self.state = State::Initialized;
    }

    /// `START`. A no-op from `Idle`; the state machine must first be
    /// `INIT`ialized (spec §4.8 invariant).
    pub fn start(&mut self) {
        if self.state == State::Idle {
            return;
        }
        self.start_time = Some(Instant::now());
        self.state = State::EvaluatingRunning;
    }

    pub fn set_sharing(&mut self, sharing: bool) {
        if matches!(self.state, State::EvaluatingRunning | State::EvaluatingSharing) {
            self.state = if sharing {
                State::EvaluatingSharing
            } else {
                State::EvaluatingRunning
            };
        }
    }

    /// `PROGRESS(delta)`.
    pub fn progress(&mut self, delta: ProgressDelta) {
        self.apply_one(delta);
    }

    /// `BATCH_PROGRESS(delta[])`; atomic: either every delta applies or
    /// none do. Since `apply_one` cannot fail, atomicity holds trivially
    /// by construction, but the batch is still a single method so callers
    /// cannot observe a partially-applied batch.
    pub fn batch_progress(&mut self, deltas: Vec<ProgressDelta>) {
        for delta in deltas {
            self.apply_one(delta);
        }
    }

    fn apply_one(&mut self, delta: ProgressDelta) {
        self.completed += 1;
        self.total_requests += 1;
        self.total_cost += delta.cost;
        self.total_tokens = self.total_tokens + delta.tokens;

        let stats = self.per_provider.entry(delta.provider_id.clone()).or_default();
        stats.tokens = stats.tokens + delta.tokens;
        stats.cost += delta.cost;

        if delta.errored {
            self.error_count += 1;
            stats.errors += 1;
        } else if delta.passed {
            self.passed_tests += 1;
            stats.passed += 1;
        } else {
            self.failed_tests += 1;
            stats.failed += 1;
        }
    }

    /// `UPDATE_TOKENS(providerId, tokens)`.
    pub fn update_tokens(&mut self, provider_id: &str, tokens: TokenUsage) {
        self.total_tokens = self.total_tokens + tokens;
        let stats = self.per_provider.entry(provider_id.to_string()).or_default();
        stats.tokens = stats.tokens + tokens;
    }

    /// `ADD_ERROR(error)`.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// `ADD_LOG(entry)`.
    pub fn add_log(&mut self, level: impl Into<String>, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level: level.into(),
            message: message.into(),
        });
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// `COMPLETE(passed, failed, errors)`; marks every provider completed.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
        for stats in self.per_provider.values_mut() {
            stats.completed = true;
        }
        self.state = State::Completed;
    }

    pub fn show_results(&mut self) {
        if self.state == State::Completed {
            self.state = State::Results;
        }
    }

    pub fn fatal_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
        self.state = State::Error;
    }

    pub fn elapsed(&self) -> Duration {
        match self.start_time {
            Some(start) => self.end_time.unwrap_or_else(Instant::now) - start,
            None => Duration::ZERO,
        }
    }

    pub fn eval_phase(&self) -> EvalPhase {
        match self.state {
            State::Idle | State::Initialized => EvalPhase::Initializing,
            State::EvaluatingRunning | State::EvaluatingSharing => EvalPhase::Evaluating,
            State::Completed | State::Results => EvalPhase::Completed,
            State::Error => EvalPhase::Error,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_tests == 0 {
            0.0
        } else {
            (100.0 * self.completed as f64 / self.total_tests as f64).min(100.0)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn per_provider(&self) -> &HashMap<String, ProviderStats> {
        &self.per_provider
    }

    /// Checks the cross-cutting invariant that aggregate counters equal the
    /// sum of per-provider counters; used by tests, not the hot path.
    pub fn counters_consistent(&self) -> bool {
        let (passed, failed, errors): (u64, u64, u64) = self
            .per_provider
            .values()
            .fold((0, 0, 0), |(p, f, e), s| (p + s.passed, f + s.failed, e + s.errors));
        passed == self.passed_tests && failed == self.failed_tests && errors == self.error_count
    }

    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity
    }

    pub fn errors(&self) -> &RingBuffer<String> {
        &self.errors
    }

    pub fn logs(&self) -> &RingBuffer<LogEntry> {
        &self.logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{GradingResult};

    fn delta(provider: &str, passed: bool) -> ProgressDelta {
        ProgressDelta::from_result(provider, &GradingResult::leaf(passed, if passed { 1.0 } else { 0.0 }, "x"), false)
    }

    #[test]
    fn start_from_idle_is_a_no_op() {
        let mut m = ProgressMachine::new(10);
        m.start();
        assert_eq!(m.state(), State::Idle);
    }

    #[test]
    fn complete_marks_every_provider_completed() {
        let mut m = ProgressMachine::new(10);
        m.init(&["a".to_string(), "b".to_string()], 2);
        m.start();
        m.progress(delta("a", true));
        m.progress(delta("b", false));
        m.complete();
        assert!(m.per_provider().values().all(|s| s.completed));
        assert_eq!(m.state(), State::Completed);
    }

    #[test]
    fn aggregate_counters_match_per_provider_sum() {
        let mut m = ProgressMachine::new(10);
        m.init(&["a".to_string()], 3);
        m.start();
        m.batch_progress(vec![delta("a", true), delta("a", false), delta("a", true)]);
        assert!(m.counters_consistent());
        assert_eq!(m.passed_tests, 2);
        assert_eq!(m.failed_tests, 1);
    }

    #[test]
    fn ring_buffer_evicts_oldest_on_overflow() {
        let mut buf = RingBuffer::new(2);
        buf.push(1);
        buf.push(2);
        buf.push(3);
        let items: Vec<_> = buf.iter().copied().collect();
        assert_eq!(items, vec![2, 3]);
    }

    #[test]
    fn progress_percent_is_zero_with_no_total() {
        let m = ProgressMachine::new(10);
        assert_eq!(m.progress_percent(), 0.0);
    }
}
