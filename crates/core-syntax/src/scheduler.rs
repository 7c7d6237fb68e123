//! The scheduler and the `TokenizationEngine` it drives.
//!
//! Three entry points correspond to the three modes in spec 4.3:
//! `force_tokenization` (synchronous, up to a line number), `start_background`
//! / the idle callback loop it installs, and `tokenize_viewport` (a visible
//! window, with a synthetic-prefix heuristic when the frontier is far
//! behind the viewport).
//!
//! Single-threaded, no locks (spec 5): everything here is `Rc`/`RefCell`,
//! never `Arc`/`Mutex`. Suspension only happens inside `Host::request_idle_callback`
//! and `Host::schedule_zero_delay` boundaries.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::begin_state::BeginState;
use crate::buffer::TextSource;
use crate::cache::{Propagation, StateCache};
use crate::config::TokenizerEngineConfig;
use crate::error::{ErrorSink, TokenizeError};
use crate::host::{Host, IdleDeadline};
use crate::metrics::{CacheMetrics, MetricsSnapshot};
use crate::registry::{Token, Tokenizer, TokenizerRegistry};
use crate::tokenizer::SafeTokenizer;

/// Forwards to the engine's real sink while incrementing
/// [`CacheMetrics::record_tokenizer_failure`] for the two kinds `SafeTokenizer`
/// reports, so that counter reflects real failures without `SafeTokenizer`
/// itself needing to know about metrics.
struct MetricsSink<'a> {
    inner: &'a dyn ErrorSink,
    metrics: &'a CacheMetrics,
}

impl<'a> ErrorSink for MetricsSink<'a> {
    fn report(&self, error: TokenizeError) {
        if matches!(
            error,
            TokenizeError::TokenizerInitialisation { .. } | TokenizeError::TokenizerRuntime { .. }
        ) {
            self.metrics.record_tokenizer_failure();
        }
        self.inner.report(error);
    }
}

/// Drives tokenization of a buffer in all three modes. Owns the
/// `StateCache` and the bookkeeping (`scheduled`/`disposed` flags, last
/// known tokens per line) needed to answer queries about the engine's
/// current state.
pub struct TokenizationEngine<B: TextSource, H: Host> {
    buffer: Rc<RefCell<B>>,
    host: Rc<H>,
    registry: Rc<dyn TokenizerRegistry>,
    sink: Rc<dyn ErrorSink>,
    config: TokenizerEngineConfig,
    metrics: CacheMetrics,

    language_id: RefCell<String>,
    current_tokenizer: RefCell<Option<Arc<dyn Tokenizer>>>,
    cache: RefCell<StateCache>,
    last_tokens: RefCell<Vec<Vec<Token>>>,

    scheduled: Cell<bool>,
    disposed: Cell<bool>,
}

impl<B: TextSource + 'static, H: Host + 'static> TokenizationEngine<B, H> {
    pub fn new(
        buffer: Rc<RefCell<B>>,
        host: Rc<H>,
        registry: Rc<dyn TokenizerRegistry>,
        sink: Rc<dyn ErrorSink>,
        language_id: impl Into<String>,
        config: TokenizerEngineConfig,
    ) -> Rc<Self> {
        let engine = Rc::new(Self {
            buffer,
            host,
            registry,
            sink,
            config,
            metrics: CacheMetrics::default(),
            language_id: RefCell::new(language_id.into()),
            current_tokenizer: RefCell::new(None),
            cache: RefCell::new(StateCache::new(0, None)),
            last_tokens: RefCell::new(Vec::new()),
            scheduled: Cell::new(false),
            disposed: Cell::new(false),
        });
        engine.reset();
        engine
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn metrics_sink(&self) -> MetricsSink<'_> {
        MetricsSink {
            inner: self.sink.as_ref(),
            metrics: &self.metrics,
        }
    }

    pub fn invalid_frontier(&self) -> usize {
        self.cache.borrow().invalid_frontier()
    }

    pub fn is_fully_valid(&self) -> bool {
        self.cache.borrow().is_fully_valid()
    }

    pub fn dispose(&self) {
        self.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Re-resolve the tokenizer for the current language and rebuild the
    /// cache from scratch (spec 3.3: attach, language change, registry
    /// change, full flush all funnel through here).
    pub fn reset(&self) {
        let line_count = self.buffer.borrow().line_count();
        let total_bytes = self.buffer.borrow().total_byte_len();
        tracing::debug!(target: "syntax.lifecycle", line_count, total_bytes, "resetting cache");

        if total_bytes > MAX_BUFFER_BYTES {
            tracing::warn!(target: "syntax.lifecycle", total_bytes, limit = MAX_BUFFER_BYTES, "buffer too large, disabling tokenization");
            self.sink.report(crate::error::TokenizeError::BufferSizeExceeded {
                line_count,
            });
            *self.current_tokenizer.borrow_mut() = None;
            *self.cache.borrow_mut() = StateCache::new(line_count, None);
            self.last_tokens.borrow_mut().clear();
            self.last_tokens.borrow_mut().resize(line_count, Vec::new());
            return;
        }

        let tokenizer = self.registry.resolve(&self.language_id.borrow());
        *self.current_tokenizer.borrow_mut() = tokenizer.clone();

        let sink = self.metrics_sink();
        let safe = SafeTokenizer::new(tokenizer, &sink);
        let initial_state = safe.initial_state();

        *self.cache.borrow_mut() = StateCache::new(line_count, Some(initial_state));
        self.last_tokens.borrow_mut().clear();
        self.last_tokens.borrow_mut().resize(line_count, Vec::new());
    }

    /// Handle an incremental edit: `[start_line, end_line)` was replaced by
    /// `new_line_count` lines in the buffer (the caller is expected to have
    /// already applied the edit to the buffer itself).
    pub fn apply_edit(&self, start_line: usize, end_line: usize, new_line_count: usize) {
        tracing::trace!(target: "syntax.cache", start_line, end_line, new_line_count, "applying edit");
        self.cache
            .borrow_mut()
            .apply_edit(start_line, end_line, new_line_count);

        let mut tokens = self.last_tokens.borrow_mut();
        let start = start_line.min(tokens.len());
        let end = end_line.clamp(start, tokens.len());
        let replacement: Vec<Vec<Token>> = (0..new_line_count).map(|_| Vec::new()).collect();
        tokens.splice(start..end, replacement);
    }

    /// Run the tokenizer over one line against its currently cached begin
    /// state, recording the resulting tokens and returning the end state.
    /// Shared by both the authoritative and fake (viewport prefix) paths;
    /// callers decide how the result feeds back into the cache.
    fn run_tokenizer_at(&self, line_index: usize) -> Option<Box<dyn BeginState>> {
        let line_count = self.buffer.borrow().line_count();
        if line_index >= line_count {
            return None;
        }

        let begin_state = {
            let cache = self.cache.borrow();
            cache.get_begin_state(line_index).map(|s| s.clone_box())
        }?;

        let (line_text, has_eol) = {
            let buffer = self.buffer.borrow();
            (
                buffer.line_text(line_index).unwrap_or_default(),
                buffer.has_eol(line_index),
            )
        };

        let tokenizer = self.current_tokenizer.borrow().clone();
        let sink = self.metrics_sink();
        let safe = SafeTokenizer::new(tokenizer, &sink);
        let (tokens, end_state) = safe.tokenize(line_index, &line_text, has_eol, begin_state.as_ref());

        self.metrics.record_line_tokenized();
        if let Some(slot) = self.last_tokens.borrow_mut().get_mut(line_index) {
            *slot = tokens;
        }

        Some(end_state)
    }

    /// Tokenize exactly one line using its currently cached begin state,
    /// writing the result back into the cache via the authoritative
    /// propagation protocol. Returns the propagation outcome so callers can
    /// decide whether to keep walking forward.
    fn tokenize_line_at(&self, line_index: usize) -> Propagation {
        let Some(end_state) = self.run_tokenizer_at(line_index) else {
            return Propagation::EndOfBuffer;
        };
        let buffer_line_count = self.buffer.borrow().line_count();
        let outcome = self
            .cache
            .borrow_mut()
            .set_end_state(buffer_line_count, line_index, end_state);
        if outcome == Propagation::SkippedAhead {
            self.metrics.record_skip_ahead();
        }
        outcome
    }

    /// Tokenize `line_index` against `begin_state` purely to derive its end
    /// state; discards tokens and touches neither the cache nor
    /// `last_tokens`. `has_eol` is always `false`, matching the synthetic
    /// prefix's own tokenization contract (spec 4.3.3 step 4) rather than
    /// the buffer's real line terminator.
    fn tokenize_for_state_only(
        &self,
        line_index: usize,
        begin_state: &dyn BeginState,
    ) -> Box<dyn BeginState> {
        let line_text = self.buffer.borrow().line_text(line_index).unwrap_or_default();
        let tokenizer = self.current_tokenizer.borrow().clone();
        let sink = self.metrics_sink();
        let safe = SafeTokenizer::new(tokenizer, &sink);
        let (_tokens, end_state) = safe.tokenize(line_index, &line_text, false, begin_state);
        end_state
    }

    /// Tokenize one line for the viewport's provisional prefix pass: the
    /// result is written back so downstream fake lines can keep chaining,
    /// but the frontier never advances and the line is left marked invalid
    /// (spec 4.3.3's fake-token marking).
    fn fake_tokenize_line_at(&self, line_index: usize) {
        if let Some(end_state) = self.run_tokenizer_at(line_index) {
            self.cache
                .borrow_mut()
                .set_end_state_fake(line_index, end_state);
        }
    }

    /// Synchronously tokenize every line up to (but not including)
    /// `up_to_line`, re-checking `invalid_frontier` after each step so the
    /// skip-ahead optimisation can shortcut the walk (spec 4.3.2).
    /// Idempotent: calling it again with the same or smaller bound is a
    /// no-op.
    pub fn force_tokenization(&self, up_to_line: usize) {
        let line_count = self.buffer.borrow().line_count();
        let target = up_to_line.min(line_count);
        loop {
            if self.disposed.get() {
                self.sink
                    .report(crate::error::TokenizeError::DisposedAfterSuspension);
                return;
            }
            let frontier = self.cache.borrow().invalid_frontier();
            if frontier >= target {
                return;
            }
            self.tokenize_line_at(frontier);
        }
    }

    /// Begin (or continue) background tokenization. A no-op if already
    /// scheduled or if the cache is already fully valid.
    pub fn start_background(self: &Rc<Self>) {
        if self.scheduled.get() || self.is_fully_valid() || self.disposed.get() {
            return;
        }
        tracing::trace!(target: "syntax.scheduler", "starting background walk");
        self.scheduled.set(true);
        self.schedule_next_slice();
    }

    fn schedule_next_slice(self: &Rc<Self>) {
        let engine = self.clone();
        self.host
            .request_idle_callback(Box::new(move |deadline: &dyn IdleDeadline| {
                engine.run_background_slice(deadline);
            }));
    }

    /// Entry point for one idle window: compute its end time from the
    /// deadline granted and hand off to [`run_burst`](Self::run_burst), which
    /// does the actual tokenize/yield cycling (spec 4.3.1 steps 1-2).
    fn run_background_slice(self: Rc<Self>, deadline: &dyn IdleDeadline) {
        if self.disposed.get() {
            self.sink
                .report(crate::error::TokenizeError::DisposedAfterSuspension);
            self.scheduled.set(false);
            return;
        }
        self.metrics.record_slice();
        let end_time = Instant::now() + deadline.time_remaining();
        self.run_burst(end_time);
    }

    /// Tokenize for roughly one burst (`background_slice_budget_millis`,
    /// checking disposal before each line), then decide how to continue
    /// (spec 4.3.1 steps 3-5): stop if done or disposed, otherwise yield
    /// within the *same* idle window via a zero-delay continuation while
    /// `end_time` hasn't passed, and only request a brand new idle window
    /// once it has.
    fn run_burst(self: Rc<Self>, end_time: Instant) {
        let burst = Duration::from_millis(self.config.background_slice_budget_millis);
        let line_count = self.buffer.borrow().line_count();
        let burst_start = Instant::now();

        loop {
            if self.disposed.get() {
                self.sink
                    .report(crate::error::TokenizeError::DisposedAfterSuspension);
                self.scheduled.set(false);
                return;
            }
            if self.cache.borrow().invalid_frontier() >= line_count {
                break;
            }
            let frontier = self.cache.borrow().invalid_frontier();
            self.tokenize_line_at(frontier);
            if burst_start.elapsed() > burst {
                break;
            }
        }

        if self.is_fully_valid() {
            tracing::debug!(target: "syntax.scheduler", "background walk complete");
            self.scheduled.set(false);
            return;
        }

        if Instant::now() < end_time {
            let engine = self.clone();
            self.host.schedule_zero_delay(Box::new(move || {
                engine.run_burst(end_time);
            }));
        } else {
            self.schedule_next_slice();
        }
    }

    /// Whether `line_index` can be tokenized synchronously without walking
    /// the whole frontier forward: either it's already valid, or short
    /// enough that doing it now is cheap regardless (spec 6).
    pub fn is_cheap_to_tokenize(&self, line_index: usize) -> bool {
        if self.cache.borrow().is_valid(line_index) {
            return true;
        }
        let len = self
            .buffer
            .borrow()
            .line_text(line_index)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        len <= self.config.cheap_tokenization_threshold
    }

    /// The scope of the token that covers `byte_offset` on `line_index` as
    /// of the last time that line was tokenized.
    pub fn token_scope_at(&self, line_index: usize, byte_offset: usize) -> Option<String> {
        self.last_tokens
            .borrow()
            .get(line_index)?
            .iter()
            .find(|t| t.start <= byte_offset && byte_offset < t.end)
            .map(|t| t.scope.clone())
    }

    /// `getStandardTokenTypeIfInsertingCharacter` (spec 6): tokenize a
    /// synthetic copy of `line_index` with `ch` spliced in at `byte_offset`,
    /// using the line's currently cached begin state, and return the scope
    /// of the token covering the inserted character. Used to classify what a
    /// character typed at the caret would sit inside (e.g. to decide whether
    /// auto-closing a bracket is appropriate) without disturbing the real
    /// cache: nothing here is written back to `last_tokens` or the cache.
    pub fn token_type_for_inserted_char(
        &self,
        line_index: usize,
        byte_offset: usize,
        ch: char,
    ) -> Option<String> {
        let begin_state = {
            let cache = self.cache.borrow();
            cache.get_begin_state(line_index).map(|s| s.clone_box())
        }?;
        let original = self.buffer.borrow().line_text(line_index)?;
        let split = byte_offset.min(original.len());
        let mut synthetic = String::with_capacity(original.len() + ch.len_utf8());
        synthetic.push_str(&original[..split]);
        synthetic.push(ch);
        synthetic.push_str(&original[split..]);

        let has_eol = self.buffer.borrow().has_eol(line_index);
        let tokenizer = self.current_tokenizer.borrow().clone();
        let sink = self.metrics_sink();
        let safe = SafeTokenizer::new(tokenizer, &sink);
        let (tokens, _end_state) =
            safe.tokenize(line_index, &synthetic, has_eol, begin_state.as_ref());

        tokens
            .into_iter()
            .find(|t| t.start <= split && split < t.end)
            .map(|t| t.scope)
    }

    /// Tokenize a visible window `[first_line, last_line]`, prioritising it
    /// ahead of the background walk. If the cache's frontier is already at
    /// or past `first_line` this is just a forced range; otherwise there is
    /// a gap between the frontier and the viewport, so a synthetic prefix is
    /// derived first (spec 4.3.3 steps 3-4) to seed a plausible begin state
    /// for `first_line`, then the visible range itself is fake-tokenized
    /// (step 5).
    pub fn tokenize_viewport(&self, first_line: usize, last_line: usize) {
        let line_count = self.buffer.borrow().line_count();
        let last_line = last_line.min(line_count.saturating_sub(1));
        if first_line > last_line {
            return;
        }

        let frontier = self.cache.borrow().invalid_frontier();
        if last_line < frontier {
            return;
        }
        if first_line <= frontier {
            self.force_tokenization(last_line + 1);
            return;
        }

        let (anchor_state, prefix_lines) = self.build_synthetic_prefix(first_line);
        let mut state = anchor_state;
        for line in prefix_lines {
            state = self.tokenize_for_state_only(line, state.as_ref());
        }
        self.cache.borrow_mut().seed_begin_state(first_line, state);

        for i in first_line..=last_line {
            self.fake_tokenize_line_at(i);
        }
    }

    /// Spec 4.3.3 step 3: walk backward from `first_line`, collecting lines
    /// whose indentation strictly decreases from the last collected anchor,
    /// skipping (not collecting) zero-indentation lines, until a line with a
    /// cached begin state is found or the top of the buffer is reached.
    /// Returns the state to seed `first_line` with (the found cached state,
    /// or the tokenizer's initial state if none was found) and the collected
    /// lines in top-down order, ready to be walked forward in step 4.
    fn build_synthetic_prefix(&self, first_line: usize) -> (Box<dyn BeginState>, Vec<usize>) {
        let mut anchor_indent = usize::MAX;
        let mut collected = Vec::new();
        let mut cursor = first_line;
        let mut found_state = None;

        while cursor > 0 {
            cursor -= 1;
            if let Some(state) = self.cache.borrow().get_begin_state(cursor) {
                found_state = Some(state.clone_box());
                break;
            }
            let indent = self.buffer.borrow().indent_column(cursor);
            if indent == 0 {
                continue;
            }
            if indent < anchor_indent {
                collected.push(cursor);
                anchor_indent = indent;
            }
        }
        collected.reverse();

        let anchor_state = found_state.unwrap_or_else(|| {
            let tokenizer = self.current_tokenizer.borrow().clone();
            let sink = self.metrics_sink();
            SafeTokenizer::new(tokenizer, &sink).initial_state()
        });
        (anchor_state, collected)
    }
}

/// Buffers larger than this are never tokenized (spec 6's buffer-size
/// guard); the engine falls back to a permanently null cache instead.
const MAX_BUFFER_BYTES: usize = 50 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VecTextSource;
    use crate::error::RecordingErrorSink;
    use crate::host::ManualHost;
    use crate::registry::NullTokenizer;

    struct EchoRegistry;
    impl TokenizerRegistry for EchoRegistry {
        fn resolve(&self, _language_id: &str) -> Option<Arc<dyn Tokenizer>> {
            Some(Arc::new(NullTokenizer))
        }
    }

    fn make_engine(
        lines: &[&str],
    ) -> Rc<TokenizationEngine<VecTextSource, ManualHost>> {
        let buffer = Rc::new(RefCell::new(VecTextSource::new(
            lines.iter().map(|s| s.to_string()).collect(),
            true,
        )));
        let host = ManualHost::new();
        let registry: Rc<dyn TokenizerRegistry> = Rc::new(EchoRegistry);
        let sink: Rc<dyn ErrorSink> = Rc::new(RecordingErrorSink::default());
        TokenizationEngine::new(buffer, host, registry, sink, "toy", TokenizerEngineConfig::default())
    }

    #[test]
    fn force_tokenization_advances_frontier_and_is_idempotent() {
        let engine = make_engine(&["a", "b", "c"]);
        engine.force_tokenization(2);
        assert!(engine.invalid_frontier() >= 2);
        let frontier_after_first = engine.invalid_frontier();
        engine.force_tokenization(2);
        assert_eq!(engine.invalid_frontier(), frontier_after_first);
    }

    #[test]
    fn force_tokenization_to_end_marks_fully_valid() {
        let engine = make_engine(&["a", "b", "c"]);
        engine.force_tokenization(3);
        assert!(engine.is_fully_valid());
    }

    #[test]
    fn apply_edit_then_reforce_recovers_validity() {
        let engine = make_engine(&["a", "b", "c"]);
        engine.force_tokenization(3);
        engine.apply_edit(1, 2, 1);
        assert!(!engine.is_fully_valid());
        engine.force_tokenization(3);
        assert!(engine.is_fully_valid());
    }

    #[test]
    fn background_slice_eventually_completes() {
        let buffer = Rc::new(RefCell::new(VecTextSource::new(
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            true,
        )));
        let host = ManualHost::new();
        let registry: Rc<dyn TokenizerRegistry> = Rc::new(EchoRegistry);
        let sink: Rc<dyn ErrorSink> = Rc::new(RecordingErrorSink::default());
        let engine = TokenizationEngine::new(
            buffer,
            host.clone(),
            registry,
            sink,
            "toy",
            TokenizerEngineConfig::default(),
        );

        engine.start_background();
        for _ in 0..20 {
            host.pump_idle(Duration::from_millis(5));
            host.pump_zero_delay();
            if engine.is_fully_valid() {
                break;
            }
        }
        assert!(engine.is_fully_valid());
    }

    #[test]
    fn is_cheap_to_tokenize_short_line_true_before_tokenizing() {
        let engine = make_engine(&["short"]);
        assert!(engine.is_cheap_to_tokenize(0));
    }

    #[test]
    fn token_scope_at_returns_none_before_tokenizing() {
        let engine = make_engine(&["abc"]);
        assert_eq!(engine.token_scope_at(0, 0), None);
        engine.force_tokenization(1);
        assert_eq!(engine.token_scope_at(0, 0), Some("text.plain".to_string()));
    }

    #[test]
    fn viewport_tokenizes_requested_window() {
        let engine = make_engine(&["a", "b", "c", "d", "e"]);
        engine.tokenize_viewport(2, 3);
        assert!(engine.token_scope_at(2, 0).is_some());
        assert!(engine.token_scope_at(3, 0).is_some());
    }

    #[test]
    fn insertion_probe_does_not_mutate_cache_or_last_tokens() {
        let engine = make_engine(&["abc"]);
        engine.force_tokenization(1);
        let before = engine.token_scope_at(0, 0);

        let probed = engine.token_type_for_inserted_char(0, 1, 'X');
        assert_eq!(probed, Some("text.plain".to_string()));
        assert_eq!(engine.token_scope_at(0, 0), before);
        assert!(engine.is_fully_valid());
    }

    #[test]
    fn insertion_probe_without_cached_state_returns_none() {
        let engine = make_engine(&["abc"]);
        assert_eq!(engine.token_type_for_inserted_char(5, 0, 'X'), None);
    }
}
