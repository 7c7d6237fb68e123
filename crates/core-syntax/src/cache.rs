//! The per-line tokenization state cache.
//!
//! Mirrors the structure (and much of the shape) of xi-editor's
//! `plugin_lib::state_cache::StateCache`, adapted to a single
//! `invalid_frontier` cursor rather than a frontier stack, since this
//! engine tracks exactly one background pass at a time.

use crate::begin_state::BeginState;

/// `(begin state, valid bit)` for a single line.
#[derive(Debug)]
struct LineEntry {
    begin_state: Option<Box<dyn BeginState>>,
    valid: bool,
}

impl LineEntry {
    fn empty() -> Self {
        Self {
            begin_state: None,
            valid: false,
        }
    }
}

/// Outcome of [`StateCache::set_end_state`]: tells the caller whether the
/// skip-ahead optimisation kicked in, i.e. whether the scheduler can stop
/// walking forward because downstream lines are already known valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The next line's begin state changed (or was previously unset); it and
    /// everything after it must be considered invalid again.
    Invalidated,
    /// The next line's begin state is unchanged and was already valid;
    /// nothing downstream needs re-tokenizing.
    SkippedAhead,
    /// There is no next line (end of buffer).
    EndOfBuffer,
}

/// Per-line begin-state cache with a single invalid frontier cursor.
#[derive(Debug)]
pub struct StateCache {
    lines: Vec<LineEntry>,
    invalid_frontier: usize,
}

impl StateCache {
    /// Build an empty cache sized for `line_count` lines, entry 0 seeded
    /// with `initial_state` (invariant 3.2.3). `initial_state` is `None`
    /// when no tokenizer is installed for the buffer's language.
    pub fn new(line_count: usize, initial_state: Option<Box<dyn BeginState>>) -> Self {
        let mut lines: Vec<LineEntry> = (0..line_count).map(|_| LineEntry::empty()).collect();
        if let Some(first) = lines.first_mut() {
            first.begin_state = initial_state;
        }
        Self {
            lines,
            invalid_frontier: 0,
        }
    }

    /// Reset to the empty, all-invalid state (spec 3.3: engine attach,
    /// language change, tokenizer-registration change, full buffer flush).
    pub fn flush(&mut self, line_count: usize, initial_state: Option<Box<dyn BeginState>>) {
        *self = Self::new(line_count, initial_state);
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn invalid_frontier(&self) -> usize {
        self.invalid_frontier
    }

    /// True once every line is known valid.
    pub fn is_fully_valid(&self) -> bool {
        self.invalid_frontier >= self.lines.len()
    }

    /// Begin state to feed into `line_index`, if the cache has one cached.
    /// The frontier is not consulted here; callers check
    /// `invalid_frontier` themselves to decide whether a line is safe to
    /// skip.
    pub fn get_begin_state(&self, line_index: usize) -> Option<&dyn BeginState> {
        self.lines
            .get(line_index)
            .and_then(|e| e.begin_state.as_deref())
    }

    pub fn is_valid(&self, line_index: usize) -> bool {
        self.lines.get(line_index).map(|e| e.valid).unwrap_or(false)
    }

    /// Record that `line_index` has been tokenized and produced `end_state`
    /// as the state flowing into `line_index + 1`. Implements the
    /// propagation protocol (spec 4.1): the current line is marked valid;
    /// the next line's begin state is compared against `end_state` and only
    /// overwritten (invalidating everything downstream, by advancing the
    /// frontier no further than `line_index + 1`) if it differs.
    ///
    /// `buffer_line_count` is the live buffer's current line count, not
    /// `self.line_count()`: invariant 3.2.5 allows the two to diverge
    /// transiently between an edit landing on the buffer and the cache
    /// catching up on the next scheduler tick, and "end of buffer" must be
    /// judged against the former.
    pub fn set_end_state(
        &mut self,
        buffer_line_count: usize,
        line_index: usize,
        end_state: Box<dyn BeginState>,
    ) -> Propagation {
        if let Some(entry) = self.lines.get_mut(line_index) {
            entry.valid = true;
        }
        if line_index + 1 >= self.invalid_frontier {
            self.invalid_frontier = line_index + 1;
        }

        let next_index = line_index + 1;
        if next_index >= buffer_line_count {
            return Propagation::EndOfBuffer;
        }
        if next_index >= self.lines.len() {
            // The cache hasn't been resized to match the buffer yet; there is
            // nothing to propagate into until the pending edit is spliced in.
            return Propagation::Invalidated;
        }

        let unchanged = self.lines[next_index]
            .begin_state
            .as_deref()
            .map(|existing| existing.equals(end_state.as_ref()))
            .unwrap_or(false);

        if unchanged && self.lines[next_index].valid {
            self.invalid_frontier = self.invalid_frontier.max(next_index + 1);
            Propagation::SkippedAhead
        } else {
            self.lines[next_index].begin_state = Some(end_state);
            self.lines[next_index].valid = false;
            self.invalid_frontier = next_index;
            Propagation::Invalidated
        }
    }

    /// Directly set a line's begin state without going through the
    /// propagation protocol, used by the viewport synthetic-prefix
    /// heuristic to (re)seed a restart point the normal forward walk hasn't
    /// reached yet. Always overwrites, since the heuristic recomputes the
    /// anchor state fresh on every call. Does not touch the frontier or the
    /// valid bit.
    pub fn seed_begin_state(&mut self, line_index: usize, state: Box<dyn BeginState>) {
        if let Some(entry) = self.lines.get_mut(line_index) {
            entry.begin_state = Some(state);
        }
    }

    /// Mark a line's tokens as provisional (viewport synthetic-prefix mode):
    /// the line keeps whatever begin state it has but is never treated as
    /// having advanced the frontier.
    pub fn mark_fake(&mut self, line_index: usize) {
        if let Some(entry) = self.lines.get_mut(line_index) {
            entry.valid = false;
        }
    }

    /// Like [`set_end_state`](Self::set_end_state) but for provisional
    /// (viewport synthetic-prefix) tokenization: propagates `end_state` to
    /// the next line so fake tokenization can keep chaining forward, but
    /// never advances `invalid_frontier` and leaves the current line
    /// marked invalid, since none of this is authoritative background
    /// progress.
    pub fn set_end_state_fake(&mut self, line_index: usize, end_state: Box<dyn BeginState>) {
        if let Some(entry) = self.lines.get_mut(line_index) {
            entry.valid = false;
        }
        if let Some(next) = self.lines.get_mut(line_index + 1) {
            if next.begin_state.is_none() {
                next.begin_state = Some(end_state);
            }
        }
    }

    /// Apply a text edit spanning `[start_line, end_line)` replaced by
    /// `new_line_count` lines. Invalidates the edited region first, then
    /// splices the entry vector, matching the order called out in spec 4.1
    /// (invalidate-then-splice): downstream entries must not be read as
    /// valid while the splice is in flight.
    pub fn apply_edit(&mut self, start_line: usize, end_line: usize, new_line_count: usize) {
        let start_line = start_line.min(self.lines.len());
        let end_line = end_line.clamp(start_line, self.lines.len());

        for entry in &mut self.lines[start_line..end_line] {
            entry.valid = false;
        }

        // The begin state flowing into `start_line` comes from the
        // untouched line before it and is still correct; only what it
        // produces needs re-tokenizing. Carry it across the splice so the
        // replacement's first entry isn't left with no begin state at all
        // (which would otherwise stall the scheduler: there would be
        // nothing cached to feed the tokenizer for that line).
        let carried_begin_state = self.lines.get_mut(start_line).and_then(|e| e.begin_state.take());

        let mut replacement: Vec<LineEntry> = (0..new_line_count).map(|_| LineEntry::empty()).collect();
        if let Some(first) = replacement.first_mut() {
            first.begin_state = carried_begin_state;
        }
        self.lines.splice(start_line..end_line, replacement);

        self.invalid_frontier = self.invalid_frontier.min(start_line);
    }
}
