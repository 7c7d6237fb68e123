//! The minimal text-source interface the engine needs from a buffer.
//!
//! The buffer's own storage, editing primitives, and rope internals are out
//! of scope here (see crate `core-text`); this trait is the narrow seam the
//! engine reads through, so it can be driven by a real `core_text::Buffer`
//! or, in tests, by a plain `Vec<String>`.

/// Read-only view over the lines of text being tokenized.
pub trait TextSource {
    fn line_count(&self) -> usize;

    /// Line content *without* a trailing newline, or `None` if out of range.
    fn line_text(&self, idx: usize) -> Option<String>;

    /// Whether the line is terminated by a newline in the underlying
    /// buffer. False for the final line of a buffer with no trailing
    /// newline; the tokenizer contract (spec 4.2) passes this through
    /// unchanged.
    fn has_eol(&self, idx: usize) -> bool;

    /// Leading whitespace count, used by the viewport synthetic-prefix
    /// heuristic (spec 4.3.3).
    fn indent_column(&self, idx: usize) -> usize;

    /// Total byte length of the buffer's content, used by
    /// `is_cheap_to_tokenize` and the buffer-size-exceeded check.
    fn total_byte_len(&self) -> usize;
}

impl TextSource for core_text::Buffer {
    fn line_count(&self) -> usize {
        core_text::Buffer::line_count(self)
    }

    fn line_text(&self, idx: usize) -> Option<String> {
        let mut s = core_text::Buffer::line(self, idx)?;
        if s.ends_with('\n') {
            s.pop();
        }
        Some(s)
    }

    fn has_eol(&self, idx: usize) -> bool {
        core_text::Buffer::line(self, idx)
            .map(|s| s.ends_with('\n'))
            .unwrap_or(false)
    }

    fn indent_column(&self, idx: usize) -> usize {
        core_text::Buffer::indent_column(self, idx)
    }

    fn total_byte_len(&self) -> usize {
        (0..core_text::Buffer::line_count(self))
            .map(|i| core_text::Buffer::line_byte_len(self, i))
            .sum()
    }
}

/// A trivial in-memory text source used throughout the test suite, so
/// scenario tests don't need a real rope.
#[derive(Debug, Clone, Default)]
pub struct VecTextSource {
    lines: Vec<String>,
    trailing_eol: bool,
}

impl VecTextSource {
    pub fn new(lines: Vec<String>, trailing_eol: bool) -> Self {
        Self {
            lines,
            trailing_eol,
        }
    }

    pub fn set_line(&mut self, idx: usize, text: impl Into<String>) {
        if idx < self.lines.len() {
            self.lines[idx] = text.into();
        }
    }

    pub fn splice(&mut self, start: usize, end: usize, replacement: Vec<String>) {
        self.lines.splice(start..end, replacement);
    }
}

impl TextSource for VecTextSource {
    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_text(&self, idx: usize) -> Option<String> {
        self.lines.get(idx).cloned()
    }

    fn has_eol(&self, idx: usize) -> bool {
        if idx + 1 < self.lines.len() {
            true
        } else if idx + 1 == self.lines.len() {
            self.trailing_eol
        } else {
            false
        }
    }

    fn indent_column(&self, idx: usize) -> usize {
        self.lines
            .get(idx)
            .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').count())
            .unwrap_or(0)
    }

    fn total_byte_len(&self) -> usize {
        self.lines.iter().map(|l| l.len()).sum()
    }
}
