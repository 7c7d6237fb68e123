//! Tokenizer and registry interfaces (spec 6): the engine resolves a
//! language id to a `Tokenizer` once per lifecycle event and otherwise
//! treats the registry as a passive change source.

use std::sync::Arc;

use crate::begin_state::BeginState;

/// A single emitted token. `start`/`end` are byte offsets within the line
/// that produced them; `scope` is an opaque classification string (e.g.
/// `"keyword.control"`) this engine never interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub scope: String,
}

/// A line-oriented tokenizer for one language.
pub trait Tokenizer: Send + Sync {
    /// The begin state fed into the buffer's first line.
    fn initial_state(&self) -> anyhow::Result<Box<dyn BeginState>>;

    /// Tokenize a single line. `has_eol` and `state` are passed through
    /// unchanged from the caller (spec 4.2). Implementations need not
    /// ensure `end.end_offset` of the last token equals `line.len()`;
    /// `SafeTokenizer` normalises that.
    fn tokenize(
        &self,
        line: &str,
        has_eol: bool,
        state: &dyn BeginState,
    ) -> anyhow::Result<(Vec<Token>, Box<dyn BeginState>)>;
}

/// Resolves a language identifier to an installed tokenizer. Implementations
/// are free to hot-swap tokenizers; the engine is notified of such changes
/// through `LifecycleController::on_registry_changed` rather than polling
/// this trait.
pub trait TokenizerRegistry {
    fn resolve(&self, language_id: &str) -> Option<Arc<dyn Tokenizer>>;
}

/// Translates between a human-readable language identifier and whatever
/// compact representation the host environment uses internally. The engine
/// only ever deals in `&str` ids; this trait exists so a host can plug in
/// its own interned/integer id scheme without the engine knowing about it.
pub trait LanguageIdCodec {
    fn encode(&self, language_id: &str) -> u32;
    fn decode(&self, code: u32) -> Option<String>;
}

/// A null tokenizer used when no real tokenizer is installed for a
/// language, or as `SafeTokenizer`'s fallback after a failure. Emits one
/// token spanning the whole line with scope `"text.plain"` and passes the
/// begin state through unchanged.
#[derive(Debug, Default)]
pub struct NullTokenizer;

impl Tokenizer for NullTokenizer {
    fn initial_state(&self) -> anyhow::Result<Box<dyn BeginState>> {
        Ok(Box::new(NullState))
    }

    fn tokenize(
        &self,
        line: &str,
        _has_eol: bool,
        state: &dyn BeginState,
    ) -> anyhow::Result<(Vec<Token>, Box<dyn BeginState>)> {
        let tokens = if line.is_empty() {
            Vec::new()
        } else {
            vec![Token {
                start: 0,
                end: line.len(),
                scope: "text.plain".to_string(),
            }]
        };
        Ok((tokens, state.clone_box()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NullState;
