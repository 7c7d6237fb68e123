//! `SafeTokenizer`: the defensive wrapper around an arbitrary, possibly
//! buggy external `Tokenizer` implementation (spec 4.2).
//!
//! Three things can go wrong with a call into third-party tokenizer code:
//! it can return `Err`, it can panic, or it can return tokens whose final
//! end-offset doesn't match the line length. This wrapper clones the begin
//! state before every call, catches both failure modes, and normalises the
//! result.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::begin_state::BeginState;
use crate::error::{ErrorSink, TokenizeError};
use crate::registry::{NullTokenizer, Token, Tokenizer};

pub struct SafeTokenizer<'a> {
    inner: Option<Arc<dyn Tokenizer>>,
    fallback: NullTokenizer,
    sink: &'a dyn ErrorSink,
}

impl<'a> SafeTokenizer<'a> {
    /// `inner` is `None` when no tokenizer is installed for the buffer's
    /// language; every call then goes straight to the null tokenizer.
    pub fn new(inner: Option<Arc<dyn Tokenizer>>, sink: &'a dyn ErrorSink) -> Self {
        Self {
            inner,
            fallback: NullTokenizer,
            sink,
        }
    }

    pub fn initial_state(&self) -> Box<dyn BeginState> {
        let Some(tokenizer) = &self.inner else {
            return self
                .fallback
                .initial_state()
                .expect("null tokenizer cannot fail");
        };
        match std::panic::catch_unwind(AssertUnwindSafe(|| tokenizer.initial_state())) {
            Ok(Ok(state)) => state,
            Ok(Err(source)) => {
                self.sink.report(TokenizeError::TokenizerInitialisation {
                    language_id: "<unknown>".to_string(),
                    source,
                });
                self.fallback
                    .initial_state()
                    .expect("null tokenizer cannot fail")
            }
            Err(_) => {
                self.sink.report(TokenizeError::TokenizerInitialisation {
                    language_id: "<unknown>".to_string(),
                    source: anyhow::anyhow!("tokenizer panicked during initial_state"),
                });
                self.fallback
                    .initial_state()
                    .expect("null tokenizer cannot fail")
            }
        }
    }

    /// Tokenize a single line, clamping and normalising the result. On any
    /// failure, reports to the sink and returns a null tokenization that
    /// passes `state` through unchanged, so the propagation protocol still
    /// has something valid to chain onto the next line.
    pub fn tokenize(
        &self,
        line_index: usize,
        line: &str,
        has_eol: bool,
        state: &dyn BeginState,
    ) -> (Vec<Token>, Box<dyn BeginState>) {
        let cloned_for_call = state.clone_box();

        let result = match &self.inner {
            Some(tokenizer) => {
                let tokenizer = tokenizer.clone();
                std::panic::catch_unwind(AssertUnwindSafe(|| {
                    tokenizer.tokenize(line, has_eol, cloned_for_call.as_ref())
                }))
            }
            None => Ok(self.fallback.tokenize(line, has_eol, cloned_for_call.as_ref())),
        };

        match result {
            Ok(Ok((tokens, end_state))) => (normalize_end_offsets(tokens, line.len()), end_state),
            Ok(Err(source)) => {
                self.sink.report(TokenizeError::TokenizerRuntime {
                    line: line_index,
                    source,
                });
                self.null_tokenize(line, has_eol, state)
            }
            Err(_) => {
                self.sink.report(TokenizeError::TokenizerRuntime {
                    line: line_index,
                    source: anyhow::anyhow!("tokenizer panicked"),
                });
                self.null_tokenize(line, has_eol, state)
            }
        }
    }

    fn null_tokenize(
        &self,
        line: &str,
        has_eol: bool,
        state: &dyn BeginState,
    ) -> (Vec<Token>, Box<dyn BeginState>) {
        self.fallback
            .tokenize(line, has_eol, state)
            .expect("null tokenizer cannot fail")
    }
}

/// Clamp every token's `end` to the line's byte length and drop any token
/// that starts beyond it, so a misbehaving tokenizer can't hand back
/// offsets the rest of the pipeline would panic indexing with.
fn normalize_end_offsets(mut tokens: Vec<Token>, line_len: usize) -> Vec<Token> {
    tokens.retain(|t| t.start <= line_len);
    for t in &mut tokens {
        if t.end > line_len {
            t.end = line_len;
        }
    }
    tokens
}
