//! Error kinds surfaced by the tokenization engine.

/// The four failure modes the engine can report. Nothing in this crate retries
/// within a slice; a failure degrades the affected line(s) and moves on.
#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("tokenizer initialisation failed for language {language_id:?}: {source}")]
    TokenizerInitialisation {
        language_id: String,
        source: anyhow::Error,
    },

    #[error("tokenizer runtime error on line {line}: {source}")]
    TokenizerRuntime {
        line: usize,
        source: anyhow::Error,
    },

    #[error("buffer of {line_count} lines exceeds the configured size limit")]
    BufferSizeExceeded { line_count: usize },

    #[error("engine was disposed while a slice was suspended")]
    DisposedAfterSuspension,
}

/// Where the engine reports failures it has already degraded gracefully
/// from (a failed tokenizer call still produces null tokenization; this is
/// purely a notification channel for diagnostics/telemetry).
pub trait ErrorSink {
    fn report(&self, error: TokenizeError);
}

/// An `ErrorSink` that records everything it's given, for tests that need
/// to assert a failure was reported.
#[derive(Debug, Default)]
pub struct RecordingErrorSink {
    pub errors: std::cell::RefCell<Vec<String>>,
}

impl ErrorSink for RecordingErrorSink {
    fn report(&self, error: TokenizeError) {
        self.errors.borrow_mut().push(error.to_string());
    }
}

/// An `ErrorSink` that forwards to `tracing::error!`, used in production
/// wiring where nothing needs to assert on the error afterwards.
#[derive(Debug, Default)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: TokenizeError) {
        tracing::error!(target: "syntax.tokenizer", %error, "tokenizer failure");
    }
}
