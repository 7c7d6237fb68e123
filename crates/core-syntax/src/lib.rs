//! Incremental background tokenization engine.
//!
//! Drives a pluggable line-oriented tokenizer across an editable text
//! buffer, maintaining a per-line begin-state cache ([`cache::StateCache`])
//! and scheduling work across three modes ([`scheduler::TokenizationEngine`]):
//! a background idle-sliced walk, synchronous forced tokenization up to a
//! line, and a prioritised viewport pass. [`lifecycle::LifecycleController`]
//! wires the engine up to the signals a buffer/editor emits.

pub mod begin_state;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod tokenizer;

pub use begin_state::BeginState;
pub use buffer::TextSource;
pub use cache::{Propagation, StateCache};
pub use config::TokenizerEngineConfig;
pub use error::{ErrorSink, TokenizeError};
pub use host::{Host, IdleDeadline, ManualHost};
pub use lifecycle::LifecycleController;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use registry::{LanguageIdCodec, NullTokenizer, Token, Tokenizer, TokenizerRegistry};
pub use scheduler::TokenizationEngine;
