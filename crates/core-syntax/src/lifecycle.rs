//! Wires the engine up to the signals an editor/buffer emits (spec 4.4):
//!
//! | Signal | Action |
//! |---|---|
//! | registry changed | [`reset`](TokenizationEngine::reset), restart background |
//! | buffer changed (incremental) | [`apply_edit`](TokenizationEngine::apply_edit), keep background running |
//! | buffer changed (flush) | [`reset`](TokenizationEngine::reset), restart background |
//! | language changed | swap language id, [`reset`](TokenizationEngine::reset), restart background |
//! | view attached | [`tokenize_viewport`](TokenizationEngine::tokenize_viewport), then resume background |

use std::rc::Rc;

use crate::buffer::TextSource;
use crate::host::Host;
use crate::scheduler::TokenizationEngine;

/// Thin signal-dispatch layer over a [`TokenizationEngine`]. Holds no state
/// of its own beyond the engine handle; every method here is one line
/// mapping a named signal onto the engine call it implies, so the mapping
/// in the table above is explicit in code rather than left to callers to
/// infer from the engine's API.
pub struct LifecycleController<B: TextSource, H: Host> {
    engine: Rc<TokenizationEngine<B, H>>,
}

impl<B: TextSource + 'static, H: Host + 'static> LifecycleController<B, H> {
    pub fn new(engine: Rc<TokenizationEngine<B, H>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Rc<TokenizationEngine<B, H>> {
        &self.engine
    }

    /// The tokenizer registered for the current language changed (e.g. a
    /// grammar reloaded). Drop everything cached and start over.
    pub fn on_registry_changed(&self) {
        self.engine.reset();
        self.engine.start_background();
    }

    /// An incremental edit landed: `[start_line, end_line)` in the old
    /// buffer became `new_line_count` lines. The caller must have already
    /// applied the edit to the buffer itself before calling this.
    pub fn on_buffer_edited(&self, start_line: usize, end_line: usize, new_line_count: usize) {
        self.engine.apply_edit(start_line, end_line, new_line_count);
        self.engine.start_background();
    }

    /// The buffer was replaced wholesale (e.g. reload from disk, undo to a
    /// snapshot) rather than edited incrementally.
    pub fn on_buffer_flushed(&self) {
        self.engine.reset();
        self.engine.start_background();
    }

    /// The buffer's language changed; a different tokenizer (or none) now
    /// applies. The embedder is expected to apply the new language id to
    /// whatever storage the buffer/registry share before this is called;
    /// the engine itself doesn't own that state, it only re-resolves
    /// against the registry here.
    pub fn on_language_changed(&self) {
        self.engine.reset();
        self.engine.start_background();
    }

    /// A view attached and became visible over `[first_line, last_line]`.
    /// Prioritise that range, then let the background walk resume for
    /// everything else.
    pub fn on_view_attached(&self, first_line: usize, last_line: usize) {
        tracing::debug!(target: "syntax.lifecycle", first_line, last_line, "view attached");
        self.engine.tokenize_viewport(first_line, last_line);
        self.engine.start_background();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VecTextSource;
    use crate::config::TokenizerEngineConfig;
    use crate::error::RecordingErrorSink;
    use crate::host::ManualHost;
    use crate::registry::{NullTokenizer, Tokenizer, TokenizerRegistry};
    use std::cell::RefCell;
    use std::sync::Arc;
    use std::time::Duration;

    struct EchoRegistry;
    impl TokenizerRegistry for EchoRegistry {
        fn resolve(&self, _language_id: &str) -> Option<Arc<dyn Tokenizer>> {
            Some(Arc::new(NullTokenizer))
        }
    }

    fn controller(lines: Vec<&str>) -> LifecycleController<VecTextSource, ManualHost> {
        let (ctl, _host) = controller_with_host(lines);
        ctl
    }

    fn controller_with_host(
        lines: Vec<&str>,
    ) -> (LifecycleController<VecTextSource, ManualHost>, Rc<ManualHost>) {
        let buffer = Rc::new(RefCell::new(VecTextSource::new(
            lines.into_iter().map(String::from).collect(),
            true,
        )));
        let host = ManualHost::new();
        let registry: Rc<dyn TokenizerRegistry> = Rc::new(EchoRegistry);
        let sink: Rc<dyn crate::error::ErrorSink> = Rc::new(RecordingErrorSink::default());
        let engine = TokenizationEngine::new(
            buffer,
            host.clone(),
            registry,
            sink,
            "toy",
            TokenizerEngineConfig::default(),
        );
        (LifecycleController::new(engine), host)
    }

    #[test]
    fn buffer_flush_resets_cache() {
        let (ctl, host) = controller_with_host(vec!["a", "b", "c"]);
        ctl.engine().force_tokenization(3);
        assert!(ctl.engine().is_fully_valid());
        ctl.on_buffer_flushed();
        assert!(!ctl.engine().is_fully_valid());
        assert_eq!(ctl.engine().invalid_frontier(), 0);
        assert!(host.has_pending_idle());
    }

    #[test]
    fn edit_invalidates_and_resumes_background() {
        let ctl = controller(vec!["a", "b", "c"]);
        ctl.engine().force_tokenization(3);
        ctl.on_buffer_edited(1, 2, 1);
        assert!(!ctl.engine().is_fully_valid());
    }

    #[test]
    fn view_attached_prioritises_visible_range() {
        let ctl = controller(vec!["a", "b", "c", "d", "e"]);
        ctl.on_view_attached(3, 4);
        assert!(ctl.engine().token_scope_at(3, 0).is_some());
        assert!(ctl.engine().token_scope_at(4, 0).is_some());
    }

    #[test]
    fn registry_changed_triggers_reset() {
        let (ctl, host) = controller_with_host(vec!["a", "b"]);
        ctl.engine().force_tokenization(2);
        ctl.on_registry_changed();
        assert!(!ctl.engine().is_fully_valid());
        assert!(host.has_pending_idle());
    }

    #[test]
    fn language_changed_triggers_reset() {
        let (ctl, host) = controller_with_host(vec!["a", "b"]);
        ctl.engine().force_tokenization(2);
        ctl.on_language_changed();
        assert!(!ctl.engine().is_fully_valid());
        assert!(host.has_pending_idle());
    }

    #[test]
    fn disposal_mid_slice_stops_background_cleanly() {
        let (ctl, host) = controller_with_host(vec!["a", "b", "c", "d"]);
        ctl.engine().start_background();
        ctl.engine().dispose();

        let frontier_before = ctl.engine().invalid_frontier();
        host.pump_idle(Duration::from_millis(5));
        host.pump_zero_delay();

        assert_eq!(ctl.engine().invalid_frontier(), frontier_before);
        assert!(ctl.engine().is_disposed());
        assert!(!host.has_pending_idle());
    }
}
