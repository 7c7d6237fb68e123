//! The opaque per-line tokenizer state the cache shuttles between lines.
//!
//! The cache never inspects a begin state's contents; it only needs to clone
//! one before handing it to a tokenizer (so a failed or panicking call can't
//! corrupt the cached copy) and to compare two for equality (to decide
//! whether downstream lines can be skipped). `Clone` alone isn't object
//! safe, so the trait exposes a `clone_box` a blanket impl derives from any
//! `Clone + PartialEq` state type.

use std::any::Any;

/// Capability set required of a tokenizer's per-line state.
pub trait BeginState: Any {
    /// Produce an owned, independent copy.
    fn clone_box(&self) -> Box<dyn BeginState>;

    /// Structural equality against another begin state. Implementations that
    /// receive a state from a different tokenizer should return `false`
    /// rather than panic.
    fn equals(&self, other: &dyn BeginState) -> bool;

    /// Upcast for downcasting in tests and tokenizer implementations.
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn BeginState> {
    fn clone(&self) -> Self {
        self.as_ref().clone_box()
    }
}

impl std::fmt::Debug for dyn BeginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BeginState(..)")
    }
}

/// Blanket impl: any concrete state that is `Clone + PartialEq + 'static`
/// automatically satisfies `BeginState`.
impl<T> BeginState for T
where
    T: Clone + PartialEq + Any + 'static,
{
    fn clone_box(&self) -> Box<dyn BeginState> {
        Box::new(self.clone())
    }

    fn equals(&self, other: &dyn BeginState) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(o) => self == o,
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
