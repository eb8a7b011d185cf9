//! Context Stack - Provider values visible to the subtree being rendered.
//!
//! Providers push in begin and pop in complete, so while a fiber renders the
//! stack holds exactly the providers among its ancestors.

use crate::element::{AnyValue, ContextHandle};

#[derive(Default)]
pub(crate) struct ContextStack {
    entries: Vec<(u64, AnyValue)>,
}

impl ContextStack {
    pub fn push_provider(&mut self, context: &ContextHandle, value: AnyValue) {
        self.entries.push((context.id(), value));
    }

    pub fn pop_provider(&mut self, context: &ContextHandle) {
        match self.entries.pop() {
            Some((id, _)) if id == context.id() => {}
            Some(_) => tracing::warn!(context = context.name(), "context stack popped out of order"),
            None => tracing::warn!(context = context.name(), "context stack underflow"),
        }
    }

    /// Innermost provided value, or the context default.
    pub fn read(&self, context: &ContextHandle) -> AnyValue {
        self.entries
            .iter()
            .rev()
            .find(|(id, _)| *id == context.id())
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| context.default_value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Context;
    use std::rc::Rc;

    #[test]
    fn test_innermost_provider_wins() {
        let theme = Context::new("Theme", "light");
        let mut stack = ContextStack::default();

        let read = |stack: &ContextStack| *stack.read(theme.handle()).downcast_ref::<&str>().unwrap();
        assert_eq!(read(&stack), "light");

        stack.push_provider(theme.handle(), Rc::new("dark"));
        stack.push_provider(theme.handle(), Rc::new("blue"));
        assert_eq!(read(&stack), "blue");

        stack.pop_provider(theme.handle());
        assert_eq!(read(&stack), "dark");
        stack.pop_provider(theme.handle());
        assert_eq!(stack.entries.len(), 0);
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = Context::new("A", 1_i32);
        let b = Context::new("B", 2_i32);
        let mut stack = ContextStack::default();
        stack.push_provider(a.handle(), Rc::new(10_i32));

        assert_eq!(stack.read(b.handle()).downcast_ref::<i32>(), Some(&2));
        assert_eq!(stack.read(a.handle()).downcast_ref::<i32>(), Some(&10));
    }
}
