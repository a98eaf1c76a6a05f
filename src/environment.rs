use crate::types::{ObjectRef, eq};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use tracing::trace;

// --- Frames ---

#[derive(Debug, Clone)]
pub struct Binding {
    pub symbol: ObjectRef,
    pub value: ObjectRef,
}

/// One lexical scope. Bindings are keyed by symbol identity, never by name.
#[derive(Debug, Default)]
pub struct Frame {
    bindings: Vec<Binding>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    pub fn with_binding(symbol: ObjectRef, value: ObjectRef) -> Frame {
        let mut frame = Frame::new();
        frame.bind(symbol, value);
        frame
    }

    pub fn bind(&mut self, symbol: ObjectRef, value: ObjectRef) {
        self.bindings.push(Binding { symbol, value });
    }

    /// First binding for `symbol` in insertion order.
    pub fn lookup(&self, symbol: &ObjectRef) -> Option<ObjectRef> {
        self.bindings
            .iter()
            .find(|binding| eq(&binding.symbol, symbol))
            .map(|binding| Rc::clone(&binding.value))
    }

    pub fn update(&mut self, symbol: &ObjectRef, value: ObjectRef) -> bool {
        match self
            .bindings
            .iter_mut()
            .find(|binding| eq(&binding.symbol, symbol))
        {
            Some(binding) => {
                binding.value = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// --- Environment Definition ---

/// A stack of frames, outermost first.
///
/// Frames are shared: cloning an environment (as closure creation does) copies
/// the stack of handles, so an update made through one environment is visible
/// through every other environment holding the same frame.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    frames: Vec<Rc<RefCell<Frame>>>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Looks up the innermost lexical binding of `symbol`. Falls through to
    /// `None` so the caller can consult the symbol's global value cell.
    pub fn lookup(&self, symbol: &ObjectRef) -> Option<ObjectRef> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.borrow().lookup(symbol))
    }

    /// Updates the innermost lexical binding in place. Returns false when the
    /// symbol has no lexical binding.
    pub fn update_value(&self, symbol: &ObjectRef, value: ObjectRef) -> bool {
        for frame in self.frames.iter().rev() {
            if frame.borrow_mut().update(symbol, value.clone()) {
                return true;
            }
        }
        false
    }

    /// Opens a scope. Frames pushed through the returned guard are popped when
    /// it is dropped, on every exit path including `?` propagation.
    pub fn scope(&mut self) -> Scope<'_> {
        let base = self.frames.len();
        Scope { env: self, base }
    }
}

/// Guard returned by [`Environment::scope`].
pub struct Scope<'env> {
    env: &'env mut Environment,
    base: usize,
}

impl Scope<'_> {
    pub fn push(&mut self, frame: Frame) {
        trace!(depth = self.env.frames.len() + 1, bindings = frame.len(), "push frame");
        self.env.frames.push(Rc::new(RefCell::new(frame)));
    }

    /// Number of frames pushed through this guard.
    pub fn pushed(&self) -> usize {
        self.env.frames.len() - self.base
    }
}

impl Deref for Scope<'_> {
    type Target = Environment;

    fn deref(&self) -> &Environment {
        self.env
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Environment {
        self.env
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.pushed() > 0 {
            trace!(depth = self.base, popped = self.pushed(), "pop frames");
        }
        self.env.frames.truncate(self.base);
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::types::{Object, ObjectKind, Symbol};
    use std::rc::Weak;

    fn num(n: i64) -> ObjectRef {
        Object::new(ObjectKind::Number(Number::Integer(n)))
    }

    fn sym(name: &str) -> ObjectRef {
        Object::new(ObjectKind::Symbol(Symbol::new(name, Weak::new())))
    }

    fn value_of(env: &Environment, symbol: &ObjectRef) -> Option<i64> {
        match env.lookup(symbol)?.as_number()? {
            Number::Integer(i) => Some(i),
            Number::Float(_) => None,
        }
    }

    #[test]
    fn test_frame_lookup_first_match_wins() {
        let x = sym("x");
        let mut frame = Frame::new();
        frame.bind(x.clone(), num(1));
        frame.bind(x.clone(), num(2));
        assert_eq!(frame.lookup(&x).unwrap().as_number(), Some(Number::Integer(1)));
        assert!(frame.update(&x, num(3)));
        assert_eq!(frame.lookup(&x).unwrap().as_number(), Some(Number::Integer(3)));
        assert!(!frame.update(&sym("y"), num(4)));
    }

    #[test]
    fn test_bindings_are_by_identity() {
        let x = sym("x");
        let other_x = sym("x");
        let mut env = Environment::new();
        let mut scope = env.scope();
        scope.push(Frame::with_binding(x.clone(), num(10)));
        assert_eq!(value_of(&scope, &x), Some(10));
        assert_eq!(value_of(&scope, &other_x), None);
    }

    #[test]
    fn test_shadowing() {
        let x = sym("x");
        let y = sym("y");
        let mut env = Environment::new();
        let mut outer = env.scope();
        outer.push(Frame::with_binding(x.clone(), num(10)));
        {
            let mut inner = outer.scope();
            inner.push(Frame::with_binding(x.clone(), num(50)));
            inner.push(Frame::with_binding(y.clone(), num(1)));
            assert_eq!(value_of(&inner, &x), Some(50));
            assert_eq!(value_of(&inner, &y), Some(1));
            assert_eq!(inner.depth(), 3);
        }
        assert_eq!(value_of(&outer, &x), Some(10));
        assert_eq!(value_of(&outer, &y), None);
        assert_eq!(outer.depth(), 1);
    }

    #[test]
    fn test_scope_pops_on_error_path() {
        fn failing(env: &mut Environment, symbol: &ObjectRef) -> Result<(), ()> {
            let mut scope = env.scope();
            scope.push(Frame::with_binding(symbol.clone(), num(1)));
            Err::<(), ()>(())?;
            Ok(())
        }

        let x = sym("x");
        let mut env = Environment::new();
        assert!(failing(&mut env, &x).is_err());
        assert_eq!(env.depth(), 0);
        assert!(env.lookup(&x).is_none());
    }

    #[test]
    fn test_update_innermost_binding() {
        let x = sym("x");
        let mut env = Environment::new();
        let mut outer = env.scope();
        outer.push(Frame::with_binding(x.clone(), num(1)));
        let mut inner = outer.scope();
        inner.push(Frame::with_binding(x.clone(), num(2)));
        assert!(inner.update_value(&x, num(3)));
        assert_eq!(value_of(&inner, &x), Some(3));
        drop(inner);
        assert_eq!(value_of(&outer, &x), Some(1));
        assert!(!outer.update_value(&sym("x"), num(9)));
    }

    #[test]
    fn test_captured_frames_are_shared() {
        let x = sym("x");
        let mut env = Environment::new();
        let mut scope = env.scope();
        scope.push(Frame::with_binding(x.clone(), num(1)));
        let captured: Environment = scope.clone();
        assert!(scope.update_value(&x, num(2)));
        assert_eq!(value_of(&captured, &x), Some(2));
        drop(scope);
        // the capture keeps the frame alive after the scope closes
        assert_eq!(value_of(&captured, &x), Some(2));
        assert_eq!(env.depth(), 0);
    }
}
