//! The interpreter state: the default package, the `nil` and `t` singletons,
//! and the top-level environment.

use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult, evaluate};
use crate::number::Number;
use crate::reader::{ParseError, Reader, read_str};
use crate::types::{
    Arity, ConsCell, Native, NativeFn, Object, ObjectKind, ObjectRef, Package, Symbol, eq,
};
use crate::{primitives, special_forms};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PACKAGE_NAME: &str = "CL-USER";

/// Anything that can go wrong between source text and a value.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Interpreter {
    package: ObjectRef,
    nil: ObjectRef,
    t: ObjectRef,
    toplevel: Environment,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// Bootstraps the `CL-USER` package with `nil`, `t` and `pi`, then installs
    /// the special forms and builtins.
    pub fn new() -> Self {
        let package = Object::new(ObjectKind::Package(Package::new(DEFAULT_PACKAGE_NAME)));
        let nil = Object::new(ObjectKind::Symbol(Symbol::new_nil(Rc::downgrade(&package))));
        let mut interp = Interpreter {
            package,
            t: Rc::clone(&nil),
            nil,
            toplevel: Environment::new(),
        };
        interp.home().insert(Rc::clone(&interp.nil));
        interp.t = interp.intern("t");

        // nil and t evaluate to themselves
        interp.set_global("nil", Rc::clone(&interp.nil));
        interp.set_global("t", Rc::clone(&interp.t));
        interp.set_global("pi", interp.float(std::f64::consts::PI));

        special_forms::install(&interp);
        primitives::install(&interp);
        interp
    }

    fn home(&self) -> &Package {
        match self.package.as_package() {
            Some(package) => package,
            None => unreachable!("the interpreter package is always a package object"),
        }
    }

    pub fn package(&self) -> &ObjectRef {
        &self.package
    }

    pub fn toplevel(&self) -> &Environment {
        &self.toplevel
    }

    // --- Symbols ---

    pub fn intern(&self, name: &str) -> ObjectRef {
        self.home().intern(&self.package, name)
    }

    pub fn find_symbol(&self, name: &str) -> Option<ObjectRef> {
        self.home().find_symbol(name)
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.home().symbol_names()
    }

    pub fn nil(&self) -> ObjectRef {
        Rc::clone(&self.nil)
    }

    pub fn t(&self) -> ObjectRef {
        Rc::clone(&self.t)
    }

    pub fn truth(&self, value: bool) -> ObjectRef {
        if value { self.t() } else { self.nil() }
    }

    /// `nil` and `t` can never be bound or assigned.
    pub fn is_constant(&self, object: &ObjectRef) -> bool {
        eq(object, &self.nil) || eq(object, &self.t)
    }

    /// True for a form whose head is the `lambda` symbol.
    pub fn is_lambda_form(&self, form: &ObjectRef) -> bool {
        match (form.as_cons(), self.find_symbol("lambda")) {
            (Some(cell), Some(lambda)) => eq(&cell.car, &lambda),
            _ => false,
        }
    }

    fn set_global(&self, name: &str, value: ObjectRef) {
        if let Some(symbol) = self.intern(name).as_symbol() {
            symbol.set_value(value);
        }
    }

    // --- Allocation ---

    pub fn alloc(&self, kind: ObjectKind) -> ObjectRef {
        Object::new(kind)
    }

    pub fn number(&self, n: Number) -> ObjectRef {
        self.alloc(ObjectKind::Number(n))
    }

    pub fn integer(&self, i: i64) -> ObjectRef {
        self.number(Number::Integer(i))
    }

    pub fn float(&self, x: f64) -> ObjectRef {
        self.number(Number::Float(x))
    }

    pub fn string(&self, s: impl Into<String>) -> ObjectRef {
        self.alloc(ObjectKind::String(s.into()))
    }

    pub fn cons(&self, car: ObjectRef, cdr: ObjectRef) -> ObjectRef {
        self.alloc(ObjectKind::Cons(ConsCell { car, cdr }))
    }

    /// A proper list of `items`; nil when empty.
    pub fn list(&self, items: impl IntoIterator<Item = ObjectRef>) -> ObjectRef {
        self.list_with_tail(items, self.nil())
    }

    /// A list of `items` whose last cdr is `tail`.
    pub fn list_with_tail(
        &self,
        items: impl IntoIterator<Item = ObjectRef>,
        tail: ObjectRef,
    ) -> ObjectRef {
        let items: Vec<ObjectRef> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(tail, |cdr, car| self.cons(car, cdr))
    }

    // --- Operators ---

    fn define_native(&self, name: &'static str, kind: ObjectKind) {
        if let Some(symbol) = self.intern(name).as_symbol() {
            symbol.set_function(self.alloc(kind));
        }
    }

    pub fn define_special_form(&self, name: &'static str, arity: Arity, code: NativeFn) {
        self.define_native(name, ObjectKind::SpecialForm(Native { name, arity, code }));
    }

    pub fn define_builtin(&self, name: &'static str, arity: Arity, code: NativeFn) {
        self.define_native(name, ObjectKind::Builtin(Native { name, arity, code }));
    }

    // --- Driver ---

    /// Evaluates one form at top level. Lexical frames opened during evaluation
    /// are gone again when this returns.
    pub fn eval(&self, form: &ObjectRef) -> EvalResult {
        let mut env = self.toplevel.clone();
        evaluate(self, form, &mut env)
    }

    pub fn read_str(&self, input: &str) -> Result<ObjectRef, ParseError> {
        read_str(self, input)
    }

    /// Reads exactly one form from `input` and evaluates it.
    pub fn eval_str(&self, input: &str) -> Result<ObjectRef, Error> {
        let form = self.read_str(input)?;
        Ok(self.eval(&form)?)
    }

    /// Reads and evaluates every form in `source`, stopping at the first error.
    /// Returns the value of the last form, or nil for empty input.
    pub fn load_str(&self, source: &str) -> Result<ObjectRef, Error> {
        let mut result = self.nil();
        for form in Reader::new(self, source) {
            result = self.eval(&form?)?;
        }
        Ok(result)
    }

    /// Reads a source file for [`Interpreter::load_str`]. The caller keeps the
    /// text so diagnostics can point into it.
    pub fn read_source(path: &Path) -> Result<String, Error> {
        debug!(path = %path.display(), "loading file");
        std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
