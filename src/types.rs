use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult};
use crate::interpreter::Interpreter;
use crate::number::Number;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared handle to a heap object. Objects are never reclaimed explicitly.
pub type ObjectRef = Rc<Object>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of an object. Assigned once, monotonically, never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> ObjectId {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

pub struct Object {
    id: ObjectId,
    kind: ObjectKind,
}

/// The closed set of object kinds. Nothing is added at runtime, so dispatch is
/// always a `match` over this enum.
pub enum ObjectKind {
    Number(Number),
    String(String),
    Symbol(Symbol),
    Cons(ConsCell),
    Package(Package),
    SpecialForm(Native),
    Builtin(Native),
    Closure(Closure),
}

impl Object {
    pub fn new(kind: ObjectKind) -> ObjectRef {
        Rc::new(Object {
            id: ObjectId::next(),
            kind,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Number(Number::Integer(_)) => "integer",
            ObjectKind::Number(Number::Float(_)) => "float",
            ObjectKind::String(_) => "string",
            ObjectKind::Symbol(_) => "symbol",
            ObjectKind::Cons(_) => "cons",
            ObjectKind::Package(_) => "package",
            ObjectKind::SpecialForm(_) => "special-form",
            ObjectKind::Builtin(_) => "builtin",
            ObjectKind::Closure(_) => "function",
        }
    }

    /// Numbers, strings and symbols (including `nil`) are atoms.
    pub fn is_atom(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Number(_) | ObjectKind::String(_) | ObjectKind::Symbol(_)
        )
    }

    /// True only for the empty-list / false singleton.
    pub fn is_nil(&self) -> bool {
        matches!(&self.kind, ObjectKind::Symbol(symbol) if symbol.is_nil)
    }

    pub fn as_number(&self) -> Option<Number> {
        match self.kind {
            ObjectKind::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match &self.kind {
            ObjectKind::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn as_cons(&self) -> Option<&ConsCell> {
        match &self.kind {
            ObjectKind::Cons(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_package(&self) -> Option<&Package> {
        match &self.kind {
            ObjectKind::Package(package) => Some(package),
            _ => None,
        }
    }

    /// Collects the elements of a proper list. Returns `None` for anything that
    /// is not a proper list (a dotted tail or a non-list atom).
    pub fn list_items(self: &Rc<Self>) -> Option<Vec<ObjectRef>> {
        let mut items = Vec::new();
        let mut current = Rc::clone(self);
        loop {
            // nil must be checked before looking at car/cdr
            if current.is_nil() {
                return Some(items);
            }
            let next = match &current.kind {
                ObjectKind::Cons(cell) => {
                    items.push(Rc::clone(&cell.car));
                    Rc::clone(&cell.cdr)
                }
                _ => return None,
            };
            current = next;
        }
    }
}

thread_local! {
    // Stands in for the car and cdr of a cell that is being torn down.
    static UNLINKED: ObjectRef = Object::new(ObjectKind::Number(Number::Integer(0)));
}

/// Frees cons chains with an explicit worklist. The default drop glue would
/// recurse once per cell and overflow the stack on long lists.
impl Drop for Object {
    fn drop(&mut self) {
        let ObjectKind::Cons(cell) = &mut self.kind else {
            return;
        };
        // During thread teardown the placeholder may already be gone; the
        // cell then falls back to the recursive drop glue.
        let _ = UNLINKED.try_with(|unlinked| {
            let mut pending = Vec::new();
            cell.unlink_into(unlinked, &mut pending);
            while let Some(object) = pending.pop() {
                if let Ok(mut object) = Rc::try_unwrap(object) {
                    if let ObjectKind::Cons(cell) = &mut object.kind {
                        cell.unlink_into(unlinked, &mut pending);
                    }
                }
            }
        });
    }
}

/// Identity equality: the only equality the evaluator relies on.
pub fn eq(a: &Object, b: &Object) -> bool {
    a.id == b.id
}

// --- Symbols and packages ---

pub struct Symbol {
    name: ObjectRef,
    value: RefCell<Option<ObjectRef>>,
    function: RefCell<Option<ObjectRef>>,
    plist: RefCell<Option<ObjectRef>>,
    package: Weak<Object>,
    is_nil: bool,
}

impl Symbol {
    pub(crate) fn new(name: &str, package: Weak<Object>) -> Symbol {
        Symbol {
            name: Object::new(ObjectKind::String(name.to_string())),
            value: RefCell::new(None),
            function: RefCell::new(None),
            plist: RefCell::new(None),
            package,
            is_nil: false,
        }
    }

    /// The empty-list / false singleton. Only the interpreter bootstrap makes one.
    pub(crate) fn new_nil(package: Weak<Object>) -> Symbol {
        Symbol {
            is_nil: true,
            ..Symbol::new("nil", package)
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str().unwrap_or_default()
    }

    /// The name as a String object.
    pub fn name_object(&self) -> &ObjectRef {
        &self.name
    }

    pub fn value(&self) -> Option<ObjectRef> {
        self.value.borrow().clone()
    }

    pub fn set_value(&self, value: ObjectRef) {
        *self.value.borrow_mut() = Some(value);
    }

    pub fn function(&self) -> Option<ObjectRef> {
        self.function.borrow().clone()
    }

    pub fn set_function(&self, function: ObjectRef) {
        *self.function.borrow_mut() = Some(function);
    }

    pub fn plist(&self) -> Option<ObjectRef> {
        self.plist.borrow().clone()
    }

    pub fn set_plist(&self, plist: ObjectRef) {
        *self.plist.borrow_mut() = Some(plist);
    }

    /// The owning package, or `None` for an uninterned symbol.
    pub fn package(&self) -> Option<ObjectRef> {
        self.package.upgrade()
    }
}

pub struct Package {
    name: ObjectRef,
    symbols: RefCell<HashMap<String, ObjectRef>>,
}

impl Package {
    pub fn new(name: &str) -> Package {
        Package {
            name: Object::new(ObjectKind::String(name.to_string())),
            symbols: RefCell::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str().unwrap_or_default()
    }

    /// Returns the canonical symbol for `name`, creating it on first use.
    /// `home` must be the object wrapping this package; new symbols point back to it.
    /// Lookup and insertion happen under a single borrow, so a name is never
    /// interned twice.
    pub fn intern(&self, home: &ObjectRef, name: &str) -> ObjectRef {
        let mut symbols = self.symbols.borrow_mut();
        if let Some(symbol) = symbols.get(name) {
            return Rc::clone(symbol);
        }
        let symbol = Object::new(ObjectKind::Symbol(Symbol::new(name, Rc::downgrade(home))));
        symbols.insert(name.to_string(), Rc::clone(&symbol));
        tracing::debug!(name, package = self.name(), "interned symbol");
        symbol
    }

    /// Registers an already-built symbol under its own name.
    pub(crate) fn insert(&self, symbol: ObjectRef) {
        if let Some(name) = symbol.as_symbol().map(|s| s.name().to_string()) {
            self.symbols.borrow_mut().insert(name, symbol);
        }
    }

    pub fn find_symbol(&self, name: &str) -> Option<ObjectRef> {
        self.symbols.borrow().get(name).cloned()
    }

    pub fn symbol_names(&self) -> Vec<String> {
        self.symbols.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// --- Pairs ---

pub struct ConsCell {
    pub car: ObjectRef,
    pub cdr: ObjectRef,
}

impl ConsCell {
    /// Moves car and cdr onto `pending`, leaving `unlinked` in their place.
    fn unlink_into(&mut self, unlinked: &ObjectRef, pending: &mut Vec<ObjectRef>) {
        for slot in [&mut self.car, &mut self.cdr] {
            if !Rc::ptr_eq(slot, unlinked) {
                pending.push(std::mem::replace(slot, Rc::clone(unlinked)));
            }
        }
    }
}

// --- Operators ---

/// Native routine shared by special forms and builtins. Special forms receive
/// their arguments unevaluated, builtins receive evaluated values.
pub type NativeFn = fn(&Interpreter, &mut Environment, &[ObjectRef]) -> EvalResult;

/// Declared argument count of an operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Arity {
    pub required: usize,
    pub variadic: bool,
}

impl Arity {
    pub fn exactly(required: usize) -> Arity {
        Arity {
            required,
            variadic: false,
        }
    }

    pub fn at_least(required: usize) -> Arity {
        Arity {
            required,
            variadic: true,
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        if self.variadic {
            count >= self.required
        } else {
            count == self.required
        }
    }

    pub fn check(self, count: usize) -> Result<(), EvalError> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(EvalError::WrongNumberOfArguments {
                expected: self,
                got: count,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variadic {
            write!(f, "at least {}", self.required)
        } else {
            write!(f, "exactly {}", self.required)
        }
    }
}

#[derive(Clone)]
pub struct Native {
    pub name: &'static str,
    pub arity: Arity,
    pub code: NativeFn,
}

pub struct Closure {
    pub name: Option<ObjectRef>,
    pub params: Vec<ObjectRef>,
    /// Parameter following `&rest`, bound to the list of surplus arguments.
    pub rest: Option<ObjectRef>,
    pub body: Vec<ObjectRef>,
    /// Frames visible where the closure was created. Shared, not copied.
    pub env: Environment,
}

impl Closure {
    pub fn arity(&self) -> Arity {
        Arity {
            required: self.params.len(),
            variadic: self.rest.is_some(),
        }
    }
}

// --- Printing ---

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

fn write_list(f: &mut fmt::Formatter<'_>, mut cell: &ConsCell) -> fmt::Result {
    write!(f, "(")?;
    loop {
        write!(f, "{}", cell.car)?;
        if cell.cdr.is_nil() {
            break;
        }
        match &cell.cdr.kind {
            ObjectKind::Cons(next) => {
                write!(f, " ")?;
                cell = next;
            }
            _ => {
                write!(f, " . {}", cell.cdr)?;
                break;
            }
        }
    }
    write!(f, ")")
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Number(n) => write!(f, "{}", n),
            ObjectKind::String(s) => write_string_literal(f, s),
            ObjectKind::Symbol(symbol) => write!(f, "{}", symbol.name()),
            ObjectKind::Cons(cell) => write_list(f, cell),
            ObjectKind::Package(package) => write!(f, "#<package {}>", package.name()),
            ObjectKind::SpecialForm(native) => write!(f, "#<special-form {}>", native.name),
            ObjectKind::Builtin(native) => write!(f, "#<builtin {}>", native.name),
            ObjectKind::Closure(closure) => match &closure.name {
                Some(name) => write!(f, "#<function {}>", name),
                None => write!(f, "#<function lambda>"),
            },
        }
    }
}

// Symbols reach themselves through their value cells (nil, t), so Debug must
// not walk the cells.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} #{}: {}>", self.type_name(), self.id.0, self)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("rest", &self.rest)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}
