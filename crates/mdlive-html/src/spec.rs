use std::fmt::{self, Display};

use smol_str::SmolStr;

/// A ground value passed to an operation or written into an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A possibly unbound value inside a [`Spec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Text(String),
    Int(i64),
    Bool(bool),
    Var(SmolStr),
}

impl Term {
    pub fn var(name: impl Into<SmolStr>) -> Self {
        Term::Var(name.into())
    }

    /// The ground value of this term, or the name of the unbound variable.
    pub fn value(&self) -> Result<Value, &SmolStr> {
        match self {
            Term::Text(s) => Ok(Value::Text(s.clone())),
            Term::Int(n) => Ok(Value::Int(*n)),
            Term::Bool(b) => Ok(Value::Bool(*b)),
            Term::Var(name) => Err(name),
        }
    }

    fn unbound(&self) -> Option<&SmolStr> {
        self.value().err()
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Text(s.to_string())
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Text(s)
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Int(n)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Bool(b)
    }
}

/// A computed sub-tree: a call of a registered operation with its arguments.
///
/// The operation receives the arguments plus an emitter for the nodes it
/// produces; the emitter is the only channel back into the tree being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escape {
    pub op: SmolStr,
    pub args: Vec<Term>,
}

impl Escape {
    pub fn new(op: impl Into<SmolStr>, args: Vec<Term>) -> Self {
        Self {
            op: op.into(),
            args,
        }
    }
}

/// A declarative request to build a tree of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spec {
    Text(String),
    Element {
        tag: SmolStr,
        attrs: Vec<(SmolStr, Term)>,
        children: Vec<Spec>,
    },
    Escape(Escape),
    Var(SmolStr),
}

impl Spec {
    pub fn text(value: impl Into<String>) -> Self {
        Spec::Text(value.into())
    }

    pub fn element(tag: impl Into<SmolStr>, children: Vec<Spec>) -> Self {
        Spec::Element {
            tag: tag.into(),
            attrs: Vec::new(),
            children,
        }
    }

    pub fn escape(op: impl Into<SmolStr>, args: Vec<Term>) -> Self {
        Spec::Escape(Escape::new(op, args))
    }

    pub fn var(name: impl Into<SmolStr>) -> Self {
        Spec::Var(name.into())
    }

    /// Adds an attribute to an element spec. Other specs are returned unchanged.
    pub fn with_attr(mut self, key: impl Into<SmolStr>, value: impl Into<Term>) -> Self {
        if let Spec::Element { attrs, .. } = &mut self {
            attrs.push((key.into(), value.into()));
        }
        self
    }

    /// The first unbound variable in depth-first order, if any.
    pub fn unbound(&self) -> Option<&SmolStr> {
        match self {
            Spec::Text(_) => None,
            Spec::Var(name) => Some(name),
            Spec::Escape(escape) => escape.args.iter().find_map(Term::unbound),
            Spec::Element {
                attrs, children, ..
            } => attrs
                .iter()
                .find_map(|(_, term)| term.unbound())
                .or_else(|| children.iter().find_map(Spec::unbound)),
        }
    }

    /// Every escape in the spec, at any depth, in document order.
    pub fn escapes(&self) -> Vec<&Escape> {
        let mut found = Vec::new();
        self.collect_escapes(&mut found);
        found
    }

    fn collect_escapes<'a>(&'a self, found: &mut Vec<&'a Escape>) {
        match self {
            Spec::Escape(escape) => found.push(escape),
            Spec::Element { children, .. } => {
                for child in children {
                    child.collect_escapes(found);
                }
            }
            Spec::Text(_) | Spec::Var(_) => {}
        }
    }
}
