use std::fmt;
use std::rc::Rc;

use crate::error::PromiseError;
use crate::promise::Promise;

/// Callback handed to a foreign thenable. Misbehaving thenables may call it
/// any number of times; every signal after the first is discarded by the
/// resolution latch.
pub type ThenCallback = Rc<dyn Fn(Value)>;

/// A foreign promise-like object: anything exposing a `then` that accepts a
/// fulfill callback and a reject callback.
///
/// Returning `Err(v)` models `then` throwing synchronously while being read
/// or called; the resolution procedure turns that into a rejection of the
/// target promise.
pub trait Thenable {
    fn call_then(
        &self,
        on_fulfilled: ThenCallback,
        on_rejected: ThenCallback,
    ) -> Result<(), Value>;
}

/// Per-index record produced by [`Promise::all_settled`].
///
/// [`Promise::all_settled`]: crate::Promise::all_settled
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fulfilled { value: Value },
    Rejected { reason: Value },
}

/// Dynamically typed payload carried through promise chains.
///
/// Settlement values, rejection reasons and handler results are all
/// `Value`s, so a fulfillment can carry another [`Promise`] (which the
/// resolution procedure flattens) or a foreign [`Thenable`] (which it
/// adopts).
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Error(PromiseError),
    Outcome(Box<Outcome>),
    Promise(Promise),
    Thenable(Rc<dyn Thenable>),
}

impl Value {
    /// Wrap an [`Outcome`] record.
    pub fn outcome(outcome: Outcome) -> Value {
        Value::Outcome(Box::new(outcome))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Outcome(a), Value::Outcome(b)) => a == b,
            // Promises and thenables compare by reference identity.
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::Thenable(a), Value::Thenable(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Int(n) => f.debug_tuple("Int").field(n).finish(),
            Value::Float(n) => f.debug_tuple("Float").field(n).finish(),
            Value::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Error(e) => f.debug_tuple("Error").field(e).finish(),
            Value::Outcome(o) => f.debug_tuple("Outcome").field(o).finish(),
            Value::Promise(p) => f.debug_tuple("Promise").field(&p.state()).finish(),
            Value::Thenable(_) => write!(f, "Thenable(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::List(items)
    }
}

impl From<PromiseError> for Value {
    fn from(e: PromiseError) -> Value {
        Value::Error(e)
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Value {
        Value::Promise(p)
    }
}
