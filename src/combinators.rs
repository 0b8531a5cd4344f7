//! Static combinators, built purely on deferred pairs and `then`; none of
//! them touch promise internals directly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::PromiseError;
use crate::promise::{handler, Promise, Resolver};
use crate::scheduler::Scheduler;
use crate::value::{Outcome, ThenCallback, Value};

impl Promise {
    /// Coerce a value into a promise. Own promises pass through unchanged;
    /// thenables are adapted via a new promise whose executor is the bound
    /// `then` (a synchronous throw yields an already-rejected promise);
    /// plain values yield an already-fulfilled promise.
    pub fn resolve(scheduler: &Rc<dyn Scheduler>, value: Value) -> Promise {
        match value {
            Value::Promise(promise) => promise,
            Value::Thenable(thenable) => Promise::new(scheduler, move |resolver| {
                let on_fulfilled: ThenCallback = {
                    let resolver = resolver.clone();
                    Rc::new(move |value| resolver.resolve(value))
                };
                let on_rejected: ThenCallback = Rc::new(move |reason| resolver.reject(reason));
                thenable.call_then(on_fulfilled, on_rejected)
            }),
            value => {
                let (promise, resolver) = Promise::deferred(scheduler);
                resolver.resolve(value);
                promise
            }
        }
    }

    /// An already-rejected promise. The reason is opaque: a promise or
    /// thenable passed here is never unwrapped.
    pub fn reject(scheduler: &Rc<dyn Scheduler>, reason: Value) -> Promise {
        let (promise, resolver) = Promise::deferred(scheduler);
        resolver.reject(reason);
        promise
    }

    /// Fulfills with the inputs' values, index-aligned, once every input
    /// has fulfilled; rejects with the first reason to reject, without
    /// waiting for the rest. Empty input fulfills immediately with an
    /// empty list.
    pub fn all(scheduler: &Rc<dyn Scheduler>, inputs: Vec<Value>) -> Promise {
        let (promise, resolver) = Promise::deferred(scheduler);
        if inputs.is_empty() {
            resolver.resolve(Value::List(Vec::new()));
            return promise;
        }

        let results = Rc::new(RefCell::new(vec![Value::Null; inputs.len()]));
        let remaining = Rc::new(Cell::new(inputs.len()));
        for (index, input) in inputs.into_iter().enumerate() {
            let on_fulfilled = {
                let results = results.clone();
                let remaining = remaining.clone();
                let resolver = resolver.clone();
                handler(move |value: Value| {
                    results.borrow_mut()[index] = value;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resolver.resolve(Value::List(results.borrow().clone()));
                    }
                    Ok(Value::Null)
                })
            };
            let on_rejected = reject_and_absorb(&resolver);
            Promise::resolve(scheduler, input).then(on_fulfilled, on_rejected);
        }
        promise
    }

    /// Settles with the outcome of whichever input settles first; every
    /// later settlement is ignored.
    pub fn race(scheduler: &Rc<dyn Scheduler>, inputs: Vec<Value>) -> Promise {
        let (promise, resolver) = Promise::deferred(scheduler);
        for input in inputs {
            let on_fulfilled = {
                let resolver = resolver.clone();
                handler(move |value: Value| {
                    resolver.resolve(value);
                    Ok(Value::Null)
                })
            };
            let on_rejected = reject_and_absorb(&resolver);
            Promise::resolve(scheduler, input).then(on_fulfilled, on_rejected);
        }
        promise
    }

    /// Never rejects: fulfills with an index-aligned list of
    /// [`Outcome`] records once every input has settled.
    pub fn all_settled(scheduler: &Rc<dyn Scheduler>, inputs: Vec<Value>) -> Promise {
        let (promise, resolver) = Promise::deferred(scheduler);
        if inputs.is_empty() {
            resolver.resolve(Value::List(Vec::new()));
            return promise;
        }

        let results = Rc::new(RefCell::new(vec![Value::Null; inputs.len()]));
        let remaining = Rc::new(Cell::new(inputs.len()));
        for (index, input) in inputs.into_iter().enumerate() {
            let on_fulfilled = {
                let results = results.clone();
                let remaining = remaining.clone();
                let resolver = resolver.clone();
                handler(move |value: Value| {
                    results.borrow_mut()[index] = Value::outcome(Outcome::Fulfilled { value });
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resolver.resolve(Value::List(results.borrow().clone()));
                    }
                    Ok(Value::Null)
                })
            };
            let on_rejected = {
                let results = results.clone();
                let remaining = remaining.clone();
                let resolver = resolver.clone();
                handler(move |reason: Value| {
                    results.borrow_mut()[index] = Value::outcome(Outcome::Rejected { reason });
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resolver.resolve(Value::List(results.borrow().clone()));
                    }
                    Ok(Value::Null)
                })
            };
            Promise::resolve(scheduler, input).then(on_fulfilled, on_rejected);
        }
        promise
    }

    /// Fulfills with the first input to fulfill. When every input rejects,
    /// rejects with [`PromiseError::Aggregate`] carrying the index-aligned
    /// reasons; empty input rejects with an empty aggregate immediately.
    pub fn any(scheduler: &Rc<dyn Scheduler>, inputs: Vec<Value>) -> Promise {
        let (promise, resolver) = Promise::deferred(scheduler);
        if inputs.is_empty() {
            resolver.reject(Value::Error(PromiseError::Aggregate { errors: Vec::new() }));
            return promise;
        }

        let errors = Rc::new(RefCell::new(vec![Value::Null; inputs.len()]));
        let remaining = Rc::new(Cell::new(inputs.len()));
        for (index, input) in inputs.into_iter().enumerate() {
            let on_fulfilled = {
                let resolver = resolver.clone();
                handler(move |value: Value| {
                    resolver.resolve(value);
                    Ok(Value::Null)
                })
            };
            let on_rejected = {
                let errors = errors.clone();
                let remaining = remaining.clone();
                let resolver = resolver.clone();
                handler(move |reason: Value| {
                    errors.borrow_mut()[index] = reason;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        resolver.reject(Value::Error(PromiseError::Aggregate {
                            errors: errors.borrow().clone(),
                        }));
                    }
                    Ok(Value::Null)
                })
            };
            Promise::resolve(scheduler, input).then(on_fulfilled, on_rejected);
        }
        promise
    }
}

/// Shared rejection arm for short-circuiting combinators: forwards the
/// reason to the resolver and fulfills the throwaway downstream promise so
/// the rejection is not reported a second time.
fn reject_and_absorb(resolver: &Resolver) -> Option<crate::promise::Handler> {
    let resolver = resolver.clone();
    handler(move |reason: Value| {
        resolver.reject(reason);
        Ok(Value::Null)
    })
}
