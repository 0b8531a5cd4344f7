use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PromiseError;
use crate::resolve::resolve_value;
use crate::scheduler::Scheduler;
use crate::value::Value;

/// Settlement state. Monotonic: once a promise leaves `Pending` it never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// A continuation handler. `Ok` feeds the returned value into the
/// resolution procedure of the downstream promise; `Err` models a throw and
/// rejects it.
pub type Handler = Box<dyn FnOnce(Value) -> Result<Value, Value>>;

/// Convenience wrapper for [`Promise::then`] arguments.
pub fn handler<F>(f: F) -> Option<Handler>
where
    F: FnOnce(Value) -> Result<Value, Value> + 'static,
{
    Some(Box::new(f))
}

type Continuation = Box<dyn FnOnce(Value)>;

struct Inner {
    state: State,
    result: Option<Value>,
    on_fulfilled: Vec<Continuation>,
    on_rejected: Vec<Continuation>,
    /// Set once `then`/`catch`/`finally` (or internal adoption) attaches.
    has_consumer: bool,
    /// Reject handlers queued while still pending.
    reject_observers: usize,
}

/// A settle-once container for a [`Value`].
///
/// Cloning is cheap and clones observe the same settlement. A promise is
/// mutated only through its own [`Resolver`] (or the handlers of an upstream
/// promise); the first settlement wins and every later attempt is a no-op.
///
/// ```
/// use std::rc::Rc;
/// use promise_chain::{handler, MicrotaskQueue, Promise, Scheduler, Value};
///
/// let queue = MicrotaskQueue::new();
/// let scheduler: Rc<dyn Scheduler> = queue.clone();
/// let doubled = Promise::new(&scheduler, |resolver| {
///     resolver.resolve(Value::Int(21));
///     Ok(())
/// })
/// .then(
///     handler(|value| match value {
///         Value::Int(n) => Ok(Value::Int(n * 2)),
///         other => Ok(other),
///     }),
///     None,
/// );
/// queue.run_until_idle();
/// assert_eq!(doubled.result(), Some(Value::Int(42)));
/// ```
#[derive(Clone)]
pub struct Promise {
    inner: Rc<RefCell<Inner>>,
    scheduler: Rc<dyn Scheduler>,
}

/// The settle half of a deferred pair. Cloneable; racing clones is safe
/// because settlement is first-write-wins.
#[derive(Clone)]
pub struct Resolver {
    promise: Promise,
}

impl Resolver {
    /// Resolve with an arbitrary value: plain values fulfill, promises and
    /// thenables are adopted, the promise itself rejects with a
    /// chaining-cycle error.
    pub fn resolve(&self, value: Value) {
        resolve_value(&self.promise, value);
    }

    /// Reject with a reason. Reasons are opaque: a promise passed here is
    /// not unwrapped.
    pub fn reject(&self, reason: Value) {
        self.promise.settle_rejected(reason);
    }

    /// The promise this resolver settles.
    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }
}

impl Promise {
    fn pending(scheduler: &Rc<dyn Scheduler>) -> Promise {
        Promise {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                result: None,
                on_fulfilled: Vec::new(),
                on_rejected: Vec::new(),
                has_consumer: false,
                reject_observers: 0,
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Create a deferred pair: a pending promise plus the resolver that
    /// settles it.
    pub fn deferred(scheduler: &Rc<dyn Scheduler>) -> (Promise, Resolver) {
        let promise = Promise::pending(scheduler);
        let resolver = Resolver {
            promise: promise.clone(),
        };
        (promise, resolver)
    }

    /// Run `executor` synchronously with the new promise's resolver. An
    /// `Err` return models a synchronous throw and rejects the promise,
    /// unless the executor already settled it.
    pub fn new<F>(scheduler: &Rc<dyn Scheduler>, executor: F) -> Promise
    where
        F: FnOnce(Resolver) -> Result<(), Value>,
    {
        let (promise, resolver) = Promise::deferred(scheduler);
        if let Err(thrown) = executor(resolver.clone()) {
            resolver.reject(thrown);
        }
        promise
    }

    pub fn state(&self) -> State {
        self.inner.borrow().state
    }

    /// The settled value or reason; `None` while pending.
    pub fn result(&self) -> Option<Value> {
        self.inner.borrow().result.clone()
    }

    /// Reference identity, the relation used for cycle detection.
    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.scheduler
    }

    /// Attach continuations, returning the downstream promise they settle.
    ///
    /// Missing handlers are normalized to identity (fulfillment) or rethrow
    /// (rejection) so values and reasons propagate through gaps in a chain.
    /// Handler bodies always run on the scheduler, never inside this call.
    pub fn then(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let on_fulfilled = on_fulfilled.unwrap_or_else(|| Box::new(Ok));
        let on_rejected = on_rejected.unwrap_or_else(|| Box::new(Err));

        let downstream = Promise::pending(&self.scheduler);
        let fulfill = continuation(&self.scheduler, on_fulfilled, downstream.clone());
        let reject = continuation(&self.scheduler, on_rejected, downstream.clone());

        let mut inner = self.inner.borrow_mut();
        inner.has_consumer = true;
        match inner.state {
            State::Pending => {
                inner.reject_observers += 1;
                inner.on_fulfilled.push(fulfill);
                inner.on_rejected.push(reject);
            }
            State::Fulfilled => {
                let value = inner.result.clone();
                drop(inner);
                if let Some(value) = value {
                    fulfill(value);
                }
            }
            State::Rejected => {
                let reason = inner.result.clone();
                drop(inner);
                if let Some(reason) = reason {
                    reject(reason);
                }
            }
        }
        downstream
    }

    /// Sugar for `then(None, Some(on_rejected))`.
    pub fn catch<F>(&self, on_rejected: F) -> Promise
    where
        F: FnOnce(Value) -> Result<Value, Value> + 'static,
    {
        self.then(None, handler(on_rejected))
    }

    /// Run `on_settled` on either outcome. Its return value is discarded,
    /// except that a returned promise or thenable is awaited first; the
    /// original value is then passed through, or the original reason
    /// rethrown. A throw from `on_settled` replaces the outcome.
    pub fn finally<F>(&self, on_settled: F) -> Promise
    where
        F: Fn() -> Result<Value, Value> + 'static,
    {
        let on_settled = Rc::new(on_settled);

        let on_fulfilled = {
            let scheduler = self.scheduler.clone();
            let on_settled = on_settled.clone();
            Box::new(move |value: Value| {
                let side = Promise::resolve(&scheduler, on_settled()?);
                Ok(Value::Promise(
                    side.then(handler(move |_| Ok(value)), None),
                ))
            }) as Handler
        };
        let on_rejected = {
            let scheduler = self.scheduler.clone();
            Box::new(move |reason: Value| {
                let side = Promise::resolve(&scheduler, on_settled()?);
                Ok(Value::Promise(
                    side.then(handler(move |_| Err(reason)), None),
                ))
            }) as Handler
        };
        self.then(Some(on_fulfilled), Some(on_rejected))
    }

    /// Raw attachment used by adoption and the resolution procedure. The
    /// callbacks run at settlement time if pending, or on the next
    /// scheduler tick if already settled.
    pub(crate) fn subscribe(&self, on_fulfilled: Continuation, on_rejected: Continuation) {
        let mut inner = self.inner.borrow_mut();
        inner.has_consumer = true;
        match inner.state {
            State::Pending => {
                inner.reject_observers += 1;
                inner.on_fulfilled.push(on_fulfilled);
                inner.on_rejected.push(on_rejected);
            }
            State::Fulfilled => {
                let value = inner.result.clone();
                drop(inner);
                if let Some(value) = value {
                    self.scheduler.schedule(Box::new(move || on_fulfilled(value)));
                }
            }
            State::Rejected => {
                let reason = inner.result.clone();
                drop(inner);
                if let Some(reason) = reason {
                    self.scheduler.schedule(Box::new(move || on_rejected(reason)));
                }
            }
        }
    }

    /// Fulfill, adopting the outcome first when handed another promise.
    /// Fulfilling a promise with itself is a chaining cycle and rejects
    /// instead. No-op once settled.
    pub(crate) fn settle_fulfilled(&self, value: Value) {
        if self.state() != State::Pending {
            return;
        }
        match value {
            Value::Promise(ref other) if self.ptr_eq(other) => {
                self.settle_rejected(Value::Error(PromiseError::ChainingCycle));
            }
            Value::Promise(other) => {
                let fulfill_target = self.clone();
                let reject_target = self.clone();
                other.subscribe(
                    Box::new(move |value| fulfill_target.settle_fulfilled(value)),
                    Box::new(move |reason| reject_target.settle_rejected(reason)),
                );
            }
            value => {
                let callbacks = {
                    let mut inner = self.inner.borrow_mut();
                    if inner.state != State::Pending {
                        return;
                    }
                    inner.state = State::Fulfilled;
                    inner.result = Some(value.clone());
                    inner.on_rejected.clear();
                    std::mem::take(&mut inner.on_fulfilled)
                };
                for callback in callbacks {
                    callback(value.clone());
                }
            }
        }
    }

    /// Reject. No-op once settled. One tick later, a probe reports the
    /// rejection as unhandled if no reject handler was ever queued and no
    /// consumer ever attached. This is a heuristic, not a guarantee: a
    /// consumer attached after the probe window is not detected.
    pub(crate) fn settle_rejected(&self, reason: Value) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != State::Pending {
                return;
            }
            inner.state = State::Rejected;
            inner.result = Some(reason.clone());
            inner.on_fulfilled.clear();
            std::mem::take(&mut inner.on_rejected)
        };
        for callback in callbacks {
            callback(reason.clone());
        }

        let probe = self.clone();
        self.scheduler.schedule(Box::new(move || {
            let unobserved = {
                let inner = probe.inner.borrow();
                if inner.reject_observers == 0 && !inner.has_consumer {
                    inner.result.clone()
                } else {
                    None
                }
            };
            if let Some(reason) = unobserved {
                probe.scheduler.report_unhandled_rejection(&reason);
            }
        }));
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("fulfill_queue", &inner.on_fulfilled.len())
            .field("reject_queue", &inner.on_rejected.len())
            .finish()
    }
}

/// The continuation shim: defers the handler body onto the scheduler and
/// feeds its outcome into the downstream promise, so handlers never run
/// inside the call that attached or settled them and their throws become
/// rejections instead of escaping.
fn continuation(
    scheduler: &Rc<dyn Scheduler>,
    handler: Handler,
    downstream: Promise,
) -> Continuation {
    let scheduler = scheduler.clone();
    Box::new(move |settled: Value| {
        scheduler.schedule(Box::new(move || match handler(settled) {
            Ok(next) => resolve_value(&downstream, next),
            Err(thrown) => downstream.settle_rejected(thrown),
        }));
    })
}
