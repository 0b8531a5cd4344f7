//! The Promises/A+ resolution procedure: decides how an arbitrary value
//! settles a target promise, unwrapping nested promises and adopting
//! foreign thenables along the way.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::PromiseError;
use crate::promise::Promise;
use crate::value::{ThenCallback, Thenable, Value};

/// Classification of a resolution value against its target. The single
/// capability check happens here; everything downstream is an exhaustive
/// match.
enum Classified {
    /// `x` is the target itself: a chaining cycle.
    SamePromise(Promise),
    /// `x` is another promise of this crate.
    OwnPromise(Promise),
    /// `x` duck-types as a promise via a callable `then`.
    ForeignThenable(Rc<dyn Thenable>),
    /// Anything else settles as-is.
    Plain(Value),
}

fn classify(x: Value, target: &Promise) -> Classified {
    match x {
        Value::Promise(p) if target.ptr_eq(&p) => Classified::SamePromise(p),
        Value::Promise(p) => Classified::OwnPromise(p),
        Value::Thenable(t) => Classified::ForeignThenable(t),
        other => Classified::Plain(other),
    }
}

/// Resolve `target` with `x`.
///
/// Invoked with a continuation's return value, a resolver argument, or a
/// combinator input. Double settlement and double thenable signals are
/// silently ignored; a throw while invoking a foreign `then` becomes a
/// rejection.
pub(crate) fn resolve_value(target: &Promise, x: Value) {
    match classify(x, target) {
        Classified::SamePromise(cycle) => {
            tracing::debug!("promise resolved with itself");
            target.settle_rejected(Value::Error(PromiseError::ChainingCycle));
            // Cycle detection is advisory-first: the promise branch still
            // runs. The subscription is inert because the target has
            // already settled.
            adopt(target, &cycle);
        }
        Classified::OwnPromise(source) => adopt(target, &source),
        Classified::ForeignThenable(thenable) => {
            // Single-shot latch shared by the fulfill, reject and
            // synchronous-throw paths: whichever signal arrives first wins.
            let latch = Rc::new(Cell::new(false));

            let on_fulfilled: ThenCallback = {
                let target = target.clone();
                let latch = latch.clone();
                Rc::new(move |value| {
                    if !latch.replace(true) {
                        resolve_value(&target, value);
                    }
                })
            };
            let on_rejected: ThenCallback = {
                let target = target.clone();
                let latch = latch.clone();
                Rc::new(move |reason| {
                    if !latch.replace(true) {
                        target.settle_rejected(reason);
                    }
                })
            };

            if let Err(thrown) = thenable.call_then(on_fulfilled, on_rejected) {
                if !latch.replace(true) {
                    target.settle_rejected(thrown);
                }
            }
        }
        Classified::Plain(value) => target.settle_fulfilled(value),
    }
}

/// Chain-flattening: `target` adopts the eventual outcome of `source`.
/// Fulfillment re-enters the resolution procedure so nested promises keep
/// unwrapping; rejection propagates directly.
fn adopt(target: &Promise, source: &Promise) {
    let fulfill_target = target.clone();
    let reject_target = target.clone();
    source.subscribe(
        Box::new(move |value| resolve_value(&fulfill_target, value)),
        Box::new(move |reason| reject_target.settle_rejected(reason)),
    );
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::error::PromiseError;
    use crate::scheduler::{MicrotaskQueue, Scheduler};
    use crate::value::{ThenCallback, Thenable, Value};
    use crate::{Promise, State};

    fn queue_and_scheduler() -> (Rc<MicrotaskQueue>, Rc<dyn Scheduler>) {
        let queue = MicrotaskQueue::new();
        let scheduler: Rc<dyn Scheduler> = queue.clone();
        (queue, scheduler)
    }

    struct FulfillsWith(i64);

    impl Thenable for FulfillsWith {
        fn call_then(
            &self,
            on_fulfilled: ThenCallback,
            _on_rejected: ThenCallback,
        ) -> Result<(), Value> {
            on_fulfilled(Value::Int(self.0));
            Ok(())
        }
    }

    struct SignalsEverything;

    impl Thenable for SignalsEverything {
        fn call_then(
            &self,
            on_fulfilled: ThenCallback,
            on_rejected: ThenCallback,
        ) -> Result<(), Value> {
            on_fulfilled(Value::Int(1));
            on_fulfilled(Value::Int(2));
            on_rejected(Value::Str("ignored".into()));
            Ok(())
        }
    }

    struct ThrowsOnThen;

    impl Thenable for ThrowsOnThen {
        fn call_then(
            &self,
            _on_fulfilled: ThenCallback,
            _on_rejected: ThenCallback,
        ) -> Result<(), Value> {
            Err(Value::Str("bad getter".into()))
        }
    }

    struct RejectsThenThrows;

    impl Thenable for RejectsThenThrows {
        fn call_then(
            &self,
            _on_fulfilled: ThenCallback,
            on_rejected: ThenCallback,
        ) -> Result<(), Value> {
            on_rejected(Value::Str("first".into()));
            Err(Value::Str("second".into()))
        }
    }

    #[test]
    fn test_foreign_thenable_is_adopted() {
        let (queue, scheduler) = queue_and_scheduler();
        let (promise, resolver) = Promise::deferred(&scheduler);
        resolver.resolve(Value::Thenable(Rc::new(FulfillsWith(42))));
        queue.run_until_idle();
        assert_eq!(promise.result(), Some(Value::Int(42)));
    }

    #[test]
    fn test_only_first_thenable_signal_counts() {
        let (queue, scheduler) = queue_and_scheduler();
        let (promise, resolver) = Promise::deferred(&scheduler);
        resolver.resolve(Value::Thenable(Rc::new(SignalsEverything)));
        queue.run_until_idle();
        assert_eq!(promise.state(), State::Fulfilled);
        assert_eq!(promise.result(), Some(Value::Int(1)));
    }

    #[test]
    fn test_throw_while_reading_then_rejects() {
        let (queue, scheduler) = queue_and_scheduler();
        let (promise, resolver) = Promise::deferred(&scheduler);
        resolver.resolve(Value::Thenable(Rc::new(ThrowsOnThen)));
        promise.catch(Ok);
        queue.run_until_idle();
        assert_eq!(promise.state(), State::Rejected);
        assert_eq!(promise.result(), Some(Value::Str("bad getter".into())));
    }

    #[test]
    fn test_throw_after_signal_is_ignored() {
        let (queue, scheduler) = queue_and_scheduler();
        let (promise, resolver) = Promise::deferred(&scheduler);
        resolver.resolve(Value::Thenable(Rc::new(RejectsThenThrows)));
        promise.catch(Ok);
        queue.run_until_idle();
        assert_eq!(promise.result(), Some(Value::Str("first".into())));
    }

    #[test]
    fn test_handler_return_value_is_flattened() {
        let (queue, scheduler) = queue_and_scheduler();
        let (promise, resolver) = Promise::deferred(&scheduler);
        let (inner, inner_resolver) = Promise::deferred(&scheduler);

        let chained = promise.then(
            crate::handler(move |_| Ok(Value::Promise(inner.clone()))),
            None,
        );
        resolver.resolve(Value::Null);
        queue.run_until_idle();
        assert_eq!(chained.state(), State::Pending);

        inner_resolver.resolve(Value::Int(5));
        queue.run_until_idle();
        assert_eq!(chained.result(), Some(Value::Int(5)));
    }

    #[test]
    fn test_nested_promises_unwrap_to_the_plain_value() {
        let (queue, scheduler) = queue_and_scheduler();
        let (leaf, leaf_resolver) = Promise::deferred(&scheduler);
        let middle = Promise::new(&scheduler, |resolver| {
            resolver.resolve(Value::Promise(leaf));
            Ok(())
        });
        let (outer, outer_resolver) = Promise::deferred(&scheduler);
        outer_resolver.resolve(Value::Promise(middle));
        leaf_resolver.resolve(Value::Int(5));
        queue.run_until_idle();
        assert_eq!(outer.result(), Some(Value::Int(5)));
    }

    #[test]
    fn test_cycle_rejects_with_dedicated_error() {
        let (queue, scheduler) = queue_and_scheduler();
        let promise = Promise::new(&scheduler, |resolver| {
            resolver.resolve(Value::Promise(resolver.promise()));
            Ok(())
        });
        queue.run_until_idle();
        assert_eq!(
            promise.result(),
            Some(Value::Error(PromiseError::ChainingCycle))
        );
    }

    #[test]
    fn test_latch_outlives_the_call_then_frame() {
        // A thenable that stashes its callbacks and signals them later.
        struct Stashing {
            slot: Rc<std::cell::RefCell<Option<(ThenCallback, ThenCallback)>>>,
        }
        impl Thenable for Stashing {
            fn call_then(
                &self,
                on_fulfilled: ThenCallback,
                on_rejected: ThenCallback,
            ) -> Result<(), Value> {
                *self.slot.borrow_mut() = Some((on_fulfilled, on_rejected));
                Ok(())
            }
        }

        let (queue, scheduler) = queue_and_scheduler();
        let slot = Rc::new(std::cell::RefCell::new(None));
        let (promise, resolver) = Promise::deferred(&scheduler);
        resolver.resolve(Value::Thenable(Rc::new(Stashing { slot: slot.clone() })));
        assert_eq!(promise.state(), State::Pending);

        let (on_fulfilled, on_rejected) = slot.borrow_mut().take().unwrap();
        on_rejected(Value::Str("late reject".into()));
        on_fulfilled(Value::Int(3));
        promise.catch(Ok);
        queue.run_until_idle();
        assert_eq!(promise.result(), Some(Value::Str("late reject".into())));
    }

    #[test]
    fn test_adoption_marks_source_as_consumed() {
        let (queue, scheduler) = queue_and_scheduler();
        let (inner, inner_resolver) = Promise::deferred(&scheduler);
        let (outer, _outer_resolver) = Promise::deferred(&scheduler);
        let observed = Rc::new(Cell::new(false));

        let seen = observed.clone();
        outer.catch(move |reason| {
            seen.set(true);
            Ok(reason)
        });
        crate::resolve::resolve_value(&outer, Value::Promise(inner));
        inner_resolver.reject(Value::Str("inner failure".into()));
        queue.run_until_idle();

        assert!(observed.get());
        // The adopting promise consumed the inner rejection.
        assert!(queue.unhandled_rejections().is_empty());
    }
}
