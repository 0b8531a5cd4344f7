//! Promises/A+ style deferred values for single-threaded, cooperatively
//! scheduled code.
//!
//! A [`Promise`] starts pending, settles exactly once (fulfilled with a
//! [`Value`] or rejected with a reason) and runs attached continuations
//! after settlement, whether they were attached before or after it. The
//! interesting parts are the settle-once state machine, the resolution
//! procedure that flattens nested promises and adopts foreign
//! [`Thenable`]s, and the combinators ([`Promise::all`], [`Promise::race`],
//! [`Promise::all_settled`], [`Promise::any`]) built on top.
//!
//! All deferral goes through an injected [`Scheduler`]. The bundled
//! [`MicrotaskQueue`] is a manually stepped FIFO queue, so everything
//! here, the examples below included, is deterministic.
//!
//! ```
//! use std::rc::Rc;
//! use promise_chain::{handler, MicrotaskQueue, Promise, Scheduler, Value};
//!
//! let queue = MicrotaskQueue::new();
//! let scheduler: Rc<dyn Scheduler> = queue.clone();
//!
//! let (promise, resolver) = Promise::deferred(&scheduler);
//! let greeting = promise.then(
//!     handler(|value| match value {
//!         Value::Str(name) => Ok(Value::Str(format!("hello, {name}"))),
//!         other => Ok(other),
//!     }),
//!     None,
//! );
//!
//! resolver.resolve(Value::from("world"));
//! queue.run_until_idle();
//! assert_eq!(greeting.result(), Some(Value::from("hello, world")));
//! ```

mod combinators;
mod error;
mod promise;
mod resolve;
mod scheduler;
mod value;

pub use error::PromiseError;
pub use promise::{handler, Handler, Promise, Resolver, State};
pub use scheduler::{MicrotaskQueue, Scheduler, Task};
pub use value::{Outcome, ThenCallback, Thenable, Value};
