use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::value::Value;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// The external microtask collaborator.
///
/// Implementations must run tasks in FIFO order, and a task scheduled while
/// another task (or the caller's synchronous code) is running must not start
/// until that code has finished. Continuation bodies rely on this to never
/// run inside the call that attached or settled them.
pub trait Scheduler {
    fn schedule(&self, task: Task);

    /// Diagnostic signal for a rejection that, one tick after settling, had
    /// no reject handler and no downstream consumer. Must not panic or
    /// disturb other promises.
    fn report_unhandled_rejection(&self, reason: &Value) {
        tracing::error!(?reason, "unhandled promise rejection");
    }
}

/// Reference scheduler: a manually stepped FIFO queue.
///
/// Nothing runs until the caller drives the queue, which makes every test
/// deterministic: no threads, no timers.
///
/// ```
/// use std::rc::Rc;
/// use promise_chain::{MicrotaskQueue, Scheduler};
///
/// let queue = MicrotaskQueue::new();
/// let scheduler: Rc<dyn Scheduler> = queue.clone();
/// scheduler.schedule(Box::new(|| println!("later")));
/// assert_eq!(queue.run_until_idle(), 1);
/// ```
pub struct MicrotaskQueue {
    tasks: RefCell<VecDeque<Task>>,
    unhandled: RefCell<Vec<Value>>,
}

impl MicrotaskQueue {
    pub fn new() -> Rc<MicrotaskQueue> {
        Rc::new(MicrotaskQueue {
            tasks: RefCell::new(VecDeque::new()),
            unhandled: RefCell::new(Vec::new()),
        })
    }

    /// Run the oldest queued task. Returns false if the queue was idle.
    pub fn step(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Run tasks, including ones they schedule, until none remain. Returns
    /// how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.step() {
            ran += 1;
        }
        ran
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Rejection reasons reported through
    /// [`Scheduler::report_unhandled_rejection`], in report order.
    pub fn unhandled_rejections(&self) -> Vec<Value> {
        self.unhandled.borrow().clone()
    }
}

impl Scheduler for MicrotaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn report_unhandled_rejection(&self, reason: &Value) {
        tracing::error!(?reason, "unhandled promise rejection");
        self.unhandled.borrow_mut().push(reason.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{MicrotaskQueue, Scheduler};

    #[test]
    fn test_tasks_run_in_fifo_order() {
        let queue = MicrotaskQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            queue.schedule(Box::new(move || order.borrow_mut().push(i)));
        }
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_task_scheduled_during_step_runs_on_a_later_step() {
        let queue = MicrotaskQueue::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let queue = queue.clone();
            let order = order.clone();
            let inner_order = order.clone();
            queue.clone().schedule(Box::new(move || {
                order.borrow_mut().push("outer");
                queue.schedule(Box::new(move || inner_order.borrow_mut().push("inner")));
            }));
        }
        assert!(queue.step());
        assert_eq!(*order.borrow(), vec!["outer"]);
        assert!(queue.step());
        assert_eq!(*order.borrow(), vec!["outer", "inner"]);
        assert!(!queue.step());
    }

    #[test]
    fn test_idle_queue_reports_idle() {
        let queue = MicrotaskQueue::new();
        assert!(queue.is_idle());
        assert!(!queue.step());
        assert_eq!(queue.run_until_idle(), 0);
    }
}
