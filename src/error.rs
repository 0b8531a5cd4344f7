use thiserror::Error;

use crate::value::Value;

/// Errors the promise machinery itself produces as rejection reasons.
///
/// These are carried inside [`Value::Error`] so they flow through chains
/// like any other rejection reason.
///
/// [`Value::Error`]: crate::Value::Error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PromiseError {
    /// A promise was resolved, directly or indirectly, with itself.
    #[error("chaining cycle detected for promise")]
    ChainingCycle,

    /// Every input to [`Promise::any`] rejected. The reasons are
    /// index-aligned with the inputs.
    ///
    /// [`Promise::any`]: crate::Promise::any
    #[error("all promises were rejected")]
    Aggregate { errors: Vec<Value> },
}
