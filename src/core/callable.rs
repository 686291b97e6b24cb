//! The invocation seam between jobs and user code.
//!
//! A [`Callable`] is the unit of work a job wraps: it declares how many
//! bound arguments it expects and produces an ordered list of result
//! values when invoked. Arguments and results are `serde_json::Value`s
//! so callers can bind arbitrary data without a custom trait impl per
//! signature.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors produced by a callable at invocation time.
#[derive(Debug, Error)]
pub enum CallError {
    /// The bound arguments do not match what the callable expects
    /// (wrong type or shape).
    #[error("arguments do not match callable signature: {0}")]
    Arguments(String),

    /// The callable ran and failed.
    #[error("{0}")]
    Failed(String),
}

/// An invocable unit of work.
///
/// # Example
///
/// ```ignore
/// use recur::{Callable, CallError};
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct Doubler;
///
/// #[async_trait]
/// impl Callable for Doubler {
///     fn arity(&self) -> usize {
///         1
///     }
///
///     async fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
///         let n = args[0]
///             .as_i64()
///             .ok_or_else(|| CallError::Arguments("expected an integer".into()))?;
///         Ok(vec![Value::from(n * 2)])
///     }
/// }
/// ```
#[async_trait]
pub trait Callable: Send + Sync {
    /// The number of bound arguments this callable expects.
    fn arity(&self) -> usize;

    /// Invoke with the bound arguments, returning result values in
    /// order. An empty result list is valid and publishes nothing.
    async fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError>;
}

/// Adapter wrapping a plain closure as a [`Callable`].
pub struct FnCallable<F> {
    arity: usize,
    f: F,
}

#[async_trait]
impl<F> Callable for FnCallable<F>
where
    F: Fn(Vec<Value>) -> Result<Vec<Value>, CallError> + Send + Sync,
{
    fn arity(&self) -> usize {
        self.arity
    }

    async fn call(&self, args: Vec<Value>) -> Result<Vec<Value>, CallError> {
        (self.f)(args)
    }
}

/// Wrap a closure taking `arity` bound arguments as a [`Callable`].
pub fn from_fn<F>(arity: usize, f: F) -> FnCallable<F>
where
    F: Fn(Vec<Value>) -> Result<Vec<Value>, CallError> + Send + Sync,
{
    FnCallable { arity, f }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_fn_invokes_closure() {
        let callable = from_fn(1, |args| {
            let n = args[0]
                .as_i64()
                .ok_or_else(|| CallError::Arguments("expected an integer".into()))?;
            Ok(vec![Value::from(n + 1)])
        });

        assert_eq!(callable.arity(), 1);
        let out = callable.call(vec![Value::from(41)]).await.unwrap();
        assert_eq!(out, vec![Value::from(42)]);
    }

    #[tokio::test]
    async fn test_from_fn_reports_argument_mismatch() {
        let callable = from_fn(1, |args| {
            args[0]
                .as_str()
                .map(|s| vec![Value::from(s.to_uppercase())])
                .ok_or_else(|| CallError::Arguments("expected a string".into()))
        });

        let err = callable.call(vec![Value::from(7)]).await.unwrap_err();
        assert!(matches!(err, CallError::Arguments(_)));
    }
}
