//! Evaluation gateway - the bridge between decoded requests and the
//! embedded engine.
//!
//! The engine itself is opaque: anything implementing [`EvalEngine`] can sit
//! behind the bridge. The gateway guarantees two things the protocol layer
//! relies on:
//!
//! - at most one evaluation runs at a time, process-wide (the engine is a
//!   single shared instance that is not safe for concurrent use)
//! - no input can take the host process down; engine errors and panics both
//!   come back as [`EvalOutcome::Failure`]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::protocol::EvalOutcome;

/// An embedded evaluation engine.
///
/// `evaluate` submits one piece of source text and returns either the
/// serialized value representation or an error description. The
/// `output_dir` is the compiler-output directory the engine should resolve
/// modules against; the bridge never touches it, it is passed straight
/// through from construction.
///
/// Evaluation may mutate engine state by design; successive calls on one
/// connection (or across connections) observe each other's side effects.
pub trait EvalEngine: Send + 'static {
    /// Evaluate `source`, resolving modules relative to `output_dir`.
    fn evaluate(&mut self, source: &str, output_dir: &Path) -> Result<String, String>;
}

impl<F> EvalEngine for F
where
    F: FnMut(&str, &Path) -> Result<String, String> + Send + 'static,
{
    fn evaluate(&mut self, source: &str, output_dir: &Path) -> Result<String, String> {
        self(source, output_dir)
    }
}

/// Shared handle to the engine plus its module-resolution path.
///
/// Cloning is cheap; all clones serialize through the same engine lock.
#[derive(Clone)]
pub struct Gateway {
    engine: Arc<Mutex<Box<dyn EvalEngine>>>,
    output_dir: PathBuf,
}

impl Gateway {
    /// Wrap an engine and its compiler-output directory.
    pub fn new(engine: Box<dyn EvalEngine>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            output_dir: output_dir.into(),
        }
    }

    /// The compiler-output directory the engine resolves modules against.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Evaluate one piece of source text.
    ///
    /// The engine call is blocking from the session's point of view, so it
    /// runs on the blocking pool while this future awaits. The engine lock
    /// is held for the duration of the call and released by the finishing
    /// call even if the session that submitted it has been cancelled.
    pub async fn evaluate(&self, source: String) -> EvalOutcome {
        let engine = Arc::clone(&self.engine);
        let output_dir = self.output_dir.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            catch_unwind(AssertUnwindSafe(|| guard.evaluate(&source, &output_dir)))
        })
        .await;

        match joined {
            Ok(Ok(Ok(value))) => EvalOutcome::Success(value),
            Ok(Ok(Err(error))) => EvalOutcome::Failure(error),
            Ok(Err(panic)) => {
                let message = panic_message(&panic);
                tracing::warn!("engine panicked during evaluation: {message}");
                EvalOutcome::Failure(format!("engine panicked: {message}"))
            }
            Err(join_error) => {
                tracing::error!("evaluation task failed: {join_error}");
                EvalOutcome::Failure(format!("evaluation task failed: {join_error}"))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
