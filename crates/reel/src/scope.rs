//! Structured task scope.
//!
//! A [`Scope`] spawns child tasks onto the tokio runtime and joins them as a
//! group. The first child failure cancels the scope's token; every other child
//! is dropped at its next suspension point, and [`Scope::join`] returns that
//! first failure once all children have unwound.
//!
//! ```text
//!   Scope ──spawn──▶ task ─┐
//!         ──spawn──▶ task ─┼──▶ join(): wait all, first error wins
//!         ──spawn──▶ task ─┘        (error ⇒ token.cancel())
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ReelError, Result};

/// Cloneable handle to a group of child tasks sharing one cancellation token.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    failure: Mutex<Option<ReelError>>,
}

impl ScopeInner {
    fn fail(&self, err: ReelError) {
        if let Ok(mut slot) = self.failure.lock() {
            if slot.is_none() {
                tracing::debug!(error = %err, "scope task failed; cancelling siblings");
                *slot = Some(err);
            }
        }
        self.token.cancel();
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Create a root scope.
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    fn with_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token,
                tasks: Mutex::new(Vec::new()),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Create a nested scope that is cancelled whenever `self` is.
    ///
    /// Failures inside the child only cancel the child; they reach the parent
    /// through whatever awaits the child's [`join`](Self::join).
    pub fn child(&self) -> Self {
        Self::with_token(self.inner.token.child_token())
    }

    /// The token observed by every task of this scope.
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// Cancel every task in this scope (and in nested scopes).
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolve once the scope has been cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await
    }

    /// Spawn a child task.
    ///
    /// The task is dropped when the scope is cancelled. An `Err` result
    /// records the failure and cancels the scope.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let token = self.inner.token.clone();
        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Ok(()),
                r = fut => r,
            };
            if let Err(err) = result {
                inner.fail(err);
            }
        });
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Spawn a child task that observes cancellation on its own.
    ///
    /// Unlike [`spawn`](Self::spawn) the future is not dropped on cancel, so
    /// it can run cleanup (closing processes) before it returns. It must
    /// watch [`token`](Self::token) or a scope derived from this one.
    pub fn spawn_graceful<F>(&self, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = fut.await {
                inner.fail(err);
            }
        });
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(handle);
        }
    }

    /// Wait for every child (including children spawned while waiting).
    ///
    /// Returns the first recorded failure, if any. A scope that was cancelled
    /// from outside without a failure joins successfully.
    pub async fn join(&self) -> Result<()> {
        loop {
            let batch: Vec<JoinHandle<()>> = match self.inner.tasks.lock() {
                Ok(mut tasks) => std::mem::take(&mut *tasks),
                Err(_) => Vec::new(),
            };
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        self.inner.fail(ReelError::TaskPanicked(e.to_string()));
                    }
                }
            }
        }
        match self.inner.failure.lock() {
            Ok(mut slot) => match slot.take() {
                Some(err) => Err(err),
                None => Ok(()),
            },
            Err(_) => Ok(()),
        }
    }
}
