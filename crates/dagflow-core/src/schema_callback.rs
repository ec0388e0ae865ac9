//! Single-execution schema-prediction callback.
//!
//! Mirrors `NodeStep._predicted_data_getter`: at most one invocation of the
//! underlying generator runs at a time. A caller that arrives mid-execution
//! blocks on the same guard the in-flight call holds, so it observes that
//! call's result once it completes rather than racing a second invocation —
//! this is what the source's "generator already executing" `ValueError`
//! guards against.

use crate::error::Result;
use crate::schema::Schema;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

type Generator = dyn Fn() -> Pin<Box<dyn Future<Output = Result<Schema>> + Send>> + Send + Sync;

#[derive(Clone)]
pub struct SchemaCallback {
    generator: Arc<Generator>,
    guard: Arc<Mutex<()>>,
    cached: Arc<Mutex<Option<Schema>>>,
}

impl SchemaCallback {
    pub fn new<F, Fut>(generator: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Schema>> + Send + 'static,
    {
        Self {
            generator: Arc::new(move || Box::pin(generator())),
            guard: Arc::new(Mutex::new(())),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Drop the cached prediction, forcing the next `get` to re-run the
    /// generator (called when an upstream schema changes).
    pub async fn reset(&self) {
        *self.cached.lock().await = None;
    }

    pub async fn get(&self) -> Result<Schema> {
        if let Some(schema) = self.cached.lock().await.clone() {
            return Ok(schema);
        }

        // Block on the same guard an in-flight call holds. Once acquired,
        // re-check the cache: if another caller just finished while we
        // waited, its result is already there and we share it instead of
        // running the generator a second time.
        let _permit = self.guard.lock().await;
        if let Some(schema) = self.cached.lock().await.clone() {
            return Ok(schema);
        }
        self.run_and_cache().await
    }

    async fn run_and_cache(&self) -> Result<Schema> {
        let result = (self.generator)().await;
        if let Ok(schema) = &result {
            *self.cached.lock().await = Some(schema.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DType, SchemaField};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn caches_after_first_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cb = SchemaCallback::new(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![SchemaField::new("a", DType::Int64)])
            }
        });

        cb.get().await.unwrap();
        cb.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cb = SchemaCallback::new(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![SchemaField::new("a", DType::Int64)])
            }
        });

        let (a, b, c) = tokio::join!(cb.get(), cb.get(), cb.get());
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_forces_recomputation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cb = SchemaCallback::new(move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![SchemaField::new("a", DType::Int64)])
            }
        });

        cb.get().await.unwrap();
        cb.reset().await;
        cb.get().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
