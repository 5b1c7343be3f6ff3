//! Cached, deduplicated access to a capability.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::chat::capability::{
    Availability, Capability, CapabilityError, CapabilityFuture, CapabilityResult,
};

/// Type-erased gateway used by the orchestrator.
pub trait Gateway<K, I, O>: Send + Sync {
    /// Acquire the handle for `key` and run the domain call.
    ///
    /// # Errors
    /// Returns acquisition or call failures unchanged.
    fn invoke(&self, key: K, input: I) -> CapabilityFuture<'_, CapabilityResult<O>>;

    /// Whether at least one invocation is in flight.
    fn is_busy(&self) -> bool;
}

type HandleCell<H> = Arc<OnceCell<Arc<H>>>;

/// Lowers the in-flight counter when dropped.
struct BusyGuard<'a>(&'a AtomicUsize);

impl<'a> BusyGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Gateway caching one handle per configuration key.
///
/// Concurrent first calls for the same key share a single provisioning; a
/// failed provisioning leaves the slot empty so the next call retries.
pub struct CapabilityGateway<C: Capability> {
    capability: C,
    handles: DashMap<C::Key, HandleCell<C::Handle>>,
    in_flight: AtomicUsize,
}

impl<C: Capability> CapabilityGateway<C> {
    /// Wrap a capability.
    #[must_use]
    pub fn new(capability: C) -> Self {
        Self {
            capability,
            handles: DashMap::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Borrow the wrapped capability.
    #[must_use]
    pub const fn capability(&self) -> &C {
        &self.capability
    }

    /// Number of cached handles.
    #[must_use]
    pub fn cached_handles(&self) -> usize {
        self.handles.iter().filter(|cell| cell.initialized()).count()
    }

    /// Return the cached handle for `key`, provisioning it on first use.
    ///
    /// # Errors
    /// Returns `Unsupported`, `Unavailable` or any provisioning failure.
    pub async fn acquire(&self, key: &C::Key) -> CapabilityResult<Arc<C::Handle>> {
        let cell: HandleCell<C::Handle> =
            Arc::clone(self.handles.entry(key.clone()).or_default().value());
        let handle = cell.get_or_try_init(|| self.provision(key)).await?;
        Ok(Arc::clone(handle))
    }

    async fn provision(&self, key: &C::Key) -> CapabilityResult<Arc<C::Handle>> {
        let kind = self.capability.kind();
        if !self.capability.is_supported() {
            return Err(CapabilityError::Unsupported { kind });
        }

        let handle = match self.capability.availability(key).await? {
            Availability::No => {
                return Err(CapabilityError::Unavailable {
                    kind,
                    scope: self.capability.describe(key),
                });
            }
            Availability::Readily => {
                debug!(%kind, "Capability readily available");
                self.capability.provision(key).await?
            }
            Availability::AfterDownload => {
                info!(%kind, scope = %self.capability.describe(key), "Provisioning capability");
                let handle = self.capability.provision(key).await?;
                self.capability.wait_ready(&handle).await?;
                handle
            }
        };

        info!(%kind, "Capability ready");
        Ok(Arc::new(handle))
    }

    /// Acquire and call, keeping the busy flag raised for the duration.
    ///
    /// # Errors
    /// Returns acquisition or call failures unchanged.
    pub async fn run(&self, key: C::Key, input: C::Input) -> CapabilityResult<C::Output> {
        let _busy = BusyGuard::enter(&self.in_flight);
        let handle = self.acquire(&key).await?;
        self.capability.call(&handle, input).await
    }
}

impl<C: Capability> Gateway<C::Key, C::Input, C::Output> for CapabilityGateway<C> {
    fn invoke(
        &self,
        key: C::Key,
        input: C::Input,
    ) -> CapabilityFuture<'_, CapabilityResult<C::Output>> {
        Box::pin(self.run(key, input))
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::capability::CapabilityKind;
    use crate::chat::capability::scripted::Scripted;

    fn echo(availability: Availability) -> CapabilityGateway<Scripted<String, String, String>> {
        CapabilityGateway::new(
            Scripted::new(CapabilityKind::Generation, |_key: &String, input: String| {
                Ok(format!("echo: {input}"))
            })
            .with_availability(availability),
        )
    }

    #[tokio::test]
    async fn test_handle_cached_per_key() {
        let gateway = echo(Availability::Readily);
        let first = gateway.run("a".to_string(), "hi".to_string()).await;
        assert_eq!(first.ok().as_deref(), Some("echo: hi"));
        let _ = gateway.run("a".to_string(), "again".to_string()).await;
        let _ = gateway.run("b".to_string(), "other".to_string()).await;

        assert_eq!(gateway.capability().provisions(), 2);
        assert_eq!(gateway.cached_handles(), 2);
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn test_after_download_waits_for_ready() {
        let gateway = echo(Availability::AfterDownload);
        let result = gateway.run("a".to_string(), "hi".to_string()).await;
        assert!(result.is_ok());
        assert_eq!(gateway.capability().ready_waits(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_not_cached() {
        let gateway = echo(Availability::No);
        let result = gateway.run("a".to_string(), "hi".to_string()).await;
        assert!(matches!(result, Err(CapabilityError::Unavailable { .. })));
        assert_eq!(gateway.cached_handles(), 0);
        assert_eq!(gateway.capability().provisions(), 0);
    }

    #[tokio::test]
    async fn test_unsupported() {
        let gateway = CapabilityGateway::new(
            Scripted::new(CapabilityKind::Translation, |_: &String, input: String| Ok(input))
                .unsupported(),
        );
        let result = gateway.run("a".to_string(), "hi".to_string()).await;
        match result {
            Err(err) => assert_eq!(err.to_string(), "translator not supported"),
            Ok(_) => panic!("expected unsupported"),
        }
        assert!(!gateway.is_busy());
    }

    #[tokio::test]
    async fn test_call_failure_clears_busy() {
        let gateway = CapabilityGateway::new(Scripted::new(
            CapabilityKind::Summarization,
            |_: &String, _input: String| -> CapabilityResult<String> {
                Err(CapabilityError::Call {
                    kind: CapabilityKind::Summarization,
                    message: "model crashed".to_string(),
                })
            },
        ));
        let result = gateway.run("a".to_string(), "text".to_string()).await;
        assert!(result.is_err());
        assert!(!gateway.is_busy());
        assert_eq!(gateway.cached_handles(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_acquire_provisions_once() {
        let gateway = Arc::new(echo(Availability::AfterDownload));
        let mut tasks = Vec::new();
        for i in 0..16 {
            let gateway = Arc::clone(&gateway);
            tasks.push(tokio::spawn(async move {
                gateway.run("shared".to_string(), format!("msg {i}")).await
            }));
        }
        for task in tasks {
            let result = task.await;
            assert!(matches!(result, Ok(Ok(_))));
        }
        assert_eq!(gateway.capability().provisions(), 1);
    }
}
