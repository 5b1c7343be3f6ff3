//! Scripted capability used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::chat::capability::{
    Availability, Capability, CapabilityFuture, CapabilityKind, CapabilityResult,
};

type Responder<K, I, O> = Box<dyn Fn(&K, I) -> CapabilityResult<O> + Send + Sync>;

/// Capability answering from a closure and counting lifecycle calls.
pub struct Scripted<K, I, O> {
    kind: CapabilityKind,
    supported: bool,
    availability: Availability,
    responder: Responder<K, I, O>,
    provisions: AtomicUsize,
    ready_waits: AtomicUsize,
    calls: AtomicUsize,
}

impl<K, I, O> Scripted<K, I, O> {
    /// Readily available capability answering with `responder`.
    pub fn new(
        kind: CapabilityKind,
        responder: impl Fn(&K, I) -> CapabilityResult<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            supported: true,
            availability: Availability::Readily,
            responder: Box::new(responder),
            provisions: AtomicUsize::new(0),
            ready_waits: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Override the reported availability.
    #[must_use]
    pub const fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    /// Report the family as unsupported by the host.
    #[must_use]
    pub const fn unsupported(mut self) -> Self {
        self.supported = false;
        self
    }

    /// Number of handles provisioned.
    pub fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    /// Number of readiness waits.
    pub fn ready_waits(&self) -> usize {
        self.ready_waits.load(Ordering::SeqCst)
    }

    /// Number of domain calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<K, I, O> Capability for Scripted<K, I, O>
where
    K: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Key = K;
    type Handle = K;
    type Input = I;
    type Output = O;

    fn kind(&self) -> CapabilityKind {
        self.kind
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn describe(&self, key: &K) -> String {
        format!("{} for {key:?}", self.kind)
    }

    fn availability<'a>(
        &'a self,
        _key: &'a K,
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>> {
        Box::pin(async move { Ok(self.availability) })
    }

    fn provision<'a>(&'a self, key: &'a K) -> CapabilityFuture<'a, CapabilityResult<K>> {
        Box::pin(async move {
            self.provisions.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(key.clone())
        })
    }

    fn wait_ready<'a>(&'a self, _handle: &'a K) -> CapabilityFuture<'a, CapabilityResult<()>> {
        Box::pin(async move {
            self.ready_waits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(())
        })
    }

    fn call<'a>(&'a self, handle: &'a K, input: I) -> CapabilityFuture<'a, CapabilityResult<O>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.responder)(handle, input)
        })
    }
}
