//! Probe capability and the probe registry.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::Context;

/// A single pass/fail health check against some dependency.
///
/// Implementations should return promptly once `ctx` is cancelled or its
/// deadline passes; the runner abandons them at the deadline regardless.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn check(&self, ctx: &Context) -> anyhow::Result<()>;
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Arc<P> {
    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        (**self).check(ctx).await
    }
}

/// Adapter that turns an async closure into a `Probe`.
pub struct ProbeFn<F>(F);

impl<F, Fut> ProbeFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Probe for ProbeFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn check(&self, ctx: &Context) -> anyhow::Result<()> {
        (self.0)(ctx.clone()).await
    }
}

/// A registered probe together with its name and timeout.
#[derive(Clone)]
pub struct ProbeDescriptor {
    pub name: String,
    pub probe: Arc<dyn Probe>,
    pub timeout: Duration,
}

impl ProbeDescriptor {
    pub fn new(name: impl Into<String>, timeout: Duration, probe: Arc<dyn Probe>) -> Self {
        Self {
            name: name.into(),
            probe,
            timeout,
        }
    }
}

impl fmt::Debug for ProbeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeDescriptor")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Entries {
    /// name → (first registration sequence, descriptor).
    by_name: HashMap<String, (u64, ProbeDescriptor)>,
    next_seq: u64,
}

/// Name-keyed set of probes. Registration replaces by name; rounds work
/// from a copy taken by `snapshot()`.
#[derive(Default)]
pub struct ProbeRegistry {
    entries: RwLock<Entries>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the probe registered under `name`.
    pub async fn register(&self, name: impl Into<String>, timeout: Duration, probe: Arc<dyn Probe>) {
        let descriptor = ProbeDescriptor::new(name, timeout, probe);
        let mut entries = self.entries.write().await;
        let seq = match entries.by_name.get(&descriptor.name) {
            Some((seq, _)) => {
                debug!(probe = %descriptor.name, "replacing registered probe");
                *seq
            }
            None => {
                let seq = entries.next_seq;
                entries.next_seq += 1;
                seq
            }
        };
        entries
            .by_name
            .insert(descriptor.name.clone(), (seq, descriptor));
    }

    /// Copy of all descriptors in first-registration order.
    pub async fn snapshot(&self) -> Vec<ProbeDescriptor> {
        let entries = self.entries.read().await;
        let mut ordered: Vec<_> = entries.by_name.values().cloned().collect();
        drop(entries);
        ordered.sort_by_key(|(seq, _)| *seq);
        ordered.into_iter().map(|(_, d)| d).collect()
    }

    pub async fn names(&self) -> Vec<String> {
        self.snapshot().await.into_iter().map(|d| d.name).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_probe() -> Arc<dyn Probe> {
        Arc::new(ProbeFn::new(|_ctx| async { Ok(()) }))
    }

    fn failing_probe(msg: &'static str) -> Arc<dyn Probe> {
        Arc::new(ProbeFn::new(move |_ctx| async move { Err(anyhow::anyhow!(msg)) }))
    }

    #[tokio::test]
    async fn snapshot_keeps_registration_order() {
        let registry = ProbeRegistry::new();
        registry.register("c", Duration::from_secs(1), ok_probe()).await;
        registry.register("a", Duration::from_secs(1), ok_probe()).await;
        registry.register("b", Duration::from_secs(1), ok_probe()).await;

        assert_eq!(registry.names().await, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn reregistering_replaces_wholesale() {
        let registry = ProbeRegistry::new();
        registry.register("db", Duration::from_secs(1), ok_probe()).await;
        registry.register("cache", Duration::from_secs(1), ok_probe()).await;
        registry
            .register("db", Duration::from_secs(7), failing_probe("down"))
            .await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "db");
        assert_eq!(snapshot[0].timeout, Duration::from_secs(7));

        let ctx = Context::background();
        assert!(snapshot[0].probe.check(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_later_registrations() {
        let registry = ProbeRegistry::new();
        registry.register("a", Duration::from_secs(1), ok_probe()).await;
        let snapshot = registry.snapshot().await;

        registry.register("b", Duration::from_secs(1), ok_probe()).await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn probe_fn_receives_context() {
        let probe = ProbeFn::new(|ctx: Context| async move {
            anyhow::ensure!(ctx.deadline().is_some(), "no deadline");
            Ok(())
        });
        let ctx = Context::background().child_with_timeout(Duration::from_secs(1));
        assert!(probe.check(&ctx).await.is_ok());
        assert!(probe.check(&Context::background()).await.is_err());
    }
}
