use crate::{Error, RenderBridge, RenderRequest, Result, TemplateContext};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// An async-friendly render bridge backed by tokio's blocking pool.
///
/// Each render runs the blocking `RenderBridge` on a `spawn_blocking` thread.
/// A semaphore caps how many adapters run at once, so hung adapters can only
/// hold their own permit until their deadline kills them.
#[derive(Clone)]
pub struct AsyncRenderBridge {
    inner: Arc<RenderBridge>,
    permits: Arc<Semaphore>,
    limit: usize,
}

impl AsyncRenderBridge {
    /// Wrap a bridge, sizing the pool from `max_concurrent_renders`.
    pub fn new(bridge: RenderBridge) -> Self {
        let limit = match bridge.config().max_concurrent_renders {
            0 => num_cpus::get().max(1),
            n => n,
        };
        Self {
            inner: Arc::new(bridge),
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn bridge(&self) -> &RenderBridge {
        &self.inner
    }

    /// Maximum number of adapters running at once
    pub fn concurrency_limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free in the pool
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Render `template_name` from the wrapped bridge's template directory.
    pub async fn render(&self, template_name: &str, context: TemplateContext) -> Result<Vec<u8>> {
        let name = template_name.to_string();
        self.run_blocking(move |bridge| bridge.render(&name, &context)).await
    }

    /// Render a request carrying its own template directory.
    pub async fn render_request(&self, request: RenderRequest) -> Result<Vec<u8>> {
        self.run_blocking(move |bridge| bridge.render_request(&request)).await
    }

    /// Render a batch concurrently (bounded by the pool), results in input order.
    pub async fn render_all(&self, requests: Vec<RenderRequest>) -> Vec<Result<Vec<u8>>> {
        stream::iter(requests)
            .map(|request| self.render_request(request))
            .buffered(self.limit)
            .collect()
            .await
    }

    async fn run_blocking<F>(&self, job: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&RenderBridge) -> Result<Vec<u8>> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Other(format!("Render pool closed: {}", e)))?;
        let bridge = self.inner.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(bridge.as_ref())
        })
        .await
        .map_err(|e| Error::Other(format!("Render task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeConfig;

    #[tokio::test]
    async fn limit_follows_config() {
        let bridge = RenderBridge::new(
            "/templates/",
            BridgeConfig {
                max_concurrent_renders: 3,
                ..Default::default()
            },
        )
        .unwrap();
        let pool = AsyncRenderBridge::new(bridge);
        assert_eq!(pool.concurrency_limit(), 3);
        assert_eq!(pool.available_permits(), 3);
    }

    #[tokio::test]
    async fn zero_limit_uses_cpu_count() {
        let bridge = RenderBridge::new("/templates/", BridgeConfig::default()).unwrap();
        let pool = AsyncRenderBridge::new(bridge);
        assert!(pool.concurrency_limit() >= 1);
    }

    #[tokio::test]
    async fn launch_errors_propagate_and_release_permit() {
        let templates = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let bridge = RenderBridge::new(
            templates.path(),
            BridgeConfig {
                scratch_dir: Some(scratch.path().to_path_buf()),
                max_concurrent_renders: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let pool = AsyncRenderBridge::new(bridge);

        let err = pool.render("index.tmpl", TemplateContext::new()).await.unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
        assert_eq!(pool.available_permits(), 1);
    }
}
