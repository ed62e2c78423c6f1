//! Host registration: named view renderers and the configuration hosts supply.
//!
//! A host keeps a `RendererRegistry` and picks a renderer by name at render
//! time. `register_defaults` installs the bridge under `ENGINE_NAME`, built
//! from the host's views directory.

use crate::{BridgeConfig, Error, RenderBridge, Result, TemplateContext};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name the bridge is registered under by `register_defaults`.
pub const ENGINE_NAME: &str = "tilt";

/// Configuration supplied by the host application
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Directory holding the templates and the adapter executable
    pub views_dir: PathBuf,
    /// Bridge settings; defaults apply when omitted
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl HostConfig {
    pub fn new(views_dir: impl Into<PathBuf>) -> Self {
        Self {
            views_dir: views_dir.into(),
            bridge: BridgeConfig::default(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        crate::read_json_config(path.as_ref())
    }
}

/// Something that turns a template path and context into output bytes.
pub trait ViewRenderer: Send + Sync {
    /// Render the template at `path` (relative to the renderer's views directory).
    fn make(&self, path: &str, context: &TemplateContext) -> Result<Vec<u8>>;

    /// Whether hosts may cache this renderer's output. Renders are never cached by default.
    fn should_cache(&self) -> bool {
        false
    }
}

impl ViewRenderer for RenderBridge {
    fn make(&self, path: &str, context: &TemplateContext) -> Result<Vec<u8>> {
        self.render(path, context)
    }
}

impl RenderBridge {
    /// Build a bridge from the host's views directory and bridge settings.
    pub fn from_host_config(host: &HostConfig) -> Result<Self> {
        RenderBridge::new(host.views_dir.clone(), host.bridge.clone())
    }
}

/// Renderers keyed by engine name
#[derive(Default, Clone)]
pub struct RendererRegistry {
    renderers: BTreeMap<String, Arc<dyn ViewRenderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `renderer` under `name`, returning any renderer it replaced.
    pub fn register<R>(&mut self, name: impl Into<String>, renderer: R) -> Option<Arc<dyn ViewRenderer>>
    where
        R: ViewRenderer + 'static,
    {
        self.renderers.insert(name.into(), Arc::new(renderer))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ViewRenderer>> {
        self.renderers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.renderers.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(String::as_str)
    }

    /// Render through the renderer registered as `name`.
    pub fn render(&self, name: &str, path: &str, context: &TemplateContext) -> Result<Vec<u8>> {
        let renderer = self
            .renderers
            .get(name)
            .ok_or_else(|| Error::RendererNotFound(name.to_string()))?;
        renderer.make(path, context)
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("renderers", &self.renderers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Install the bridge under `ENGINE_NAME` using the host configuration.
pub fn register_defaults(registry: &mut RendererRegistry, host: &HostConfig) -> Result<()> {
    let bridge = RenderBridge::from_host_config(host)?;
    if registry.register(ENGINE_NAME, bridge).is_some() {
        log::debug!("replaced existing '{}' renderer", ENGINE_NAME);
    }
    Ok(())
}
