//! Tilt Bridge
//!
//! Renders named templates by delegating expansion to an external templating
//! process (the *adapter*) and returning the rendered output as bytes.
//!
//! # How a render works
//!
//! - The context is encoded as JSON and written to the adapter's stdin
//! - The adapter is invoked as `adapter <template_dir> <template_name> <output_path>`
//! - The adapter writes its output to a uniquely named scratch file, which the
//!   bridge reads back and removes
//! - A configurable deadline kills adapters that hang
//!
//! # Example
//!
//! ```no_run
//! use tilt_bridge::{BridgeConfig, RenderBridge, TemplateContext};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig {
//!     timeout_ms: 5_000,
//!     ..Default::default()
//! };
//! let bridge = RenderBridge::new("/srv/app/views/", config)?;
//!
//! let mut context = TemplateContext::new();
//! context.insert("@title".into(), "Hello".into());
//! context.insert("layout".into(), "layouts/main.erb".into());
//!
//! let html = bridge.render("index.erb", &context)?;
//! println!("{}", String::from_utf8_lossy(&html));
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod bridge;
pub mod registry;
pub mod scratch;

// Async facade over the blocking bridge (bounded blocking pool)
#[cfg(feature = "async")]
pub mod async_api;

pub use bridge::RenderBridge;
pub use registry::{register_defaults, HostConfig, RendererRegistry, ViewRenderer, ENGINE_NAME};
pub use scratch::ScratchFile;

#[cfg(feature = "async")]
pub use async_api::AsyncRenderBridge;

/// Ordered mapping passed to the adapter as a JSON object.
///
/// Insertion order is kept when encoding (serde_json `preserve_order`).
pub type TemplateContext = serde_json::Map<String, serde_json::Value>;

/// Keys starting with this sigil are exposed by the adapter as instance variables.
///
/// The bridge never interprets it; it is exported for callers building contexts.
pub const INSTANCE_VARIABLE_SIGIL: char = '@';

/// Key the adapter reads to select a layout template.
pub const LAYOUT_KEY: &str = "layout";

/// Payload returned in lenient mode when the adapter produced no output.
pub const FATAL_TEMPLATE_ERROR: &[u8] = b"Fatal Template Error";

/// Whether `output` is the lenient-mode failure payload.
pub fn is_fatal_sentinel(output: &[u8]) -> bool {
    output == FATAL_TEMPLATE_ERROR
}

/// Turn an arbitrary JSON value into a context.
///
/// `null` becomes the empty context; any other non-object value is rejected.
pub fn context_from_value(value: serde_json::Value) -> Result<TemplateContext> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(TemplateContext::new()),
        other => Err(Error::InvalidContext(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// How the bridge reports an adapter that failed or produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Non-zero exit or a missing output file raise `Error::RenderFailure`
    #[default]
    Strict,
    /// Non-zero exit is logged; a missing output file yields `FATAL_TEMPLATE_ERROR`
    Lenient,
}

/// Configuration for the render bridge
///
/// Defaults are conservative: strict failure reporting and a 30 second
/// deadline per render.
///
/// # Examples
///
/// ```
/// let cfg = tilt_bridge::BridgeConfig::default();
/// assert_eq!(cfg.adapter_name, "adapter");
/// assert_eq!(cfg.failure_mode, tilt_bridge::FailureMode::Strict);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// File name of the adapter executable inside the template directory
    pub adapter_name: String,
    /// Directory holding scratch files (defaults to `<temp>/tilt-bridge`)
    pub scratch_dir: Option<PathBuf>,
    /// Deadline for a single render in milliseconds (0 => no deadline)
    pub timeout_ms: u64,
    /// Strict (error) or lenient (sentinel payload) failure reporting
    pub failure_mode: FailureMode,
    /// Maximum number of stderr bytes kept for error reports
    pub stderr_limit: usize,
    /// Concurrent renders allowed by the async facade (0 => number of CPUs)
    pub max_concurrent_renders: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adapter_name: "adapter".to_string(),
            scratch_dir: None,
            timeout_ms: 30_000,
            failure_mode: FailureMode::Strict,
            stderr_limit: 64 * 1024,
            max_concurrent_renders: 0,
        }
    }
}

impl BridgeConfig {
    /// Load a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json_config(path.as_ref())
    }

    /// The render deadline, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Effective scratch directory
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(scratch::default_scratch_dir)
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        let name = self.adapter_name.trim();
        if name.is_empty() {
            return Err(Error::ConfigError("adapter_name must not be empty".into()));
        }
        let path = Path::new(name);
        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(Error::ConfigError(format!(
                "adapter_name must stay inside the template directory, got {}",
                name
            )));
        }
        Ok(())
    }
}

pub(crate) fn read_json_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {}", path.display(), e)))
}

/// A single render: where the templates live, which one, and its data
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    template_dir: PathBuf,
    template_name: String,
    context: TemplateContext,
}

impl RenderRequest {
    pub fn new(
        template_dir: impl Into<PathBuf>,
        template_name: impl Into<String>,
        context: TemplateContext,
    ) -> Self {
        Self {
            template_dir: template_dir.into(),
            template_name: template_name.into(),
            context,
        }
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn template_name(&self) -> &str {
        &self.template_name
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }
}
