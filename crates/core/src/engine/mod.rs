//! Flow engine boundary
//!
//! The channel core never captures, encodes or decodes anything itself. It
//! asks a [`FlowEngine`] to instantiate named processing units ([`Flow`]s)
//! and wires them together. Implementations report failures as
//! `anyhow::Error`; the core maps them into its own taxonomy.
//!
//! [`loopback`] provides an in-memory engine that forwards buffers along
//! bound edges, for tests and hosts without media hardware.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::buffer::EngineBuffer;

pub mod loopback;

/// Engine-side output subscription
///
/// Invoked on the engine's delivery thread for every produced buffer. `None`
/// signals end of stream.
pub type FlowOutputFn = Arc<dyn Fn(Option<Arc<dyn EngineBuffer>>) + Send + Sync>;

/// Identity of a flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(Uuid);

impl FlowId {
    /// Fresh random id
    pub fn new() -> Self {
        FlowId(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Factory name plus configuration blob for [`FlowEngine::create_flow`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Registered factory name (e.g. "source_stream", "video_enc")
    pub factory: String,
    /// Factory-specific parameters
    pub params: Value,
}

impl FlowSpec {
    pub fn new(factory: impl Into<String>, params: Value) -> Self {
        Self {
            factory: factory.into(),
            params,
        }
    }

    /// Inner implementation name (`params.name`), if present
    pub fn implementation(&self) -> Option<&str> {
        self.params.get("name").and_then(Value::as_str)
    }
}

/// A processing unit instantiated by the engine
///
/// Dropping the last `Arc` tears the unit down.
pub trait Flow: Send + Sync {
    /// Stable identity of this instance
    fn id(&self) -> FlowId;

    /// Add `downstream` as a consumer of this flow's output
    fn add_downstream(
        &self,
        downstream: &Arc<dyn Flow>,
        input_slot: usize,
        output_slot: usize,
    ) -> anyhow::Result<()>;

    /// Remove a consumer previously added with [`add_downstream`](Self::add_downstream)
    fn remove_downstream(&self, downstream: &Arc<dyn Flow>) -> anyhow::Result<()>;

    /// Subscribe (or with `None`, unsubscribe) the output callback
    fn set_output_callback(&self, callback: Option<FlowOutputFn>);
}

/// Flow factory
pub trait FlowEngine: Send + Sync {
    /// Instantiate a flow from a factory name and configuration
    fn create_flow(&self, spec: &FlowSpec) -> anyhow::Result<Arc<dyn Flow>>;
}
