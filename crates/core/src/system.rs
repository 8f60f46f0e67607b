//! Process context owning every channel table
//!
//! A [`MediaSystem`] is the explicit replacement for process-wide channel
//! tables: constructing one initializes every table, so no operation can run
//! against uninitialized state. Independent systems share nothing and can
//! coexist, which is how the tests use them.

use std::sync::Arc;

use crate::attrs::{
    AencChnAttr, AiChnAttr, AoChnAttr, ChannelAttr, VdecChnAttr, VencChnAttr, ViChnAttr,
};
use crate::buffer::MediaBufferHandle;
use crate::callback;
use crate::channel::table::{BindPeer, ChannelTables, Retired};
use crate::channel::Channels;
use crate::config::SystemConfig;
use crate::engine::{FlowEngine, FlowId};
use crate::graph;
use crate::module::{ChannelEndpoint, ChannelStatus};
use crate::Result;

/// Channel tables plus the flow engine they instantiate flows from
///
/// # Example
///
/// ```
/// use media_channels::{ChannelStatus, MediaSystem, SystemConfig};
/// use media_channels::attrs::{VencChnAttr, ViChnAttr};
/// use media_channels::engine::loopback::LoopbackEngine;
/// use std::sync::Arc;
///
/// let system = MediaSystem::new(Arc::new(LoopbackEngine::new()), SystemConfig::default())?;
///
/// system.vi().set_attr(0, ViChnAttr::default())?;
/// system.vi().enable_chn(0)?;
/// system.venc().create_chn(0, VencChnAttr::default())?;
///
/// let (vi, venc) = (system.vi().endpoint(0), system.venc().endpoint(0));
/// system.bind(vi, venc)?;
/// assert_eq!(system.status(vi)?, ChannelStatus::Bind);
///
/// system.unbind(vi, venc)?;
/// system.vi().disable_chn(0)?;
/// # Ok::<(), media_channels::Error>(())
/// ```
pub struct MediaSystem {
    engine: Arc<dyn FlowEngine>,
    config: SystemConfig,
    tables: ChannelTables,
}

impl MediaSystem {
    /// Validate `config` and initialize every channel table to CLOSED
    pub fn new(engine: Arc<dyn FlowEngine>, config: SystemConfig) -> Result<Self> {
        config.validate()?;
        let tables = ChannelTables::new(&config);
        tracing::info!(
            vi = config.capacity.vi,
            venc = config.capacity.venc,
            vdec = config.capacity.vdec,
            ai = config.capacity.ai,
            ao = config.capacity.ao,
            aenc = config.capacity.aenc,
            "media system initialized"
        );
        Ok(Self {
            engine,
            config,
            tables,
        })
    }

    /// Configuration the tables were built from
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Lifecycle operations for the module type configured by `A`
    pub fn channels<A: ChannelAttr>(&self) -> Channels<'_, A> {
        Channels::new(self.tables.get(A::MODULE), self.engine.as_ref())
    }

    /// Video input (capture)
    pub fn vi(&self) -> Channels<'_, ViChnAttr> {
        self.channels()
    }

    /// Video encoder
    pub fn venc(&self) -> Channels<'_, VencChnAttr> {
        self.channels()
    }

    /// Video decoder
    pub fn vdec(&self) -> Channels<'_, VdecChnAttr> {
        self.channels()
    }

    /// Audio input (capture)
    pub fn ai(&self) -> Channels<'_, AiChnAttr> {
        self.channels()
    }

    /// Audio output (playback)
    pub fn ao(&self) -> Channels<'_, AoChnAttr> {
        self.channels()
    }

    /// Audio encoder
    pub fn aenc(&self) -> Channels<'_, AencChnAttr> {
        self.channels()
    }

    /// Connect `src`'s output to `dst`'s input
    ///
    /// Both channels must be OPEN and become BIND. A channel can take part in
    /// only one edge at a time.
    ///
    /// # Errors
    ///
    /// * `NotSupported` - either module type has no channel table
    /// * `InvalidChannel` - either index is out of range
    /// * `InvalidArgument` - `src == dst`
    /// * `NotReady` - either channel is not OPEN
    /// * `Engine` - the engine refused the connection; nothing changed
    pub fn bind(&self, src: ChannelEndpoint, dst: ChannelEndpoint) -> Result<()> {
        graph::bind(&self.tables, src, dst)
    }

    /// Remove the edge created by `bind(src, dst)`; both return to OPEN
    ///
    /// Fails with `NotReady` if either channel is not BIND or the two are
    /// not bound to each other in that direction.
    pub fn unbind(&self, src: ChannelEndpoint, dst: ChannelEndpoint) -> Result<()> {
        graph::unbind(&self.tables, src, dst)
    }

    /// The other end of the channel's edge, if it is bound
    pub fn peer(&self, endpoint: ChannelEndpoint) -> Result<Option<BindPeer>> {
        graph::peer(&self.tables, endpoint)
    }

    /// Deliver every buffer the channel produces to `callback`
    ///
    /// The channel must be OPEN or BIND. The callback runs synchronously on
    /// the engine's delivery thread and must return quickly; it must not
    /// disable or destroy its own channel.
    pub fn register_output_callback<F>(&self, endpoint: ChannelEndpoint, callback: F) -> Result<()>
    where
        F: Fn(MediaBufferHandle) + Send + Sync + 'static,
    {
        callback::register(&self.tables, endpoint, Arc::new(callback))
    }

    /// Current lifecycle state of any channel
    pub fn status(&self, endpoint: ChannelEndpoint) -> Result<ChannelStatus> {
        self.tables.require(endpoint.module)?.status(endpoint.index)
    }

    /// Engine id of the channel's flow, `None` unless OPEN or BIND
    pub fn flow_id(&self, endpoint: ChannelEndpoint) -> Result<Option<FlowId>> {
        let table = self.tables.require(endpoint.module)?;
        table.check_index(endpoint.index)?;
        let slots = table.lock();
        Ok(slots[endpoint.index].flow.as_ref().map(|flow| flow.id()))
    }

    /// Return every channel to CLOSED and release all flows
    ///
    /// Bound pairs are unbound first, so each edge is removed from the engine
    /// before its channels leave BIND. Blocks until in-flight output
    /// callbacks return.
    pub fn shutdown(&self) {
        let edges = graph::unbind_all(&self.tables);
        let retired: Vec<_> = self
            .tables
            .iter()
            .flat_map(|table| table.retire_all())
            .collect();
        let released = retired.into_iter().map(Retired::finish).filter(|&released| released).count();
        tracing::info!(edges, flows = released, "media system shut down");
    }
}
