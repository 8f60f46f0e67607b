//! In-memory flow engine
//!
//! Every flow created by [`LoopbackEngine`] is a pass-through: a buffer pushed
//! into a flow is delivered to its output callback and then forwarded, on the
//! same thread, to each downstream flow. The engine keeps weak references to
//! its flows so tests can reach the flow behind a channel by id and observe
//! edges and teardown.

use anyhow::{anyhow, bail};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::{Flow, FlowEngine, FlowId, FlowOutputFn, FlowSpec};
use crate::buffer::{BufferFd, EngineBuffer};

/// Forwarding stops after this many flow-to-flow hops
const MAX_FORWARD_HOPS: usize = 32;

/// Engine buffer backed by [`Bytes`] and/or a file descriptor
#[derive(Debug, Clone)]
pub struct LoopbackBuffer {
    data: Option<Bytes>,
    fd: Option<BufferFd>,
    valid_size: usize,
}

impl LoopbackBuffer {
    /// CPU-mapped buffer whose valid size is the full payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let valid_size = data.len();
        Self {
            data: Some(data),
            fd: None,
            valid_size,
        }
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }

    /// Buffer visible only through a file descriptor
    pub fn fd_only(fd: BufferFd, valid_size: usize) -> Self {
        Self {
            data: None,
            fd: Some(fd),
            valid_size,
        }
    }

    /// Attach a file descriptor to a mapped buffer
    pub fn with_fd(mut self, fd: BufferFd) -> Self {
        self.fd = Some(fd);
        self
    }

    /// Shrink the valid region (e.g. an encoder that filled part of a pool buffer)
    pub fn with_valid_size(mut self, valid_size: usize) -> Self {
        self.valid_size = valid_size;
        self
    }
}

impl EngineBuffer for LoopbackBuffer {
    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn fd(&self) -> Option<BufferFd> {
        self.fd
    }

    fn valid_size(&self) -> usize {
        self.valid_size
    }
}

struct EngineInner {
    flows: RwLock<HashMap<FlowId, Weak<LoopbackFlow>>>,
    failing_factories: RwLock<HashSet<String>>,
    fail_connect: AtomicBool,
    created: AtomicU64,
}

/// Pass-through flow engine
#[derive(Clone)]
pub struct LoopbackEngine {
    inner: Arc<EngineInner>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EngineInner {
                flows: RwLock::new(HashMap::new()),
                failing_factories: RwLock::new(HashSet::new()),
                fail_connect: AtomicBool::new(false),
                created: AtomicU64::new(0),
            }),
        }
    }

    /// Make `create_flow` fail for a factory name
    pub fn fail_factory(&self, factory: impl Into<String>) {
        self.inner.failing_factories.write().insert(factory.into());
    }

    /// Undo [`fail_factory`](Self::fail_factory)
    pub fn restore_factory(&self, factory: &str) {
        self.inner.failing_factories.write().remove(factory);
    }

    /// Make `add_downstream`/`remove_downstream` fail
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Look up a live flow
    pub fn flow(&self, id: FlowId) -> Option<Arc<LoopbackFlow>> {
        self.inner.flows.read().get(&id).and_then(Weak::upgrade)
    }

    /// Number of flows not yet torn down
    pub fn live_flows(&self) -> usize {
        self.inner
            .flows
            .read()
            .values()
            .filter(|flow| flow.strong_count() > 0)
            .count()
    }

    /// Total flows ever created
    pub fn created_flows(&self) -> u64 {
        self.inner.created.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowEngine for LoopbackEngine {
    fn create_flow(&self, spec: &FlowSpec) -> anyhow::Result<Arc<dyn Flow>> {
        if self.inner.failing_factories.read().contains(&spec.factory) {
            bail!("factory '{}' is unavailable", spec.factory);
        }

        let flow = Arc::new(LoopbackFlow {
            id: FlowId::new(),
            spec: spec.clone(),
            engine: Arc::downgrade(&self.inner),
            downstream: Mutex::new(Vec::new()),
            callback: RwLock::new(None),
            pushed: AtomicU64::new(0),
        });
        self.inner
            .flows
            .write()
            .insert(flow.id, Arc::downgrade(&flow));
        self.inner.created.fetch_add(1, Ordering::SeqCst);

        tracing::trace!(flow = %flow.id, factory = %spec.factory, "loopback flow created");
        Ok(flow)
    }
}

/// Pass-through flow created by [`LoopbackEngine`]
pub struct LoopbackFlow {
    id: FlowId,
    spec: FlowSpec,
    engine: Weak<EngineInner>,
    downstream: Mutex<Vec<FlowId>>,
    callback: RwLock<Option<FlowOutputFn>>,
    pushed: AtomicU64,
}

impl LoopbackFlow {
    /// The [`FlowSpec`] this flow was created from
    pub fn spec(&self) -> &FlowSpec {
        &self.spec
    }

    /// Ids of the flows consuming this flow's output
    pub fn downstream(&self) -> Vec<FlowId> {
        self.downstream.lock().clone()
    }

    /// Whether an output callback is subscribed
    pub fn has_output_callback(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Buffers that passed through this flow
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::SeqCst)
    }

    /// Produce a buffer: deliver it to the output callback, then downstream
    pub fn push(&self, buffer: Arc<dyn EngineBuffer>) {
        self.emit(Some(buffer), 0);
    }

    /// Signal end of stream (a `None` buffer) to the output callback
    pub fn push_end_of_stream(&self) {
        self.emit(None, 0);
    }

    fn emit(&self, buffer: Option<Arc<dyn EngineBuffer>>, hops: usize) {
        if hops > MAX_FORWARD_HOPS {
            tracing::warn!(flow = %self.id, "forwarding depth exceeded, dropping buffer");
            return;
        }
        if buffer.is_some() {
            self.pushed.fetch_add(1, Ordering::SeqCst);
        }

        // Clone out of the lock so callbacks may resubscribe.
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback(buffer.clone());
        }

        let Some(buffer) = buffer else {
            return;
        };
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        let targets: Vec<Arc<LoopbackFlow>> = {
            let flows = engine.flows.read();
            self.downstream
                .lock()
                .iter()
                .filter_map(|id| flows.get(id).and_then(Weak::upgrade))
                .collect()
        };
        for target in targets {
            target.emit(Some(Arc::clone(&buffer)), hops + 1);
        }
    }

    fn check_connect(&self) -> anyhow::Result<Arc<EngineInner>> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| anyhow!("engine shut down"))?;
        if engine.fail_connect.load(Ordering::SeqCst) {
            bail!("connect rejected by engine");
        }
        Ok(engine)
    }
}

impl Flow for LoopbackFlow {
    fn id(&self) -> FlowId {
        self.id
    }

    fn add_downstream(
        &self,
        downstream: &Arc<dyn Flow>,
        _input_slot: usize,
        _output_slot: usize,
    ) -> anyhow::Result<()> {
        let engine = self.check_connect()?;
        let target = downstream.id();
        if !engine.flows.read().contains_key(&target) {
            bail!("flow {} does not belong to this engine", target);
        }

        let mut edges = self.downstream.lock();
        if edges.contains(&target) {
            bail!("flow {} is already downstream of {}", target, self.id);
        }
        edges.push(target);
        Ok(())
    }

    fn remove_downstream(&self, downstream: &Arc<dyn Flow>) -> anyhow::Result<()> {
        self.check_connect()?;
        let target = downstream.id();
        let mut edges = self.downstream.lock();
        let before = edges.len();
        edges.retain(|id| *id != target);
        if edges.len() == before {
            bail!("flow {} is not downstream of {}", target, self.id);
        }
        Ok(())
    }

    fn set_output_callback(&self, callback: Option<FlowOutputFn>) {
        *self.callback.write() = callback;
    }
}

impl Drop for LoopbackFlow {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.flows.write().remove(&self.id);
        }
        tracing::trace!(flow = %self.id, "loopback flow destroyed");
    }
}
