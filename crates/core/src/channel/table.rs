//! Fixed-capacity channel tables
//!
//! One [`ChannelTable`] per module type. Every slot mutation happens while
//! holding the table's mutex. The status is mirrored into an atomic inside
//! [`SlotShared`] so the output adapter and status queries can read it
//! without taking the table lock.
//!
//! Taking a channel out of service is split in two. Under the table lock the
//! slot goes CLOSED and its callback generation moves on, yielding a
//! [`Retired`]. Once the lock is released, [`Retired::finish`] waits on the
//! slot's in-flight gate. A running callback may therefore use the table of
//! its own module without blocking the channel being disabled.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::attrs::ChannelAttrs;
use crate::callback::OutputCallback;
use crate::config::SystemConfig;
use crate::engine::Flow;
use crate::module::{ChannelEndpoint, ChannelStatus, ModuleId};
use crate::{Error, Result};

#[derive(Default)]
struct Delivery {
    generation: u64,
    callback: Option<OutputCallback>,
}

/// Slot state reachable from engine delivery threads
pub(crate) struct SlotShared {
    pub(crate) endpoint: ChannelEndpoint,
    status: AtomicU8,
    /// Registered callback; only held long enough to read or swap it
    delivery: Mutex<Delivery>,
    /// Deliveries hold the read side for the whole invocation
    in_flight: RwLock<()>,
}

impl SlotShared {
    pub(crate) fn status(&self) -> ChannelStatus {
        ChannelStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Store `callback` under a fresh generation and return that generation
    pub(crate) fn install(&self, callback: OutputCallback) -> u64 {
        let mut delivery = self.delivery.lock();
        delivery.generation += 1;
        delivery.callback = Some(callback);
        delivery.generation
    }

    /// Callback registered under `generation`, if it is still current
    pub(crate) fn current(&self, generation: u64) -> Option<OutputCallback> {
        let delivery = self.delivery.lock();
        if delivery.generation != generation {
            return None;
        }
        delivery.callback.clone()
    }

    /// Mark a delivery as running until the guard drops
    pub(crate) fn enter(&self) -> RwLockReadGuard<'_, ()> {
        self.in_flight.read_recursive()
    }

    fn revoke(&self) {
        let mut delivery = self.delivery.lock();
        delivery.generation += 1;
        delivery.callback = None;
    }

    /// Block until no delivery is running for this slot
    fn wait_idle(&self) {
        drop(self.in_flight.write());
    }
}

/// The other end of a channel's bind edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPeer {
    /// This slot's flow feeds the peer
    Downstream(ChannelEndpoint),
    /// The peer's flow feeds this slot
    Upstream(ChannelEndpoint),
}

pub(crate) struct ChannelSlot {
    pub(crate) shared: Arc<SlotShared>,
    pub(crate) attrs: Option<ChannelAttrs>,
    pub(crate) flow: Option<Arc<dyn Flow>>,
    pub(crate) peer: Option<BindPeer>,
    /// Pre-populated device path (capture modules only)
    pub(crate) device: Option<String>,
}

impl ChannelSlot {
    pub(crate) fn status(&self) -> ChannelStatus {
        self.shared.status()
    }

    /// Only callable with the table lock held (`&mut` comes from the guard)
    pub(crate) fn set_status(&mut self, status: ChannelStatus) {
        self.shared.status.store(status as u8, Ordering::Release);
    }

    pub(crate) fn endpoint(&self) -> ChannelEndpoint {
        self.shared.endpoint
    }

    /// Move to CLOSED and revoke the callback; the caller finishes the
    /// returned [`Retired`] after dropping the table lock
    pub(crate) fn retire(&mut self) -> Retired {
        self.set_status(ChannelStatus::Closed);
        self.shared.revoke();
        self.attrs = None;
        self.peer = None;
        Retired {
            shared: Arc::clone(&self.shared),
            flow: self.flow.take(),
        }
    }
}

/// A slot taken out of service whose flow still has to be detached
#[must_use = "call finish() once the table lock is released"]
pub(crate) struct Retired {
    shared: Arc<SlotShared>,
    flow: Option<Arc<dyn Flow>>,
}

impl Retired {
    /// Detach the flow's output and wait for in-flight callbacks
    ///
    /// Returns whether a flow was released. Must run without any table lock
    /// held.
    pub(crate) fn finish(self) -> bool {
        if let Some(flow) = &self.flow {
            flow.set_output_callback(None);
        }
        self.shared.wait_idle();
        self.flow.is_some()
    }
}

/// Channel slots of one module type
pub(crate) struct ChannelTable {
    module: ModuleId,
    shared: Vec<Arc<SlotShared>>,
    slots: Mutex<Vec<ChannelSlot>>,
}

impl ChannelTable {
    pub(crate) fn new(module: ModuleId, config: &SystemConfig) -> Self {
        let capacity = config.capacity.of(module);
        let shared: Vec<Arc<SlotShared>> = (0..capacity)
            .map(|index| {
                Arc::new(SlotShared {
                    endpoint: ChannelEndpoint::new(module, index),
                    status: AtomicU8::new(ChannelStatus::Closed as u8),
                    delivery: Mutex::new(Delivery::default()),
                    in_flight: RwLock::new(()),
                })
            })
            .collect();
        let slots = shared
            .iter()
            .map(|shared| ChannelSlot {
                shared: Arc::clone(shared),
                attrs: None,
                flow: None,
                peer: None,
                device: match module {
                    ModuleId::Vi => config.vi_device(shared.endpoint.index).map(str::to_owned),
                    _ => None,
                },
            })
            .collect();

        tracing::debug!(module = %module, capacity, "channel table initialized");
        Self {
            module,
            shared,
            slots: Mutex::new(slots),
        }
    }

    pub(crate) fn module(&self) -> ModuleId {
        self.module
    }

    pub(crate) fn capacity(&self) -> usize {
        self.shared.len()
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.capacity() {
            return Err(Error::InvalidChannel {
                module: self.module,
                index,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Vec<ChannelSlot>> {
        self.slots.lock()
    }

    /// Lock-free status read
    pub(crate) fn status(&self, index: usize) -> Result<ChannelStatus> {
        self.check_index(index)?;
        Ok(self.shared[index].status())
    }

    /// Return every slot to CLOSED, clearing callbacks and peers
    ///
    /// The caller finishes the returned slots after the table lock is
    /// released.
    pub(crate) fn retire_all(&self) -> Vec<Retired> {
        self.lock().iter_mut().map(ChannelSlot::retire).collect()
    }

    /// Edges whose source lives in this table
    pub(crate) fn downstream_edges(&self) -> Vec<(ChannelEndpoint, ChannelEndpoint)> {
        self.lock()
            .iter()
            .filter_map(|slot| match slot.peer {
                Some(BindPeer::Downstream(dst)) => Some((slot.endpoint(), dst)),
                _ => None,
            })
            .collect()
    }
}

/// The per-module tables of one system, in lock order
pub(crate) struct ChannelTables {
    tables: Vec<ChannelTable>,
}

impl ChannelTables {
    pub(crate) fn new(config: &SystemConfig) -> Self {
        Self {
            tables: ModuleId::CHANNEL_MODULES
                .iter()
                .map(|module| ChannelTable::new(*module, config))
                .collect(),
        }
    }

    pub(crate) fn get(&self, module: ModuleId) -> Option<&ChannelTable> {
        self.tables.iter().find(|table| table.module() == module)
    }

    /// Table for a module type, or `NotSupported`
    pub(crate) fn require(&self, module: ModuleId) -> Result<&ChannelTable> {
        self.get(module).ok_or(Error::NotSupported(module))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ChannelTable> {
        self.tables.iter()
    }
}
