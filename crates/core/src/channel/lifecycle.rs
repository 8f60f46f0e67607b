//! Channel lifecycle: configure, enable, disable
//!
//! ```text
//! CLOSED --set_attr--> READY --enable_chn--> OPEN --bind--> BIND
//!    ^                   |                    |              |
//!    +----disable_chn----+----disable_chn-----+    unbind -> OPEN
//! ```
//!
//! Every check-and-mutate sequence runs under the module table's lock, so no
//! transition is computed from a stale status.

use std::marker::PhantomData;

use super::table::{ChannelSlot, ChannelTable, Retired};
use crate::attrs::{ChannelAttr, ChannelAttrs};
use crate::engine::FlowEngine;
use crate::module::{ChannelEndpoint, ChannelStatus};
use crate::{Error, Result};

impl ChannelTable {
    pub(crate) fn set_attr(&self, index: usize, attrs: ChannelAttrs) -> Result<()> {
        self.check_index(index)?;
        if attrs.module() != self.module() {
            return Err(Error::InvalidArgument(format!(
                "{} attributes passed to {} channel",
                attrs.module(),
                self.module()
            )));
        }
        attrs.validate()?;

        let mut slots = self.lock();
        configure(&mut slots[index], attrs)
    }

    pub(crate) fn enable_chn(&self, index: usize, engine: &dyn FlowEngine) -> Result<()> {
        self.check_index(index)?;
        let mut slots = self.lock();
        enable(&mut slots[index], engine)
    }

    pub(crate) fn disable_chn(&self, index: usize) -> Result<()> {
        self.check_index(index)?;
        let retired = {
            let mut slots = self.lock();
            disable(&mut slots[index])?
        };
        retired.finish();
        Ok(())
    }

    /// Configure and enable in one locked step; on failure the slot is CLOSED
    pub(crate) fn create_chn(
        &self,
        index: usize,
        attrs: ChannelAttrs,
        engine: &dyn FlowEngine,
    ) -> Result<()> {
        self.check_index(index)?;
        if attrs.module() != self.module() {
            return Err(Error::InvalidArgument(format!(
                "{} attributes passed to {} channel",
                attrs.module(),
                self.module()
            )));
        }
        attrs.validate()?;

        let mut slots = self.lock();
        let slot = &mut slots[index];
        let status = slot.status();
        if status > ChannelStatus::Ready {
            return Err(Error::AlreadyExists {
                module: self.module(),
                index,
                status,
            });
        }
        configure(slot, attrs)?;
        if let Err(e) = enable(slot, engine) {
            slot.attrs = None;
            slot.set_status(ChannelStatus::Closed);
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn attrs(&self, index: usize) -> Result<Option<ChannelAttrs>> {
        self.check_index(index)?;
        Ok(self.lock()[index].attrs.clone())
    }
}

fn configure(slot: &mut ChannelSlot, attrs: ChannelAttrs) -> Result<()> {
    let ChannelEndpoint { module, index } = slot.endpoint();
    let status = slot.status();
    if status != ChannelStatus::Closed {
        tracing::debug!(module = %module, chn = index, status = %status, "set_attr rejected");
        return Err(Error::Busy {
            module,
            index,
            status,
        });
    }
    // Surface a missing capture device now rather than at enable time.
    attrs.flow_spec(slot.device.as_deref())?;

    slot.attrs = Some(attrs);
    slot.set_status(ChannelStatus::Ready);
    tracing::debug!(module = %module, chn = index, "channel configured");
    Ok(())
}

fn enable(slot: &mut ChannelSlot, engine: &dyn FlowEngine) -> Result<()> {
    let ChannelEndpoint { module, index } = slot.endpoint();
    let status = slot.status();
    if status != ChannelStatus::Ready {
        tracing::debug!(module = %module, chn = index, status = %status, "enable rejected");
        return Err(if status > ChannelStatus::Ready {
            Error::AlreadyExists {
                module,
                index,
                status,
            }
        } else {
            Error::NotConfigured { module, index }
        });
    }

    let spec = slot
        .attrs
        .as_ref()
        .ok_or(Error::NotConfigured { module, index })?
        .flow_spec(slot.device.as_deref())?;
    let flow = engine.create_flow(&spec).map_err(|e| {
        tracing::error!(
            module = %module,
            chn = index,
            factory = %spec.factory,
            "flow creation failed: {:#}",
            e
        );
        Error::FlowCreation {
            factory: spec.factory.clone(),
            reason: format!("{:#}", e),
        }
    })?;

    tracing::debug!(module = %module, chn = index, flow = %flow.id(), factory = %spec.factory, "channel enabled");
    slot.flow = Some(flow);
    slot.set_status(ChannelStatus::Open);
    Ok(())
}

/// Leaves the slot CLOSED; the caller finishes the teardown after unlocking
fn disable(slot: &mut ChannelSlot) -> Result<Retired> {
    let ChannelEndpoint { module, index } = slot.endpoint();
    let status = slot.status();
    if status == ChannelStatus::Bind {
        tracing::debug!(module = %module, chn = index, "disable rejected: channel is bound");
        return Err(Error::Busy {
            module,
            index,
            status,
        });
    }

    let retired = slot.retire();
    if status != ChannelStatus::Closed {
        tracing::debug!(module = %module, chn = index, from = %status, "channel disabled");
    }
    Ok(retired)
}

/// Lifecycle operations for one module type
///
/// Obtained from [`MediaSystem::channels`](crate::MediaSystem::channels) or
/// the per-module shorthands (`vi()`, `venc()`, ...).
///
/// # Example
///
/// ```
/// use media_channels::{ChannelStatus, MediaSystem, SystemConfig};
/// use media_channels::attrs::VencChnAttr;
/// use media_channels::engine::loopback::LoopbackEngine;
/// use std::sync::Arc;
///
/// let system = MediaSystem::new(Arc::new(LoopbackEngine::new()), SystemConfig::default()).unwrap();
/// let venc = system.venc();
/// venc.set_attr(0, VencChnAttr::default()).unwrap();
/// venc.enable_chn(0).unwrap();
/// assert_eq!(venc.status(0).unwrap(), ChannelStatus::Open);
/// ```
pub struct Channels<'a, A> {
    table: Option<&'a ChannelTable>,
    engine: &'a dyn FlowEngine,
    _attr: PhantomData<fn() -> A>,
}

impl<'a, A: ChannelAttr> Channels<'a, A> {
    pub(crate) fn new(table: Option<&'a ChannelTable>, engine: &'a dyn FlowEngine) -> Self {
        Self {
            table,
            engine,
            _attr: PhantomData,
        }
    }

    fn table(&self) -> Result<&'a ChannelTable> {
        self.table.ok_or(Error::NotSupported(A::MODULE))
    }

    /// Number of slots in this module's table
    pub fn capacity(&self) -> usize {
        self.table.map_or(0, ChannelTable::capacity)
    }

    /// Store attributes and move CLOSED -> READY
    ///
    /// # Errors
    ///
    /// * `InvalidChannel` - index out of range
    /// * `InvalidArgument` - attributes failed validation
    /// * `Busy` - channel is not CLOSED
    pub fn set_attr(&self, index: usize, attrs: A) -> Result<()> {
        self.table()?.set_attr(index, attrs.into_attrs())
    }

    /// Attributes currently stored in the slot
    ///
    /// Fails with `NotConfigured` when the channel is CLOSED.
    pub fn get_attr(&self, index: usize) -> Result<A> {
        let attrs = self.table()?.attrs(index)?;
        attrs
            .as_ref()
            .and_then(A::from_attrs)
            .cloned()
            .ok_or(Error::NotConfigured {
                module: A::MODULE,
                index,
            })
    }

    /// Instantiate the channel's flow and move READY -> OPEN
    ///
    /// # Errors
    ///
    /// * `InvalidChannel` - index out of range
    /// * `AlreadyExists` - channel is OPEN or BIND
    /// * `NotConfigured` - channel is CLOSED
    /// * `FlowCreation` - the engine could not create the flow; the channel
    ///   stays READY
    pub fn enable_chn(&self, index: usize) -> Result<()> {
        self.table()?.enable_chn(index, self.engine)
    }

    /// Release the flow and return to CLOSED
    ///
    /// Legal from CLOSED (no-op), READY and OPEN. Blocks until any output
    /// callback running for this channel returns, so it must not be called
    /// from inside that callback. The table lock is released before waiting,
    /// so callbacks of this channel may still use other channels.
    ///
    /// # Errors
    ///
    /// * `InvalidChannel` - index out of range
    /// * `Busy` - channel is BIND; unbind first
    pub fn disable_chn(&self, index: usize) -> Result<()> {
        self.table()?.disable_chn(index)
    }

    /// `set_attr` followed by `enable_chn` under one lock
    ///
    /// Fails with `AlreadyExists` if the channel is already enabled and
    /// `Busy` if it is READY. If the engine fails, the channel ends CLOSED.
    pub fn create_chn(&self, index: usize, attrs: A) -> Result<()> {
        self.table()?
            .create_chn(index, attrs.into_attrs(), self.engine)
    }

    /// Counterpart of [`create_chn`](Self::create_chn)
    pub fn destroy_chn(&self, index: usize) -> Result<()> {
        self.disable_chn(index)
    }

    /// Current lifecycle state, read without taking the table lock
    pub fn status(&self, index: usize) -> Result<ChannelStatus> {
        self.table()?.status(index)
    }

    /// Endpoint address of a channel, for bind/unbind and callbacks
    pub fn endpoint(&self, index: usize) -> ChannelEndpoint {
        ChannelEndpoint::new(A::MODULE, index)
    }
}
