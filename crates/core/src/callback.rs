//! Output callback bridge
//!
//! Engine flows report produced buffers through a [`FlowOutputFn`]. The
//! adapter installed here turns each engine buffer into a
//! [`MediaBufferHandle`] and hands it to the user callback registered for the
//! channel.
//!
//! The adapter only holds a weak reference to the slot and the callback
//! generation it was installed with; it never takes the table lock. Each
//! delivery stays inside the slot's in-flight gate while the callback runs,
//! and `disable_chn` waits on that gate after releasing the table lock.
//! Callbacks may use any other channel, but must not disable or destroy
//! their own.

use std::sync::{Arc, Weak};

use crate::buffer::{EngineBuffer, MediaBufferHandle};
use crate::channel::table::{ChannelTables, SlotShared};
use crate::engine::FlowOutputFn;
use crate::module::{ChannelEndpoint, ChannelStatus};
use crate::{Error, Result};

/// User callback receiving every buffer a channel produces
///
/// The callback owns the handle it is given and releases it by dropping it or
/// calling [`MediaBufferHandle::release`].
pub type OutputCallback = Arc<dyn Fn(MediaBufferHandle) + Send + Sync>;

/// Install `callback` as the output consumer of an OPEN or BIND channel
///
/// Replaces any previously registered callback. An invocation of the old
/// callback already in progress runs to completion; no new ones start.
pub(crate) fn register(
    tables: &ChannelTables,
    endpoint: ChannelEndpoint,
    callback: OutputCallback,
) -> Result<()> {
    let ChannelEndpoint { module, index } = endpoint;
    let table = tables.require(module)?;
    table.check_index(index)?;

    let slots = table.lock();
    let slot = &slots[index];
    if slot.status() < ChannelStatus::Open {
        return Err(Error::not_ready(
            module,
            index,
            format!("cannot register output callback in {} state", slot.status()),
        ));
    }
    let flow = slot
        .flow
        .as_ref()
        .ok_or_else(|| Error::not_ready(module, index, "channel has no flow"))?;

    let generation = slot.shared.install(callback);
    flow.set_output_callback(Some(adapter(Arc::downgrade(&slot.shared), generation)));

    tracing::debug!(module = %module, chn = index, flow = %flow.id(), "output callback registered");
    Ok(())
}

fn adapter(slot: Weak<SlotShared>, generation: u64) -> FlowOutputFn {
    Arc::new(move |buffer: Option<Arc<dyn EngineBuffer>>| deliver(&slot, generation, buffer))
}

fn deliver(slot: &Weak<SlotShared>, generation: u64, buffer: Option<Arc<dyn EngineBuffer>>) {
    // End of stream carries nothing to hand out.
    let Some(buffer) = buffer else {
        return;
    };
    let Some(shared) = slot.upgrade() else {
        tracing::warn!("output for a torn-down channel dropped");
        return;
    };

    let _in_flight = shared.enter();
    let endpoint = shared.endpoint;
    let status = shared.status();
    if status < ChannelStatus::Open {
        tracing::warn!(channel = %endpoint, status = %status, "output for inactive channel dropped");
        return;
    }
    let Some(callback) = shared.current(generation) else {
        tracing::warn!(channel = %endpoint, "output callback no longer registered, buffer dropped");
        return;
    };

    callback(MediaBufferHandle::new(buffer, endpoint.module));
}
