//! Bind/unbind: connecting one channel's output to another's input
//!
//! Both endpoints' tables are locked for the whole check-connect-commit
//! sequence. When the endpoints live in different tables, the locks are
//! taken in [`ModuleId`](crate::ModuleId) order so concurrent binds cannot deadlock.
//!
//! A channel takes part in at most one edge: bind requires both ends to be
//! OPEN and leaves both BIND. The graph is therefore a set of disjoint
//! pairs, which rules out cycles and fan-in without a graph walk.

use parking_lot::MutexGuard;
use std::sync::Arc;

use crate::channel::table::{BindPeer, ChannelSlot, ChannelTables};
use crate::engine::Flow;
use crate::module::{ChannelEndpoint, ChannelStatus};
use crate::{Error, Result};

enum LockedPair<'a> {
    Same(MutexGuard<'a, Vec<ChannelSlot>>),
    Split {
        src: MutexGuard<'a, Vec<ChannelSlot>>,
        dst: MutexGuard<'a, Vec<ChannelSlot>>,
    },
}

impl<'a> LockedPair<'a> {
    fn lock(tables: &'a ChannelTables, src: ChannelEndpoint, dst: ChannelEndpoint) -> Result<Self> {
        let src_table = tables.require(src.module)?;
        let dst_table = tables.require(dst.module)?;
        src_table.check_index(src.index)?;
        dst_table.check_index(dst.index)?;

        if src.module == dst.module {
            return Ok(LockedPair::Same(src_table.lock()));
        }
        Ok(if src.module < dst.module {
            let src = src_table.lock();
            let dst = dst_table.lock();
            LockedPair::Split { src, dst }
        } else {
            let dst = dst_table.lock();
            let src = src_table.lock();
            LockedPair::Split { src, dst }
        })
    }

    /// Mutable access to both slots. Indices differ when the table is shared.
    fn slots(&mut self, src: usize, dst: usize) -> (&mut ChannelSlot, &mut ChannelSlot) {
        match self {
            LockedPair::Same(slots) => {
                if src < dst {
                    let (head, tail) = slots.split_at_mut(dst);
                    (&mut head[src], &mut tail[0])
                } else {
                    let (head, tail) = slots.split_at_mut(src);
                    (&mut tail[0], &mut head[dst])
                }
            }
            LockedPair::Split { src: s, dst: d } => (&mut s[src], &mut d[dst]),
        }
    }
}

fn require_flow(slot: &ChannelSlot) -> Result<Arc<dyn Flow>> {
    let ChannelEndpoint { module, index } = slot.endpoint();
    slot.flow
        .clone()
        .ok_or_else(|| Error::not_ready(module, index, "channel has no flow"))
}

fn require_status(slot: &ChannelSlot, expected: ChannelStatus, action: &str) -> Result<()> {
    let status = slot.status();
    if status != expected {
        let ChannelEndpoint { module, index } = slot.endpoint();
        return Err(Error::not_ready(
            module,
            index,
            format!("{} requires {} but channel is {}", action, expected, status),
        ));
    }
    Ok(())
}

fn reject_self_edge(src: ChannelEndpoint, dst: ChannelEndpoint) -> Result<()> {
    if src == dst {
        return Err(Error::InvalidArgument(format!(
            "cannot bind {} to itself",
            src
        )));
    }
    Ok(())
}

/// Connect `src`'s output to `dst`'s input; both move OPEN -> BIND
///
/// If the engine refuses the connection, neither channel changes state.
pub(crate) fn bind(tables: &ChannelTables, src: ChannelEndpoint, dst: ChannelEndpoint) -> Result<()> {
    reject_self_edge(src, dst)?;
    let mut pair = LockedPair::lock(tables, src, dst)?;
    let (src_slot, dst_slot) = pair.slots(src.index, dst.index);

    require_status(src_slot, ChannelStatus::Open, "bind")?;
    require_status(dst_slot, ChannelStatus::Open, "bind")?;
    let src_flow = require_flow(src_slot)?;
    let dst_flow = require_flow(dst_slot)?;

    src_flow.add_downstream(&dst_flow, 0, 0).map_err(|e| {
        tracing::error!(src = %src, dst = %dst, "engine refused bind: {:#}", e);
        Error::Engine(format!("bind {} -> {}: {:#}", src, dst, e))
    })?;

    src_slot.set_status(ChannelStatus::Bind);
    src_slot.peer = Some(BindPeer::Downstream(dst));
    dst_slot.set_status(ChannelStatus::Bind);
    dst_slot.peer = Some(BindPeer::Upstream(src));

    tracing::debug!(src = %src, dst = %dst, "channels bound");
    Ok(())
}

/// Disconnect an edge created by [`bind`]; both move BIND -> OPEN
pub(crate) fn unbind(
    tables: &ChannelTables,
    src: ChannelEndpoint,
    dst: ChannelEndpoint,
) -> Result<()> {
    reject_self_edge(src, dst)?;
    let mut pair = LockedPair::lock(tables, src, dst)?;
    let (src_slot, dst_slot) = pair.slots(src.index, dst.index);

    require_status(src_slot, ChannelStatus::Bind, "unbind")?;
    require_status(dst_slot, ChannelStatus::Bind, "unbind")?;
    if src_slot.peer != Some(BindPeer::Downstream(dst))
        || dst_slot.peer != Some(BindPeer::Upstream(src))
    {
        return Err(Error::not_ready(
            src.module,
            src.index,
            format!("{} is not bound to {}", src, dst),
        ));
    }
    let src_flow = require_flow(src_slot)?;
    let dst_flow = require_flow(dst_slot)?;

    src_flow.remove_downstream(&dst_flow).map_err(|e| {
        tracing::error!(src = %src, dst = %dst, "engine refused unbind: {:#}", e);
        Error::Engine(format!("unbind {} -> {}: {:#}", src, dst, e))
    })?;

    src_slot.set_status(ChannelStatus::Open);
    src_slot.peer = None;
    dst_slot.set_status(ChannelStatus::Open);
    dst_slot.peer = None;

    tracing::debug!(src = %src, dst = %dst, "channels unbound");
    Ok(())
}

/// Unbind every edge, returning how many were removed
///
/// Failures are logged and skipped; the affected channels stay BIND.
pub(crate) fn unbind_all(tables: &ChannelTables) -> usize {
    let edges: Vec<_> = tables
        .iter()
        .flat_map(|table| table.downstream_edges())
        .collect();
    edges
        .into_iter()
        .filter(|(src, dst)| match unbind(tables, *src, *dst) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(src = %src, dst = %dst, error = %e, "unbind during teardown failed");
                false
            }
        })
        .count()
}

/// Current edge of a channel, seen from that channel
pub(crate) fn peer(tables: &ChannelTables, endpoint: ChannelEndpoint) -> Result<Option<BindPeer>> {
    let table = tables.require(endpoint.module)?;
    table.check_index(endpoint.index)?;
    Ok(table.lock()[endpoint.index].peer)
}
