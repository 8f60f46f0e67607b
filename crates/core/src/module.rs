//! Module identifiers, channel status and endpoint addressing

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of channel
///
/// Discriminants follow the wire-level module ids, and their numeric order is
/// the global lock order used when an operation touches two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ModuleId {
    Unknown = 0,
    /// Video buffer pool
    Vb,
    /// System control
    Sys,
    /// Video decode
    Vdec,
    /// Video encode
    Venc,
    H264e,
    JpegE,
    Mpeg4e,
    H265e,
    JpegD,
    /// Video output
    Vo,
    /// Video input (camera capture)
    Vi,
    Aio,
    /// Audio input (capture)
    Ai,
    /// Audio output (playback)
    Ao,
    /// Audio encode
    Aenc,
    /// Audio decode
    Adec,
}

impl ModuleId {
    /// Module types that own a channel table and take part in the flow graph
    pub const CHANNEL_MODULES: [ModuleId; 6] = [
        ModuleId::Vdec,
        ModuleId::Venc,
        ModuleId::Vi,
        ModuleId::Ai,
        ModuleId::Ao,
        ModuleId::Aenc,
    ];

    /// Whether this module type owns a channel table
    pub fn has_channels(self) -> bool {
        Self::CHANNEL_MODULES.contains(&self)
    }

    /// Convert a raw module id, returning `None` for out-of-range values
    pub fn from_raw(raw: i32) -> Option<Self> {
        let id = match raw {
            0 => ModuleId::Unknown,
            1 => ModuleId::Vb,
            2 => ModuleId::Sys,
            3 => ModuleId::Vdec,
            4 => ModuleId::Venc,
            5 => ModuleId::H264e,
            6 => ModuleId::JpegE,
            7 => ModuleId::Mpeg4e,
            8 => ModuleId::H265e,
            9 => ModuleId::JpegD,
            10 => ModuleId::Vo,
            11 => ModuleId::Vi,
            12 => ModuleId::Aio,
            13 => ModuleId::Ai,
            14 => ModuleId::Ao,
            15 => ModuleId::Aenc,
            16 => ModuleId::Adec,
            _ => return None,
        };
        Some(id)
    }

    /// Short upper-case name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleId::Unknown => "UNKNOWN",
            ModuleId::Vb => "VB",
            ModuleId::Sys => "SYS",
            ModuleId::Vdec => "VDEC",
            ModuleId::Venc => "VENC",
            ModuleId::H264e => "H264E",
            ModuleId::JpegE => "JPEGE",
            ModuleId::Mpeg4e => "MPEG4E",
            ModuleId::H265e => "H265E",
            ModuleId::JpegD => "JPEGD",
            ModuleId::Vo => "VO",
            ModuleId::Vi => "VI",
            ModuleId::Aio => "AIO",
            ModuleId::Ai => "AI",
            ModuleId::Ao => "AO",
            ModuleId::Aenc => "AENC",
            ModuleId::Adec => "ADEC",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a channel slot
///
/// Ordered: `Closed < Ready < Open < Bind`. Operations compare against this
/// order (e.g. output callbacks need at least `Open`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelStatus {
    /// No attributes, no flow
    Closed = 0,
    /// Attributes confirmed, no flow yet
    Ready = 1,
    /// Flow instantiated
    Open = 2,
    /// Flow connected to a peer
    Bind = 3,
}

impl ChannelStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ChannelStatus::Ready,
            2 => ChannelStatus::Open,
            3 => ChannelStatus::Bind,
            _ => ChannelStatus::Closed,
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelStatus::Closed => "CLOSED",
            ChannelStatus::Ready => "READY",
            ChannelStatus::Open => "OPEN",
            ChannelStatus::Bind => "BIND",
        };
        f.write_str(s)
    }
}

/// A (module type, channel index) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    /// Module type
    pub module: ModuleId,
    /// Channel index within the module's table
    pub index: usize,
}

impl ChannelEndpoint {
    /// Create an endpoint
    pub fn new(module: ModuleId, index: usize) -> Self {
        Self { module, index }
    }
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.module, self.index)
    }
}
