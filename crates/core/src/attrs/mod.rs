//! Module-specific channel attributes
//!
//! Each module type has an attribute struct that is validated at `set_attr`
//! time and translated into a [`FlowSpec`] at `enable_chn` time. That
//! translation is the only place module-specific engine parameters are built.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::FlowSpec;
use crate::module::ModuleId;
use crate::{Error, Result};

pub mod audio;
pub mod video;

pub use audio::{AencChnAttr, AiChnAttr, AoChnAttr, AudioCodec, PcmAttr, SampleFormat};
pub use video::{
    CbrParams, FrameRate, ImageType, MjpegCbrParams, RateControl, VbrParams, VdecChnAttr,
    VencChnAttr, VideoCodec, ViChnAttr,
};

/// Attributes of one module type
pub trait ChannelAttr: JsonSchema + Clone + Send + Sync + 'static {
    /// Module type whose table these attributes configure
    const MODULE: ModuleId;

    /// Reject malformed attributes
    fn validate(&self) -> Result<()>;

    /// Engine factory name and parameters for a flow implementing this channel
    ///
    /// `default_device` is the slot's pre-populated device path, if any.
    fn flow_spec(&self, default_device: Option<&str>) -> Result<FlowSpec>;

    fn into_attrs(self) -> ChannelAttrs;

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self>;
}

/// Attributes stored in a channel slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "lowercase")]
pub enum ChannelAttrs {
    Vi(ViChnAttr),
    Venc(VencChnAttr),
    Vdec(VdecChnAttr),
    Ai(AiChnAttr),
    Ao(AoChnAttr),
    Aenc(AencChnAttr),
}

impl ChannelAttrs {
    pub fn module(&self) -> ModuleId {
        match self {
            ChannelAttrs::Vi(_) => ModuleId::Vi,
            ChannelAttrs::Venc(_) => ModuleId::Venc,
            ChannelAttrs::Vdec(_) => ModuleId::Vdec,
            ChannelAttrs::Ai(_) => ModuleId::Ai,
            ChannelAttrs::Ao(_) => ModuleId::Ao,
            ChannelAttrs::Aenc(_) => ModuleId::Aenc,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ChannelAttrs::Vi(attr) => attr.validate(),
            ChannelAttrs::Venc(attr) => attr.validate(),
            ChannelAttrs::Vdec(attr) => attr.validate(),
            ChannelAttrs::Ai(attr) => attr.validate(),
            ChannelAttrs::Ao(attr) => attr.validate(),
            ChannelAttrs::Aenc(attr) => attr.validate(),
        }
    }

    pub fn flow_spec(&self, default_device: Option<&str>) -> Result<FlowSpec> {
        match self {
            ChannelAttrs::Vi(attr) => attr.flow_spec(default_device),
            ChannelAttrs::Venc(attr) => attr.flow_spec(default_device),
            ChannelAttrs::Vdec(attr) => attr.flow_spec(default_device),
            ChannelAttrs::Ai(attr) => attr.flow_spec(default_device),
            ChannelAttrs::Ao(attr) => attr.flow_spec(default_device),
            ChannelAttrs::Aenc(attr) => attr.flow_spec(default_device),
        }
    }
}

/// JSON schema for a module's attributes, for tooling and config editors
pub fn attr_schema<A: ChannelAttr>() -> serde_json::Value {
    let schema = schemars::schema_for!(A);
    serde_json::to_value(schema).unwrap_or_default()
}

pub(crate) fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArgument(message.into())
}
