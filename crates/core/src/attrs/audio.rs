//! Audio channel attributes: capture (AI), playback (AO), encode (AENC)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{invalid, ChannelAttr, ChannelAttrs};
use crate::engine::FlowSpec;
use crate::module::ModuleId;
use crate::Result;

/// Sample rates accepted by MPEG-1/2 layer II
const MP2_SAMPLE_RATES: [u32; 6] = [16000, 22050, 24000, 32000, 44100, 48000];

/// PCM sample layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    #[default]
    S16,
    S32,
    Flt,
    U8p,
    S16p,
    S32p,
    Fltp,
    G711a,
    G711u,
}

impl SampleFormat {
    /// Engine data-type string (e.g. `audio:pcm_s16`)
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::U8 => "audio:pcm_u8",
            SampleFormat::S16 => "audio:pcm_s16",
            SampleFormat::S32 => "audio:pcm_s32",
            SampleFormat::Flt => "audio:pcm_flt",
            SampleFormat::U8p => "audio:pcm_u8p",
            SampleFormat::S16p => "audio:pcm_s16p",
            SampleFormat::S32p => "audio:pcm_s32p",
            SampleFormat::Fltp => "audio:pcm_fltp",
            SampleFormat::G711a => "audio:g711a",
            SampleFormat::G711u => "audio:g711u",
        }
    }
}

/// Compressed audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    #[default]
    Aac,
    Mp2,
    G711a,
    G711u,
    G726,
}

impl AudioCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::Aac => "audio:aac",
            AudioCodec::Mp2 => "audio:mp2",
            AudioCodec::G711a => "audio:g711a",
            AudioCodec::G711u => "audio:g711u",
            AudioCodec::G726 => "audio:g726",
        }
    }
}

/// PCM device parameters shared by capture and playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PcmAttr {
    /// ALSA device name (e.g. `default:CARD=rockchiprk809co`)
    pub path: String,
    pub format: SampleFormat,
    #[schemars(range(min = 1, max = 8))]
    pub channels: u32,
    pub sample_rate: u32,
    /// Samples per channel in each buffer
    #[serde(alias = "nbSamples")]
    pub nb_samples: u32,
}

impl Default for PcmAttr {
    fn default() -> Self {
        Self {
            path: "default".to_string(),
            format: SampleFormat::S16,
            channels: 1,
            sample_rate: 16000,
            nb_samples: 1024,
        }
    }
}

impl PcmAttr {
    fn validate(&self, module: ModuleId) -> Result<()> {
        if self.path.is_empty() {
            return Err(invalid(format!("{} device path is empty", module)));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(invalid(format!(
                "{} channel count {} out of range",
                module, self.channels
            )));
        }
        if self.sample_rate == 0 || self.nb_samples == 0 {
            return Err(invalid(format!(
                "{} sample rate and frame size must be non-zero",
                module
            )));
        }
        Ok(())
    }

    fn stream_params(&self) -> serde_json::Value {
        json!({
            "device": self.path,
            "sample_format": self.format.as_str(),
            "channel_num": self.channels,
            "sample_rate": self.sample_rate,
            "frames": self.nb_samples,
        })
    }
}

/// Audio input (capture) channel attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AiChnAttr(pub PcmAttr);

impl ChannelAttr for AiChnAttr {
    const MODULE: ModuleId = ModuleId::Ai;

    fn validate(&self) -> Result<()> {
        self.0.validate(Self::MODULE)
    }

    fn flow_spec(&self, _default_device: Option<&str>) -> Result<FlowSpec> {
        Ok(FlowSpec::new(
            "source_stream",
            json!({
                "name": "alsa_capture_stream",
                "stream": self.0.stream_params(),
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Ai(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Ai(attr) => Some(attr),
            _ => None,
        }
    }
}

/// Audio output (playback) channel attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AoChnAttr(pub PcmAttr);

impl ChannelAttr for AoChnAttr {
    const MODULE: ModuleId = ModuleId::Ao;

    fn validate(&self) -> Result<()> {
        self.0.validate(Self::MODULE)
    }

    fn flow_spec(&self, _default_device: Option<&str>) -> Result<FlowSpec> {
        Ok(FlowSpec::new(
            "output_stream",
            json!({
                "name": "alsa_playback_stream",
                "stream": self.0.stream_params(),
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Ao(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Ao(attr) => Some(attr),
            _ => None,
        }
    }
}

/// Audio encoder channel attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AencChnAttr {
    pub codec: AudioCodec,
    /// PCM layout fed into the encoder
    pub input_format: SampleFormat,
    /// Bits per second
    pub bitrate: u32,
    /// Codec-specific quality knob
    pub quality: u32,
    pub channels: u32,
    pub sample_rate: u32,
}

impl Default for AencChnAttr {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            input_format: SampleFormat::S16,
            bitrate: 64000,
            quality: 1,
            channels: 1,
            sample_rate: 16000,
        }
    }
}

impl ChannelAttr for AencChnAttr {
    const MODULE: ModuleId = ModuleId::Aenc;

    fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.channels) || self.sample_rate == 0 {
            return Err(invalid(format!(
                "aenc {} channels @ {} Hz is not a valid layout",
                self.channels, self.sample_rate
            )));
        }
        match self.codec {
            AudioCodec::Mp2 if !MP2_SAMPLE_RATES.contains(&self.sample_rate) => Err(invalid(
                format!("mp2 does not support {} Hz", self.sample_rate),
            )),
            AudioCodec::G711a | AudioCodec::G711u | AudioCodec::G726
                if self.sample_rate != 8000 || self.channels != 1 =>
            {
                Err(invalid(format!(
                    "{} requires mono 8000 Hz input",
                    self.codec.as_str()
                )))
            }
            AudioCodec::Aac | AudioCodec::Mp2 if self.bitrate == 0 => {
                Err(invalid("aenc bitrate must be non-zero"))
            }
            _ => Ok(()),
        }
    }

    fn flow_spec(&self, _default_device: Option<&str>) -> Result<FlowSpec> {
        Ok(FlowSpec::new(
            "audio_enc",
            json!({
                "name": "ffmpeg_aud",
                "input_data_type": self.input_format.as_str(),
                "output_data_type": self.codec.as_str(),
                "enc": {
                    "channel_num": self.channels,
                    "sample_rate": self.sample_rate,
                    "bitrate": self.bitrate,
                    "quality": self.quality,
                },
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Aenc(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Aenc(attr) => Some(attr),
            _ => None,
        }
    }
}
