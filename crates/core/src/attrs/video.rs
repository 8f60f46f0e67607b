//! Video channel attributes: capture (VI), encode (VENC), decode (VDEC)

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use super::{invalid, ChannelAttr, ChannelAttrs};
use crate::engine::FlowSpec;
use crate::module::ModuleId;
use crate::Result;

/// Raw image layouts understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    #[default]
    Unknown,
    Gray8,
    Gray16,
    Yuv420p,
    Nv12,
    Nv21,
    Yv12,
    Fbc2,
    Fbc0,
    Yuv422p,
    Nv16,
    Nv61,
    Yv16,
    Yuyv422,
    Uyvy422,
    Rgb332,
    Rgb565,
    Bgr565,
    Rgb888,
    Bgr888,
    Argb8888,
    Abgr8888,
    Jpeg,
}

impl ImageType {
    /// Engine data-type string (e.g. `image:nv12`)
    pub fn as_str(self) -> &'static str {
        match self {
            ImageType::Unknown => "image:unknown",
            ImageType::Gray8 => "image:gray8",
            ImageType::Gray16 => "image:gray16",
            ImageType::Yuv420p => "image:yuv420p",
            ImageType::Nv12 => "image:nv12",
            ImageType::Nv21 => "image:nv21",
            ImageType::Yv12 => "image:yv12",
            ImageType::Fbc2 => "image:fbc2",
            ImageType::Fbc0 => "image:fbc0",
            ImageType::Yuv422p => "image:yuv422p",
            ImageType::Nv16 => "image:nv16",
            ImageType::Nv61 => "image:nv61",
            ImageType::Yv16 => "image:yv16",
            ImageType::Yuyv422 => "image:yuyv422",
            ImageType::Uyvy422 => "image:uyvy422",
            ImageType::Rgb332 => "image:rgb332",
            ImageType::Rgb565 => "image:rgb565",
            ImageType::Bgr565 => "image:bgr565",
            ImageType::Rgb888 => "image:rgb888",
            ImageType::Bgr888 => "image:bgr888",
            ImageType::Argb8888 => "image:argb8888",
            ImageType::Abgr8888 => "image:abgr8888",
            ImageType::Jpeg => "image:jpeg",
        }
    }
}

/// Compressed video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Mjpeg,
}

impl VideoCodec {
    /// Engine data-type string
    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::H264 => "video:h264",
            VideoCodec::H265 => "video:h265",
            VideoCodec::Mjpeg => "image:jpeg",
        }
    }
}

/// Frame rate as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 30, den: 1 }
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Video input (camera capture) channel attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ViChnAttr {
    /// Capture device; `None` uses the slot's configured default
    pub device: Option<String>,
    /// Output pixel format
    pub pix_fmt: ImageType,
    pub width: u32,
    pub height: u32,
    /// Number of capture buffers queued to the driver
    #[serde(alias = "bufferCount")]
    #[schemars(range(min = 1, max = 32))]
    pub buffer_count: u32,
}

impl Default for ViChnAttr {
    fn default() -> Self {
        Self {
            device: None,
            pix_fmt: ImageType::Nv12,
            width: 1920,
            height: 1080,
            buffer_count: 3,
        }
    }
}

impl ChannelAttr for ViChnAttr {
    const MODULE: ModuleId = ModuleId::Vi;

    fn validate(&self) -> Result<()> {
        if self.pix_fmt == ImageType::Unknown {
            return Err(invalid("vi pixel format must be set"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "vi resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.buffer_count == 0 {
            return Err(invalid("vi buffer count must be at least 1"));
        }
        if matches!(&self.device, Some(path) if path.is_empty()) {
            return Err(invalid("vi device path is empty"));
        }
        Ok(())
    }

    fn flow_spec(&self, default_device: Option<&str>) -> Result<FlowSpec> {
        let device = self
            .device
            .as_deref()
            .or(default_device)
            .ok_or_else(|| invalid("vi channel has no capture device"))?;

        Ok(FlowSpec::new(
            "source_stream",
            json!({
                "name": "v4l2_capture_stream",
                "stream": {
                    "use_libv4l2": 1,
                    "device": device,
                    "v4l2_capture_type": "VIDEO_CAPTURE",
                    "v4l2_mem_type": "MEMORY_DMABUF",
                    "frames": self.buffer_count,
                    "output_data_type": self.pix_fmt.as_str(),
                    "width": self.width,
                    "height": self.height,
                },
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Vi(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Vi(attr) => Some(attr),
            _ => None,
        }
    }
}

/// Constant-bitrate parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CbrParams {
    pub gop: u32,
    /// Bits per second
    pub bitrate: u32,
    pub src_frame_rate: FrameRate,
    pub dst_frame_rate: FrameRate,
}

impl Default for CbrParams {
    fn default() -> Self {
        Self {
            gop: 30,
            bitrate: 2_000_000,
            src_frame_rate: FrameRate::default(),
            dst_frame_rate: FrameRate::default(),
        }
    }
}

/// Variable-bitrate parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VbrParams {
    pub gop: u32,
    pub max_bitrate: u32,
    pub min_bitrate: u32,
    pub src_frame_rate: FrameRate,
    pub dst_frame_rate: FrameRate,
}

impl Default for VbrParams {
    fn default() -> Self {
        Self {
            gop: 30,
            max_bitrate: 4_000_000,
            min_bitrate: 1_000_000,
            src_frame_rate: FrameRate::default(),
            dst_frame_rate: FrameRate::default(),
        }
    }
}

/// MJPEG constant-bitrate parameters (no GOP)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MjpegCbrParams {
    pub bitrate: u32,
    pub src_frame_rate: FrameRate,
    pub dst_frame_rate: FrameRate,
}

impl Default for MjpegCbrParams {
    fn default() -> Self {
        Self {
            bitrate: 8_000_000,
            src_frame_rate: FrameRate::default(),
            dst_frame_rate: FrameRate::default(),
        }
    }
}

/// Encoder rate control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RateControl {
    H264Cbr(CbrParams),
    H264Vbr(VbrParams),
    H265Cbr(CbrParams),
    H265Vbr(VbrParams),
    MjpegCbr(MjpegCbrParams),
}

impl Default for RateControl {
    fn default() -> Self {
        RateControl::H264Cbr(CbrParams::default())
    }
}

impl RateControl {
    fn codec(&self) -> VideoCodec {
        match self {
            RateControl::H264Cbr(_) | RateControl::H264Vbr(_) => VideoCodec::H264,
            RateControl::H265Cbr(_) | RateControl::H265Vbr(_) => VideoCodec::H265,
            RateControl::MjpegCbr(_) => VideoCodec::Mjpeg,
        }
    }

    fn frame_rates(&self) -> (FrameRate, FrameRate) {
        match self {
            RateControl::H264Cbr(p) | RateControl::H265Cbr(p) => (p.src_frame_rate, p.dst_frame_rate),
            RateControl::H264Vbr(p) | RateControl::H265Vbr(p) => (p.src_frame_rate, p.dst_frame_rate),
            RateControl::MjpegCbr(p) => (p.src_frame_rate, p.dst_frame_rate),
        }
    }

    fn validate(&self) -> Result<()> {
        let (src, dst) = self.frame_rates();
        for rate in [src, dst] {
            if rate.num == 0 || rate.den == 0 {
                return Err(invalid(format!("frame rate {} is not valid", rate)));
            }
        }
        match self {
            RateControl::H264Cbr(p) | RateControl::H265Cbr(p) => {
                if p.gop == 0 || p.bitrate == 0 {
                    return Err(invalid("cbr gop and bitrate must be non-zero"));
                }
            }
            RateControl::H264Vbr(p) | RateControl::H265Vbr(p) => {
                if p.gop == 0 || p.max_bitrate == 0 {
                    return Err(invalid("vbr gop and max bitrate must be non-zero"));
                }
                if p.min_bitrate > p.max_bitrate {
                    return Err(invalid(format!(
                        "vbr min bitrate {} exceeds max {}",
                        p.min_bitrate, p.max_bitrate
                    )));
                }
            }
            RateControl::MjpegCbr(p) => {
                if p.bitrate == 0 {
                    return Err(invalid("mjpeg bitrate must be non-zero"));
                }
            }
        }
        Ok(())
    }

    fn write_params(&self, enc: &mut Map<String, Value>) {
        let (src, dst) = self.frame_rates();
        match self {
            RateControl::H264Cbr(p) | RateControl::H265Cbr(p) => {
                enc.insert("rc_mode".into(), json!("cbr"));
                enc.insert("gop".into(), json!(p.gop));
                enc.insert("bitrate".into(), json!(p.bitrate));
            }
            RateControl::H264Vbr(p) | RateControl::H265Vbr(p) => {
                enc.insert("rc_mode".into(), json!("vbr"));
                enc.insert("gop".into(), json!(p.gop));
                enc.insert("bitrate_max".into(), json!(p.max_bitrate));
                enc.insert("bitrate_min".into(), json!(p.min_bitrate));
            }
            RateControl::MjpegCbr(p) => {
                enc.insert("rc_mode".into(), json!("cbr"));
                enc.insert("bitrate".into(), json!(p.bitrate));
            }
        }
        enc.insert("fps_in".into(), json!(src.to_string()));
        enc.insert("fps".into(), json!(dst.to_string()));
    }
}

/// Video encoder channel attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VencChnAttr {
    /// Raw input layout
    pub image_type: ImageType,
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Stride width; 0 means equal to `width`
    pub vir_width: u32,
    /// Stride height; 0 means equal to `height`
    pub vir_height: u32,
    /// H.264 profile_idc (66 baseline, 77 main, 100 high); ignored otherwise
    pub profile: u32,
    pub rate_control: RateControl,
}

impl Default for VencChnAttr {
    fn default() -> Self {
        Self {
            image_type: ImageType::Nv12,
            codec: VideoCodec::H264,
            width: 1920,
            height: 1080,
            vir_width: 0,
            vir_height: 0,
            profile: 100,
            rate_control: RateControl::default(),
        }
    }
}

impl VencChnAttr {
    fn strides(&self) -> (u32, u32) {
        let vir_width = if self.vir_width == 0 { self.width } else { self.vir_width };
        let vir_height = if self.vir_height == 0 { self.height } else { self.vir_height };
        (vir_width, vir_height)
    }
}

impl ChannelAttr for VencChnAttr {
    const MODULE: ModuleId = ModuleId::Venc;

    fn validate(&self) -> Result<()> {
        if self.image_type == ImageType::Unknown {
            return Err(invalid("venc input image type must be set"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "venc resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        let (vir_width, vir_height) = self.strides();
        if vir_width < self.width || vir_height < self.height {
            return Err(invalid(format!(
                "venc stride {}x{} smaller than picture {}x{}",
                vir_width, vir_height, self.width, self.height
            )));
        }
        if self.rate_control.codec() != self.codec {
            return Err(invalid(format!(
                "rate control is for {:?} but codec is {:?}",
                self.rate_control.codec(),
                self.codec
            )));
        }
        self.rate_control.validate()
    }

    fn flow_spec(&self, _default_device: Option<&str>) -> Result<FlowSpec> {
        let (vir_width, vir_height) = self.strides();
        let mut enc = Map::new();
        enc.insert("width".into(), json!(self.width));
        enc.insert("height".into(), json!(self.height));
        enc.insert("vir_width".into(), json!(vir_width));
        enc.insert("vir_height".into(), json!(vir_height));
        if self.codec == VideoCodec::H264 {
            enc.insert("profile".into(), json!(self.profile));
        }
        self.rate_control.write_params(&mut enc);
        enc.insert("full_range".into(), json!(0));

        Ok(FlowSpec::new(
            "video_enc",
            json!({
                "name": "rkmpp",
                "input_data_type": self.image_type.as_str(),
                "output_data_type": self.codec.as_str(),
                "enc": Value::Object(enc),
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Venc(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Venc(attr) => Some(attr),
            _ => None,
        }
    }
}

/// Video decoder channel attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VdecChnAttr {
    pub codec: VideoCodec,
    /// Decoded frame layout
    pub image_type: ImageType,
    /// Decode one frame per input packet instead of a stream
    pub frame_mode: bool,
}

impl Default for VdecChnAttr {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            image_type: ImageType::Nv12,
            frame_mode: false,
        }
    }
}

impl ChannelAttr for VdecChnAttr {
    const MODULE: ModuleId = ModuleId::Vdec;

    fn validate(&self) -> Result<()> {
        if self.image_type == ImageType::Unknown {
            return Err(invalid("vdec output image type must be set"));
        }
        Ok(())
    }

    fn flow_spec(&self, _default_device: Option<&str>) -> Result<FlowSpec> {
        let split_mode = if self.frame_mode { 0 } else { 1 };
        Ok(FlowSpec::new(
            "video_dec",
            json!({
                "name": "rkmpp",
                "input_data_type": self.codec.as_str(),
                "output_data_type": self.image_type.as_str(),
                "dec": {
                    "split_mode": split_mode,
                },
            }),
        ))
    }

    fn into_attrs(self) -> ChannelAttrs {
        ChannelAttrs::Vdec(self)
    }

    fn from_attrs(attrs: &ChannelAttrs) -> Option<&Self> {
        match attrs {
            ChannelAttrs::Vdec(attr) => Some(attr),
            _ => None,
        }
    }
}
