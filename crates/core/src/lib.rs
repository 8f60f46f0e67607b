//! Media channels - lifecycle and binding core for media-processing channels
//!
//! A channel is a caller-visible endpoint (module type + index) wrapping a
//! flow instantiated by an external flow engine. This crate keeps the
//! per-module channel tables, drives each channel through its state machine,
//! binds channels' flows into a graph and bridges engine output to caller
//! callbacks through reference-counted buffer handles.
//!
//! # Architecture
//!
//! - [`MediaSystem`] owns one table per module type plus the engine handle
//! - [`Channels`] configures, enables and disables channels of one module
//! - [`MediaSystem::bind`] / [`MediaSystem::unbind`] connect flows
//! - [`MediaSystem::register_output_callback`] delivers [`MediaBufferHandle`]s
//!
//! The engine itself sits behind the [`engine::FlowEngine`] trait.
//! [`engine::loopback`] provides an in-memory implementation.
//!
//! # Example
//!
//! ```
//! use media_channels::{MediaBufferHandle, MediaSystem, SystemConfig};
//! use media_channels::attrs::{VencChnAttr, ViChnAttr};
//! use media_channels::engine::loopback::{LoopbackBuffer, LoopbackEngine};
//! use std::sync::Arc;
//!
//! let engine = LoopbackEngine::new();
//! let system = MediaSystem::new(Arc::new(engine.clone()), SystemConfig::default())?;
//!
//! system.vi().create_chn(0, ViChnAttr::default())?;
//! system.venc().create_chn(0, VencChnAttr::default())?;
//! let (vi, venc) = (system.vi().endpoint(0), system.venc().endpoint(0));
//!
//! system.bind(vi, venc)?;
//! system.register_output_callback(venc, |mut buffer: MediaBufferHandle| {
//!     println!("encoded {} bytes", buffer.size().unwrap_or(0));
//!     buffer.release().ok();
//! })?;
//!
//! // Capture side produces a frame; the loopback engine forwards it.
//! if let Some(id) = system.flow_id(vi)? {
//!     if let Some(flow) = engine.flow(id) {
//!         flow.push(Arc::new(LoopbackBuffer::from_static(b"frame")));
//!     }
//! }
//!
//! system.unbind(vi, venc)?;
//! system.shutdown();
//! # Ok::<(), media_channels::Error>(())
//! ```

#![warn(clippy::all)]

pub mod attrs;
pub mod buffer;
pub mod callback;
mod channel;
pub mod config;
pub mod engine;
mod error;
mod graph;
pub mod module;
mod system;

pub use buffer::{BufferFd, EngineBuffer, MediaBufferHandle};
pub use callback::OutputCallback;
pub use channel::{BindPeer, Channels};
pub use config::{SystemConfig, TableCapacity};
pub use error::{status_code, Error, Result, STATUS_OK};
pub use module::{ChannelEndpoint, ChannelStatus, ModuleId};
pub use system::MediaSystem;

/// Initialize logging
///
/// Installs a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`
/// (default `info`). Call once at startup; later calls fail with
/// [`Error::Config`].
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialized: {}", e)))?;

    tracing::info!("media channels initialized");
    Ok(())
}
