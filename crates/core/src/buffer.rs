//! Buffer handles handed to output callbacks
//!
//! The flow engine owns media buffers and shares them through
//! `Arc<dyn EngineBuffer>`. A [`MediaBufferHandle`] holds exactly one of those
//! references for a consumer. Releasing the handle drops the reference; the
//! underlying memory goes away only when the engine's last reference does.
//!
//! Once released, every accessor returns [`Error::BufferReleased`] instead of
//! stale data.

use std::fmt;
use std::sync::Arc;

use crate::module::ModuleId;
use crate::{Error, Result};

/// File descriptor type exposed by engine buffers (dmabuf, ion, ...)
pub type BufferFd = i32;

/// Buffer object owned by the flow engine
///
/// A buffer may be CPU-mapped (`data()` returns `Some`), fd-backed
/// (`fd()` returns `Some`), or both.
pub trait EngineBuffer: Send + Sync {
    /// CPU-visible bytes, `None` when only a file descriptor is valid
    fn data(&self) -> Option<&[u8]>;

    /// Backing file descriptor, `None` when only memory is valid
    fn fd(&self) -> Option<BufferFd>;

    /// Number of valid payload bytes
    fn valid_size(&self) -> usize;
}

struct Held {
    buffer: Arc<dyn EngineBuffer>,
    module: ModuleId,
    size: usize,
}

/// Reference-counted handle to one engine buffer
///
/// Created by the output callback bridge for every delivered buffer. Further
/// references to the same buffer come from [`MediaBufferHandle::acquire`].
///
/// # Example
///
/// ```
/// use media_channels::{MediaBufferHandle, ModuleId};
/// use media_channels::engine::loopback::LoopbackBuffer;
/// use std::sync::Arc;
///
/// let mut handle = MediaBufferHandle::new(
///     Arc::new(LoopbackBuffer::from_static(b"frame")),
///     ModuleId::Venc,
/// );
/// assert_eq!(handle.size().unwrap(), 5);
/// handle.release().unwrap();
/// assert!(handle.size().is_err());
/// ```
pub struct MediaBufferHandle {
    held: Option<Held>,
}

impl MediaBufferHandle {
    /// Wrap one reference to an engine buffer produced by `module`
    pub fn new(buffer: Arc<dyn EngineBuffer>, module: ModuleId) -> Self {
        let size = buffer.valid_size();
        Self {
            held: Some(Held {
                buffer,
                module,
                size,
            }),
        }
    }

    fn held(&self) -> Result<&Held> {
        self.held.as_ref().ok_or(Error::BufferReleased)
    }

    /// Raw pointer to the payload, null for fd-only buffers
    pub fn as_ptr(&self) -> Result<*const u8> {
        let held = self.held()?;
        Ok(held
            .buffer
            .data()
            .map_or(std::ptr::null(), |data| data.as_ptr()))
    }

    /// Valid payload bytes
    pub fn data(&self) -> Result<&[u8]> {
        let held = self.held()?;
        let data = held
            .buffer
            .data()
            .ok_or(Error::NullPointer("buffer has no CPU mapping"))?;
        Ok(&data[..held.size.min(data.len())])
    }

    /// Backing file descriptor, if any
    pub fn fd(&self) -> Result<Option<BufferFd>> {
        Ok(self.held()?.buffer.fd())
    }

    /// Valid payload size in bytes
    pub fn size(&self) -> Result<usize> {
        Ok(self.held()?.size)
    }

    /// Module type of the channel that produced the buffer
    pub fn module_id(&self) -> Result<ModuleId> {
        Ok(self.held()?.module)
    }

    /// Take an additional reference to the same engine buffer
    pub fn acquire(&self) -> Result<MediaBufferHandle> {
        let held = self.held()?;
        Ok(MediaBufferHandle {
            held: Some(Held {
                buffer: Arc::clone(&held.buffer),
                module: held.module,
                size: held.size,
            }),
        })
    }

    /// Number of live references to the engine buffer, this one included
    pub fn ref_count(&self) -> Result<usize> {
        Ok(Arc::strong_count(&self.held()?.buffer))
    }

    /// Drop this handle's reference
    ///
    /// Fails with [`Error::BufferReleased`] if called twice.
    pub fn release(&mut self) -> Result<()> {
        match self.held.take() {
            Some(_) => Ok(()),
            None => Err(Error::BufferReleased),
        }
    }

    /// Whether [`release`](Self::release) has been called
    pub fn is_released(&self) -> bool {
        self.held.is_none()
    }
}

impl fmt::Debug for MediaBufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.held {
            Some(held) => f
                .debug_struct("MediaBufferHandle")
                .field("module", &held.module)
                .field("size", &held.size)
                .field("fd", &held.buffer.fd())
                .finish(),
            None => f.write_str("MediaBufferHandle(released)"),
        }
    }
}
