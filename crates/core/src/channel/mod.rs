//! Channel Registry and Lifecycle Manager

mod lifecycle;
pub(crate) mod table;

pub use lifecycle::Channels;
pub use table::BindPeer;
