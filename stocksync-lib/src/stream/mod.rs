//! The outward result stream: frames, the adapter that produces them, and
//! the progress monitor that tells the adapter when a batch is done.
mod adapter;
mod frame;
mod monitor;

pub use adapter::{
    StreamAdapter, StreamConfig, StreamEnd, DEFAULT_CEILING_SECS, DEFAULT_KEEP_ALIVE_SECS,
};
pub use frame::{Frame, FrameCodec};
pub use monitor::ProgressMonitor;
