//! Video input and output.
//!
//! - [`reader`]: decoded frame sources
//! - [`buffer`]: sliding window over a frame source
//! - [`writer`]: video encoders used by the result writers

pub mod buffer;
pub mod reader;
pub mod writer;

pub use buffer::{VideoBuffer, DEFAULT_BUFFER_OVERLAP, DEFAULT_BUFFER_SIZE};
pub use reader::{MemoryVideoReader, VideoReader};
pub use writer::{fourcc_for_extension, VideoSink, VideoSinkFactory, FOURCC_TABLE};

#[cfg(feature = "opencv")]
pub use reader::OpencvVideoReader;
#[cfg(feature = "opencv")]
pub use writer::{OpencvVideoSink, OpencvVideoSinkFactory};
