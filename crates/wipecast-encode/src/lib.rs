//! # wipecast-encode
//!
//! Encoding sinks: a recording session opens one sink, feeds it frames in
//! order and closes it into a single [`EncodedClip`].
//! WebM and MP4 shell out to FFmpeg; GIF and APNG are encoded natively.

pub mod apng;
pub mod ffmpeg;
pub mod gif;
pub mod memory;
pub mod sink;

pub use apng::ApngBackend;
pub use ffmpeg::FfmpegBackend;
pub use gif::GifBackend;
pub use memory::{CapturedFrames, MemoryBackend};
pub use sink::{
    default_backends, negotiate, ClipSink, EncodedClip, EncoderBackend, FrameGuard, StreamConfig,
};
