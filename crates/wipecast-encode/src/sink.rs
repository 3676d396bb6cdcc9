use std::path::Path;
use std::sync::Arc;

use wipecast_core::{
    BoundaryPosition, ContainerFormat, EncodeConfig, FrameBuffer, WipecastError, WipecastResult,
};

use crate::{ApngBackend, FfmpegBackend, GifBackend};

/// Fixed geometry and rate of one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamConfig {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * FrameBuffer::BYTES_PER_PIXEL
    }
}

/// An open encoder accepting frames for exactly one clip.
pub trait ClipSink: Send {
    fn format(&self) -> ContainerFormat;

    /// Append one frame. Indices must strictly increase.
    fn feed_frame(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()>;

    /// Flush and finalize into a clip.
    fn close(self: Box<Self>) -> WipecastResult<EncodedClip>;
}

/// A family of sinks, e.g. everything a system FFmpeg can produce.
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `format` can be produced on this machine right now.
    fn supports(&self, format: ContainerFormat) -> bool;

    fn open(&self, stream: &StreamConfig, format: ContainerFormat)
        -> WipecastResult<Box<dyn ClipSink>>;
}

/// The stock backends, FFmpeg first.
pub fn default_backends(config: &EncodeConfig) -> Vec<Arc<dyn EncoderBackend>> {
    vec![
        Arc::new(FfmpegBackend::from_config(config)),
        Arc::new(GifBackend::default()),
        Arc::new(ApngBackend::default()),
    ]
}

/// Pick the first preferred format that some backend supports.
pub fn negotiate(
    backends: &[Arc<dyn EncoderBackend>],
    preferences: &[ContainerFormat],
) -> WipecastResult<(ContainerFormat, Arc<dyn EncoderBackend>)> {
    for (rank, format) in preferences.iter().enumerate() {
        if let Some(backend) = backends.iter().find(|b| b.supports(*format)) {
            if rank > 0 {
                tracing::warn!(
                    "preferred container {} unavailable, falling back to {}",
                    preferences[0],
                    format
                );
            }
            tracing::debug!("negotiated {} via {}", format, backend.name());
            return Ok((*format, Arc::clone(backend)));
        }
    }

    let wanted: Vec<String> = preferences.iter().map(|f| f.to_string()).collect();
    Err(WipecastError::RecorderUnavailable(format!(
        "no encoder available for [{}]",
        wanted.join(", ")
    )))
}

/// Per-sink bookkeeping shared by every backend: frame geometry and ordering.
#[derive(Debug, Clone)]
pub struct FrameGuard {
    stream: StreamConfig,
    last_index: Option<u64>,
    count: u64,
}

impl FrameGuard {
    pub fn new(stream: StreamConfig) -> Self {
        Self {
            stream,
            last_index: None,
            count: 0,
        }
    }

    pub fn stream(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Validate the next frame and record it as accepted.
    pub fn accept(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()> {
        if frame.width != self.stream.width || frame.height != self.stream.height {
            return Err(WipecastError::Encoding(format!(
                "frame {} has dimensions {}x{}, expected {}x{}",
                index, frame.width, frame.height, self.stream.width, self.stream.height
            )));
        }
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(WipecastError::Encoding(format!(
                    "frame {} fed after frame {}",
                    index, last
                )));
            }
        }
        self.last_index = Some(index);
        self.count += 1;
        Ok(())
    }

    pub fn require_frames(&self) -> WipecastResult<()> {
        if self.count == 0 {
            return Err(WipecastError::Encoding("no frames to encode".into()));
        }
        Ok(())
    }

    /// Wrap finished bytes into a clip.
    pub fn finish(&self, format: ContainerFormat, data: Vec<u8>) -> EncodedClip {
        EncodedClip {
            format,
            data,
            width: self.stream.width,
            height: self.stream.height,
            fps: self.stream.fps,
            frame_count: self.count,
            positions: Vec::new(),
        }
    }
}

/// A finished recording.
#[derive(Debug, Clone)]
pub struct EncodedClip {
    pub format: ContainerFormat,
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u64,
    /// Boundary position of every encoded frame, in encode order.
    pub positions: Vec<BoundaryPosition>,
}

impl EncodedClip {
    /// Download name, always carrying the negotiated container's extension.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.format.extension())
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.fps as f64
    }

    pub fn write_to(&self, path: &Path) -> WipecastResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, &self.data)?;
        tracing::info!(
            "Wrote {} clip to {} ({} frames, {} bytes)",
            self.format,
            path.display(),
            self.frame_count,
            self.data.len()
        );
        Ok(())
    }
}
