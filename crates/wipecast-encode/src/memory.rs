//! In-memory sink: keeps every fed frame so tests can inspect the stream.

use std::sync::Arc;

use parking_lot::Mutex;

use wipecast_core::{ContainerFormat, FrameBuffer, WipecastError, WipecastResult};

use crate::sink::{ClipSink, EncodedClip, EncoderBackend, FrameGuard, StreamConfig};

/// Shared view of the frames a [`MemoryBackend`] sink has accepted.
#[derive(Debug, Clone, Default)]
pub struct CapturedFrames {
    inner: Arc<Mutex<Vec<(u64, FrameBuffer)>>>,
}

impl CapturedFrames {
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn indices(&self) -> Vec<u64> {
        self.inner.lock().iter().map(|(i, _)| *i).collect()
    }

    pub fn frames(&self) -> Vec<FrameBuffer> {
        self.inner.lock().iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    fn push(&self, index: u64, frame: FrameBuffer) {
        self.inner.lock().push((index, frame));
    }
}

/// Backend that "encodes" by concatenating raw RGBA frames.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    formats: Vec<ContainerFormat>,
    captured: CapturedFrames,
    fail_after: Option<u64>,
}

impl MemoryBackend {
    /// A backend claiming support for every container.
    pub fn new() -> Self {
        Self::with_formats(&ContainerFormat::ALL)
    }

    pub fn with_formats(formats: &[ContainerFormat]) -> Self {
        Self {
            formats: formats.to_vec(),
            captured: CapturedFrames::default(),
            fail_after: None,
        }
    }

    /// Make every sink fail once it has accepted `frames` frames.
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn captured(&self) -> CapturedFrames {
        self.captured.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        self.formats.contains(&format)
    }

    fn open(
        &self,
        stream: &StreamConfig,
        format: ContainerFormat,
    ) -> WipecastResult<Box<dyn ClipSink>> {
        if !self.supports(format) {
            return Err(WipecastError::RecorderUnavailable(format!(
                "memory backend not configured for {}",
                format
            )));
        }
        self.captured.clear();
        Ok(Box::new(MemorySink {
            format,
            guard: FrameGuard::new(*stream),
            data: Vec::new(),
            captured: self.captured.clone(),
            fail_after: self.fail_after,
        }))
    }
}

struct MemorySink {
    format: ContainerFormat,
    guard: FrameGuard,
    data: Vec<u8>,
    captured: CapturedFrames,
    fail_after: Option<u64>,
}

impl ClipSink for MemorySink {
    fn format(&self) -> ContainerFormat {
        self.format
    }

    fn feed_frame(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()> {
        if let Some(limit) = self.fail_after {
            if self.guard.count() >= limit {
                return Err(WipecastError::Encoding(format!(
                    "memory sink refused frame {} after {} frames",
                    index, limit
                )));
            }
        }
        self.guard.accept(index, frame)?;
        self.data.extend_from_slice(&frame.data);
        self.captured.push(index, frame.clone());
        Ok(())
    }

    fn close(self: Box<Self>) -> WipecastResult<EncodedClip> {
        let sink = *self;
        Ok(sink.guard.finish(sink.format, sink.data))
    }
}
