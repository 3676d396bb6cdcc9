use wipecast_core::{ContainerFormat, FrameBuffer, WipecastError, WipecastResult};

use crate::sink::{ClipSink, EncodedClip, EncoderBackend, FrameGuard, StreamConfig};

/// Native APNG (Animated PNG) encoder using the `png` crate.
///
/// The APNG header carries the frame count, so frames are held until `close`.
/// The held frames are capped at `max_buffer_bytes`.
#[derive(Debug, Clone)]
pub struct ApngBackend {
    /// Number of loops, 0 loops forever.
    pub loop_count: u32,
    pub max_buffer_bytes: usize,
}

impl ApngBackend {
    /// 512 MiB, about 145 frames at 1280x720.
    pub const DEFAULT_MAX_BUFFER_BYTES: usize = 512 * 1024 * 1024;

    pub fn with_max_buffer_bytes(mut self, max_buffer_bytes: usize) -> Self {
        self.max_buffer_bytes = max_buffer_bytes;
        self
    }
}

impl Default for ApngBackend {
    fn default() -> Self {
        Self {
            loop_count: 0,
            max_buffer_bytes: Self::DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

impl EncoderBackend for ApngBackend {
    fn name(&self) -> &str {
        "apng"
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        format == ContainerFormat::Apng
    }

    fn open(
        &self,
        stream: &StreamConfig,
        format: ContainerFormat,
    ) -> WipecastResult<Box<dyn ClipSink>> {
        if format != ContainerFormat::Apng {
            return Err(WipecastError::RecorderUnavailable(format!(
                "apng backend cannot produce {}",
                format
            )));
        }
        Ok(Box::new(ApngSink {
            guard: FrameGuard::new(*stream),
            frames: Vec::new(),
            buffered: 0,
            max_buffer_bytes: self.max_buffer_bytes,
            loop_count: self.loop_count,
        }))
    }
}

struct ApngSink {
    guard: FrameGuard,
    frames: Vec<Vec<u8>>,
    buffered: usize,
    max_buffer_bytes: usize,
    loop_count: u32,
}

impl ClipSink for ApngSink {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Apng
    }

    fn feed_frame(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()> {
        let needed = self.buffered.saturating_add(frame.data.len());
        if needed > self.max_buffer_bytes {
            return Err(WipecastError::Encoding(format!(
                "apng buffer limit of {} bytes reached at frame {}",
                self.max_buffer_bytes, index
            )));
        }
        self.guard.accept(index, frame)?;
        self.frames.push(frame.data.clone());
        self.buffered = needed;
        Ok(())
    }

    fn close(self: Box<Self>) -> WipecastResult<EncodedClip> {
        let sink = *self;
        sink.guard.require_frames()?;
        let stream = *sink.guard.stream();
        let data = encode_apng(&sink.frames, &stream, sink.loop_count)?;

        tracing::info!(
            "Encoded {} frames to APNG ({}x{} @ {}fps, {} bytes)",
            sink.frames.len(),
            stream.width,
            stream.height,
            stream.fps,
            data.len()
        );
        Ok(sink.guard.finish(ContainerFormat::Apng, data))
    }
}

fn encode_apng(frames: &[Vec<u8>], stream: &StreamConfig, loop_count: u32) -> WipecastResult<Vec<u8>> {
    let mut out = Vec::new();
    {
        // Each frame lasts 1/fps seconds.
        let delay_num = 1u16;
        let delay_den = stream.fps.clamp(1, u16::MAX as u32) as u16;

        let mut encoder = png::Encoder::new(&mut out, stream.width, stream.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .set_animated(frames.len() as u32, loop_count)
            .map_err(|e| WipecastError::Encoding(format!("failed to set APNG animation: {}", e)))?;
        encoder
            .set_frame_delay(delay_num, delay_den)
            .map_err(|e| WipecastError::Encoding(format!("failed to set APNG frame delay: {}", e)))?;

        let mut writer = encoder
            .write_header()
            .map_err(|e| WipecastError::Encoding(format!("failed to write APNG header: {}", e)))?;

        for (i, frame) in frames.iter().enumerate() {
            writer.write_image_data(frame).map_err(|e| {
                WipecastError::Encoding(format!("failed to write APNG frame {}: {}", i, e))
            })?;
        }

        writer
            .finish()
            .map_err(|e| WipecastError::Encoding(format!("failed to finalize APNG: {}", e)))?;
    }
    Ok(out)
}
