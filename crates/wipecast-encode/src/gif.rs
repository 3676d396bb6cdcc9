use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use wipecast_core::{ContainerFormat, FrameBuffer, WipecastError, WipecastResult};

use crate::sink::{ClipSink, EncodedClip, EncoderBackend, FrameGuard, StreamConfig};

/// Native GIF encoder using the `image` crate.
/// Frames are quantized as they arrive, so memory stays flat for long sessions.
#[derive(Debug, Clone)]
pub struct GifBackend {
    /// NeuQuant speed, 1 (best) to 30 (fastest).
    pub speed: i32,
    /// Number of loops; `None` loops forever.
    pub loop_count: Option<u16>,
}

impl Default for GifBackend {
    fn default() -> Self {
        Self {
            speed: 10,
            loop_count: None,
        }
    }
}

impl EncoderBackend for GifBackend {
    fn name(&self) -> &str {
        "gif"
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        format == ContainerFormat::Gif
    }

    fn open(
        &self,
        stream: &StreamConfig,
        format: ContainerFormat,
    ) -> WipecastResult<Box<dyn ClipSink>> {
        if format != ContainerFormat::Gif {
            return Err(WipecastError::RecorderUnavailable(format!(
                "gif backend cannot produce {}",
                format
            )));
        }

        let buffer = SharedBuffer::default();
        let mut encoder =
            image::codecs::gif::GifEncoder::new_with_speed(buffer.clone(), self.speed);

        let repeat = match self.loop_count {
            None | Some(0) => image::codecs::gif::Repeat::Infinite,
            Some(n) => image::codecs::gif::Repeat::Finite(n),
        };
        encoder
            .set_repeat(repeat)
            .map_err(|e| WipecastError::Encoding(format!("failed to set GIF repeat: {}", e)))?;

        // Inter-frame delay in centiseconds, GIF minimum is ~2cs.
        let delay_cs = ((100.0 / stream.fps.max(1) as f64).round() as u32).max(2);

        Ok(Box::new(GifSink {
            encoder,
            buffer,
            guard: FrameGuard::new(*stream),
            delay_cs,
        }))
    }
}

struct GifSink {
    encoder: image::codecs::gif::GifEncoder<SharedBuffer>,
    buffer: SharedBuffer,
    guard: FrameGuard,
    delay_cs: u32,
}

impl ClipSink for GifSink {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Gif
    }

    fn feed_frame(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()> {
        self.guard.accept(index, frame)?;

        let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| WipecastError::Encoding(format!("invalid frame data at frame {}", index)))?;
        let gif_frame = image::Frame::from_parts(
            image,
            0,
            0,
            image::Delay::from_numer_denom_ms(self.delay_cs * 10, 1),
        );
        self.encoder.encode_frame(gif_frame).map_err(|e| {
            WipecastError::Encoding(format!("failed to encode GIF frame {}: {}", index, e))
        })
    }

    fn close(self: Box<Self>) -> WipecastResult<EncodedClip> {
        let GifSink {
            encoder,
            buffer,
            guard,
            delay_cs,
        } = *self;
        guard.require_frames()?;

        // Dropping the encoder writes the GIF trailer.
        drop(encoder);
        let data = buffer.take();

        tracing::info!(
            "Encoded {} frames to GIF ({}x{} @ {}fps, delay={}cs, {} bytes)",
            guard.count(),
            guard.stream().width,
            guard.stream().height,
            guard.stream().fps,
            delay_cs,
            data.len()
        );
        Ok(guard.finish(ContainerFormat::Gif, data))
    }
}

/// `Write` target whose bytes stay reachable after the encoder takes ownership.
#[derive(Debug, Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gif_close_without_frames() {
        let sink = GifBackend::default()
            .open(&StreamConfig::new(4, 4, 10), ContainerFormat::Gif)
            .unwrap();
        assert!(matches!(sink.close(), Err(WipecastError::Encoding(_))));
    }

    #[test]
    fn test_gif_encode_solid_frames() {
        let mut sink = GifBackend::default()
            .open(&StreamConfig::new(4, 4, 10), ContainerFormat::Gif)
            .unwrap();
        for i in 0..5u64 {
            let mut fb = FrameBuffer::new(4, 4);
            for y in 0..4 {
                for x in 0..4 {
                    fb.set_pixel(x, y, [255, (i * 50) as u8, 0, 255]);
                }
            }
            sink.feed_frame(i, &fb).unwrap();
        }
        let clip = sink.close().unwrap();
        assert_eq!(clip.frame_count, 5);
        assert_eq!(&clip.data[..6], b"GIF89a");
        assert_eq!(clip.file_name("comparison"), "comparison.gif");
    }

    #[test]
    fn test_gif_rejects_other_formats() {
        assert!(!GifBackend::default().supports(ContainerFormat::Webm));
        assert!(GifBackend::default()
            .open(&StreamConfig::new(4, 4, 10), ContainerFormat::Webm)
            .is_err());
    }
}
