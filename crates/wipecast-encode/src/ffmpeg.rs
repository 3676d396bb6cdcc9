use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;

use wipecast_core::{ContainerFormat, EncodeConfig, FrameBuffer, WipecastError, WipecastResult};

use crate::sink::{ClipSink, EncodedClip, EncoderBackend, FrameGuard, StreamConfig};

/// Encoder that shells out to FFmpeg for VP9 WebM and H.264 MP4.
///
/// Frames are streamed as raw RGBA over stdin while FFmpeg writes a temporary
/// file, which is read back and removed when the sink closes.
#[derive(Debug)]
pub struct FfmpegBackend {
    program: String,
    crf: Option<u32>,
    available: OnceLock<bool>,
}

impl FfmpegBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            crf: None,
            available: OnceLock::new(),
        }
    }

    pub fn from_config(config: &EncodeConfig) -> Self {
        let mut backend = Self::new(config.ffmpeg_path.clone());
        backend.crf = config.crf;
        backend
    }

    pub fn with_crf(mut self, crf: Option<u32>) -> Self {
        self.crf = crf;
        self
    }

    /// Check if FFmpeg can be launched. Probed once per backend.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = Command::new(&self.program)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            if !found {
                tracing::debug!("'{}' not found, WebM/MP4 disabled", self.program);
            }
            found
        })
    }

    fn codec_args(&self, format: ContainerFormat) -> Vec<String> {
        let args: Vec<&str> = match format {
            ContainerFormat::Webm => vec![
                "-c:v", "libvpx-vp9",
                "-pix_fmt", "yuva420p",
                "-b:v", "0",
                "-row-mt", "1",
                "-crf",
            ],
            _ => vec![
                "-c:v", "libx264",
                "-pix_fmt", "yuv420p",
                "-preset", "medium",
                "-movflags", "+faststart",
                "-crf",
            ],
        };
        let crf = match format {
            ContainerFormat::Webm => self.crf.unwrap_or(31).min(63),
            _ => self.crf.unwrap_or(23).min(51),
        };
        let mut out: Vec<String> = args.into_iter().map(String::from).collect();
        out.push(crf.to_string());
        out
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: ContainerFormat) -> bool {
        matches!(format, ContainerFormat::Webm | ContainerFormat::Mp4) && self.is_available()
    }

    fn open(
        &self,
        stream: &StreamConfig,
        format: ContainerFormat,
    ) -> WipecastResult<Box<dyn ClipSink>> {
        if !matches!(format, ContainerFormat::Webm | ContainerFormat::Mp4) {
            return Err(WipecastError::RecorderUnavailable(format!(
                "ffmpeg backend cannot produce {}",
                format
            )));
        }
        // 4:2:0 chroma subsampling needs even dimensions.
        if stream.width % 2 != 0 || stream.height % 2 != 0 {
            return Err(WipecastError::Encoding(format!(
                "{} needs even dimensions, got {}x{}",
                format, stream.width, stream.height
            )));
        }

        let path = std::env::temp_dir().join(format!(
            "wipecast-{}.{}",
            uuid::Uuid::new_v4(),
            format.extension()
        ));

        let mut cmd = Command::new(&self.program);
        cmd.args(["-y", "-loglevel", "error"]);
        cmd.args([
            "-f", "rawvideo",
            "-pixel_format", "rgba",
            "-video_size", &format!("{}x{}", stream.width, stream.height),
            "-framerate", &stream.fps.to_string(),
            "-i", "-",
        ]);
        cmd.args(self.codec_args(format));
        cmd.arg(&path);

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| WipecastError::RecorderUnavailable(format!("failed to start ffmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WipecastError::Encoding("failed to open ffmpeg stdin".into()))?;

        // Drain stderr so a chatty encoder never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        tracing::debug!("ffmpeg {} sink writing to {}", format, path.display());

        Ok(Box::new(FfmpegSink {
            format,
            guard: FrameGuard::new(*stream),
            child: Some(child),
            stdin: Some(stdin),
            stderr,
            path,
        }))
    }
}

struct FfmpegSink {
    format: ContainerFormat,
    guard: FrameGuard,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    path: PathBuf,
}

impl FfmpegSink {
    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    fn finalize(&mut self) -> WipecastResult<Vec<u8>> {
        self.guard.require_frames()?;

        // Closing stdin signals end of input.
        drop(self.stdin.take());

        let mut child = self
            .child
            .take()
            .ok_or_else(|| WipecastError::Encoding("ffmpeg sink already closed".into()))?;
        let status = child
            .wait()
            .map_err(|e| WipecastError::Encoding(format!("ffmpeg process error: {}", e)))?;
        let stderr = self.collect_stderr();

        if !status.success() {
            return Err(WipecastError::Encoding(format!(
                "ffmpeg ({}) failed with status {}: {}",
                self.format,
                status,
                stderr.trim()
            )));
        }

        std::fs::read(&self.path).map_err(|e| {
            WipecastError::Encoding(format!(
                "failed to read encoded output {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl ClipSink for FfmpegSink {
    fn format(&self) -> ContainerFormat {
        self.format
    }

    fn feed_frame(&mut self, index: u64, frame: &FrameBuffer) -> WipecastResult<()> {
        self.guard.accept(index, frame)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| WipecastError::Encoding("ffmpeg stdin is closed".into()))?;
        if let Err(e) = stdin.write_all(&frame.data) {
            // The pipe only breaks when ffmpeg died; its stderr says why.
            drop(self.stdin.take());
            if let Some(mut child) = self.child.take() {
                let _ = child.wait();
            }
            let stderr = self.collect_stderr();
            return Err(WipecastError::Encoding(format!(
                "failed to write frame {} to ffmpeg: {}. FFmpeg stderr: {}",
                index,
                e,
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> WipecastResult<EncodedClip> {
        let data = self.finalize()?;
        tracing::info!(
            "Encoded {} frames to {} ({}x{} @ {}fps, {} bytes)",
            self.guard.count(),
            self.format,
            self.guard.stream().width,
            self.guard.stream().height,
            self.guard.stream().fps,
            data.len()
        );
        Ok(self.guard.finish(self.format, data))
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = self.collect_stderr();
        let _ = std::fs::remove_file(&self.path);
    }
}
