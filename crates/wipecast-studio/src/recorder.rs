//! Recording controller: one frame-production loop per session.
//!
//! A session moves `Idle -> Starting -> Recording -> Stopping -> Idle`.
//! Each tick reads the boundary, composites onto the output surface and feeds
//! the sink. Frames are fed strictly in tick order and only one session may
//! run per controller.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use wipecast_core::{
    BoundaryHandle, BoundaryPosition, ContainerFormat, FrameBuffer, WipecastConfig, WipecastError,
    WipecastResult,
};
use wipecast_encode::{default_backends, negotiate, ClipSink, EncodedClip, EncoderBackend, StreamConfig};
use wipecast_render::{CompositeStyle, ImageLoader, WipeCompositor};

use crate::schedule::WipeSchedule;
use crate::ticker::{IntervalTicker, Ticker, TickerFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Where each frame's boundary position comes from.
pub trait BoundarySource: Send {
    /// Whether frame `index` should be produced at all.
    fn has_frame(&self, _index: u64) -> bool {
        true
    }

    /// Position for frame `index`, read at tick time.
    fn position(&mut self, index: u64) -> BoundaryPosition;
}

impl BoundarySource for WipeSchedule {
    fn has_frame(&self, index: u64) -> bool {
        index < self.total_frames() as u64
    }

    fn position(&mut self, index: u64) -> BoundaryPosition {
        self.position_at(index)
    }
}

/// Live input: whatever the comparator holds when the tick fires.
impl BoundarySource for BoundaryHandle {
    fn position(&mut self, _index: u64) -> BoundaryPosition {
        self.get()
    }
}

/// A fixed list of positions, one per frame, e.g. a replayed live session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct PositionTimeline(pub Vec<BoundaryPosition>);

impl PositionTimeline {
    pub fn from_json(json: &str) -> WipecastResult<Self> {
        let timeline: PositionTimeline = serde_json::from_str(json)?;
        Ok(timeline)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl BoundarySource for PositionTimeline {
    fn has_frame(&self, index: u64) -> bool {
        (index as usize) < self.0.len()
    }

    fn position(&mut self, index: u64) -> BoundaryPosition {
        self.0.get(index as usize).copied().unwrap_or_default()
    }
}

/// Output geometry, container preferences and compositing style of a session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub stream: StreamConfig,
    pub formats: Vec<ContainerFormat>,
    pub style: CompositeStyle,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::new(1280, 720, 30),
            formats: vec![ContainerFormat::Webm, ContainerFormat::Mp4],
            style: CompositeStyle::default(),
        }
    }
}

impl RecorderConfig {
    pub fn from_config(config: &WipecastConfig) -> WipecastResult<Self> {
        Ok(Self {
            stream: StreamConfig::new(config.output.width, config.output.height, config.output.fps),
            formats: config.encode.formats.clone(),
            style: CompositeStyle {
                reveal: config.comparator.reveal,
                background: config.output.background_color()?,
            },
        })
    }
}

/// Resets the controller to `Idle` however the session ends.
struct SessionGuard {
    state: Arc<Mutex<SessionState>>,
}

impl SessionGuard {
    fn set(&self, next: SessionState) {
        let mut state = self.state.lock();
        tracing::debug!("recorder {} -> {}", *state, next);
        *state = next;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.set(SessionState::Idle);
    }
}

/// Everything a running loop owns.
struct PreparedSession {
    compositor: WipeCompositor,
    surface: FrameBuffer,
    sink: Box<dyn ClipSink>,
}

struct ActiveSession {
    stop_tx: Option<oneshot::Sender<()>>,
    /// Interactive sessions only; scripted loops run on the caller's task.
    task: Option<JoinHandle<WipecastResult<EncodedClip>>>,
}

/// Owns the output surface and the encoding sink of at most one session.
pub struct RecordingController {
    loader: Arc<ImageLoader>,
    backends: Vec<Arc<dyn EncoderBackend>>,
    config: RecorderConfig,
    ticker: TickerFactory,
    state: Arc<Mutex<SessionState>>,
    active: Mutex<Option<ActiveSession>>,
}

impl RecordingController {
    pub fn new(
        loader: Arc<ImageLoader>,
        backends: Vec<Arc<dyn EncoderBackend>>,
        config: RecorderConfig,
    ) -> Self {
        Self {
            loader,
            backends,
            config,
            ticker: IntervalTicker::factory(),
            state: Arc::new(Mutex::new(SessionState::Idle)),
            active: Mutex::new(None),
        }
    }

    /// Controller with the stock loader and encoder backends.
    pub fn from_config(config: &WipecastConfig) -> WipecastResult<Self> {
        Ok(Self::new(
            Arc::new(ImageLoader::from_config(&config.upload)),
            default_backends(&config.encode),
            RecorderConfig::from_config(config)?,
        ))
    }

    /// Replace the tick source, e.g. with [`ImmediateTicker`](crate::ImmediateTicker) for offline renders.
    pub fn with_ticker(mut self, ticker: TickerFactory) -> Self {
        self.ticker = ticker;
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<ImageLoader> {
        &self.loader
    }

    /// The container a session would use right now.
    pub fn negotiated_format(&self) -> WipecastResult<ContainerFormat> {
        negotiate(&self.backends, &self.config.formats).map(|(format, _)| format)
    }

    /// Start an interactive recording that samples `boundary` every tick until [`stop`](Self::stop).
    pub async fn start(
        &self,
        before: &str,
        after: &str,
        boundary: BoundaryHandle,
    ) -> WipecastResult<ContainerFormat> {
        let guard = self.begin()?;
        let session = self.prepare(before, after).await?;
        let format = session.sink.format();

        let (stop_tx, stop_rx) = oneshot::channel();
        guard.set(SessionState::Recording);
        let factory = Arc::clone(&self.ticker);
        let fps = self.config.stream.fps;
        let task = tokio::spawn(async move {
            let ticker = factory(fps);
            run_session(session, Box::new(boundary), ticker, stop_rx, guard).await
        });

        let previous = self.active.lock().replace(ActiveSession {
            stop_tx: Some(stop_tx),
            task: Some(task),
        });
        if previous.is_some() {
            tracing::warn!("discarding the result of an unstopped session");
        }
        tracing::info!("recording started ({})", format);
        Ok(format)
    }

    /// Stop the interactive session and return its clip, or the error that ended it.
    pub async fn stop(&self) -> WipecastResult<EncodedClip> {
        let session = {
            let mut active = self.active.lock();
            match active.as_ref() {
                Some(session) if session.task.is_some() => active.take(),
                _ => None,
            }
        };
        let ActiveSession { stop_tx, task } = session.ok_or(WipecastError::NotRecording)?;

        if let Some(tx) = stop_tx {
            // The loop may already have ended on its own.
            let _ = tx.send(());
        }
        let task = task.ok_or(WipecastError::NotRecording)?;
        task.await
            .map_err(|e| WipecastError::Encoding(format!("recording task failed: {}", e)))?
    }

    /// Ask whichever session is running to finish after the current frame.
    ///
    /// Returns false when nothing is running. A cancelled scripted recording
    /// still returns its clip, truncated, to the caller of `record_scripted`.
    pub fn cancel(&self) -> bool {
        let mut active = self.active.lock();
        match active.as_mut().and_then(|s| s.stop_tx.take()) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Record a scripted wipe to completion and return the clip.
    pub async fn record_scripted(
        &self,
        before: &str,
        after: &str,
        schedule: &WipeSchedule,
    ) -> WipecastResult<EncodedClip> {
        self.record_source(before, after, Box::new(*schedule)).await
    }

    /// Record one frame per entry of an explicit position list.
    pub async fn record_timeline(
        &self,
        before: &str,
        after: &str,
        timeline: PositionTimeline,
    ) -> WipecastResult<EncodedClip> {
        self.record_source(before, after, Box::new(timeline)).await
    }

    async fn record_source(
        &self,
        before: &str,
        after: &str,
        source: Box<dyn BoundarySource>,
    ) -> WipecastResult<EncodedClip> {
        let guard = self.begin()?;
        let session = self.prepare(before, after).await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        *self.active.lock() = Some(ActiveSession {
            stop_tx: Some(stop_tx),
            task: None,
        });
        guard.set(SessionState::Recording);

        let ticker = (self.ticker)(self.config.stream.fps);
        let result = run_session(session, source, ticker, stop_rx, guard).await;
        self.active.lock().take();
        result
    }

    /// Claim the controller: `Idle -> Starting`, or `RecorderBusy`.
    fn begin(&self) -> WipecastResult<SessionGuard> {
        let mut state = self.state.lock();
        if *state != SessionState::Idle {
            return Err(WipecastError::RecorderBusy(state.to_string()));
        }
        *state = SessionState::Starting;
        tracing::debug!("recorder idle -> starting");
        Ok(SessionGuard {
            state: Arc::clone(&self.state),
        })
    }

    async fn prepare(&self, before: &str, after: &str) -> WipecastResult<PreparedSession> {
        let (base, overlay) = self.loader.load_pair(before, after).await?;
        let stream = self.config.stream;
        let surface = FrameBuffer::new(stream.width, stream.height);

        let (format, backend) = negotiate(&self.backends, &self.config.formats)?;
        let sink = backend.open(&stream, format)?;

        Ok(PreparedSession {
            compositor: WipeCompositor::new(base, overlay, self.config.style),
            surface,
            sink,
        })
    }
}

/// The frame loop. Stop is polled ahead of the next tick so no frame follows it.
async fn run_session(
    session: PreparedSession,
    mut source: Box<dyn BoundarySource>,
    mut ticker: Box<dyn Ticker>,
    mut stop_rx: oneshot::Receiver<()>,
    guard: SessionGuard,
) -> WipecastResult<EncodedClip> {
    let PreparedSession {
        mut compositor,
        mut surface,
        mut sink,
    } = session;

    let mut positions = Vec::new();
    let mut index = 0u64;

    while source.has_frame(index) {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {}
        }

        let position = source.position(index);
        compositor.render(&mut surface, position)?;

        // Encoders block on pipes and compression; keep them off the runtime threads.
        let (returned_sink, returned_surface, fed) = tokio::task::spawn_blocking(move || {
            let fed = sink.feed_frame(index, &surface);
            (sink, surface, fed)
        })
        .await
        .map_err(|e| WipecastError::Encoding(format!("encoder task failed: {}", e)))?;
        sink = returned_sink;
        surface = returned_surface;
        if let Err(e) = fed {
            tracing::warn!("encoder failed at frame {}: {}", index, e);
            return Err(e);
        }
        positions.push(position);
        index += 1;
    }

    guard.set(SessionState::Stopping);
    let mut clip = tokio::task::spawn_blocking(move || sink.close())
        .await
        .map_err(|e| WipecastError::Encoding(format!("encoder task failed: {}", e)))??;
    clip.positions = positions;
    tracing::info!(
        "recorded {} frames as {} ({:.2}s)",
        clip.frame_count,
        clip.format,
        clip.duration_secs()
    );
    Ok(clip)
}
