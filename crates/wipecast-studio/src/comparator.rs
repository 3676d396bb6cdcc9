//! Interactive before/after view with a draggable reveal boundary.

use wipecast_core::{
    BoundaryHandle, BoundaryPosition, Color, ComparatorConfig, FrameBuffer, Rect, RevealSide,
    WipecastResult,
};
use wipecast_render::{CompositeStyle, ImageHandle, WipeCompositor};

/// Below this share of overlay (in percent) the overlay label is hidden.
const LABEL_EDGE_PERCENT: f64 = 2.0;

/// Manipulation input. `x` is in the same coordinate space as the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f64 },
    PointerMove { x: f64 },
    PointerUp,
    TouchStart { x: f64 },
    TouchMove { x: f64 },
    TouchEnd,
    /// Direct percentage input from a range control.
    Slider { value: f64 },
}

/// Whether each corner label should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelVisibility {
    /// The "after" label over the overlay image.
    pub overlay: bool,
    /// The "before" label over the base image.
    pub base: bool,
}

/// Two images split by a vertical boundary the user can drag.
///
/// The boundary lives in a [`BoundaryHandle`] so a recording can sample it
/// every tick while input keeps moving it.
pub struct ComparatorView {
    compositor: WipeCompositor,
    viewport: Rect,
    boundary: BoundaryHandle,
    dragging: bool,
    divider: Option<Color>,
}

impl ComparatorView {
    pub fn new(base: ImageHandle, overlay: ImageHandle, viewport: Rect) -> Self {
        Self::with_style(base, overlay, viewport, CompositeStyle::default())
    }

    pub fn with_style(
        base: ImageHandle,
        overlay: ImageHandle,
        viewport: Rect,
        style: CompositeStyle,
    ) -> Self {
        Self {
            compositor: WipeCompositor::new(base, overlay, style),
            viewport,
            boundary: BoundaryHandle::new(BoundaryPosition::CENTER),
            dragging: false,
            divider: Some(Color::rgba(1.0, 1.0, 1.0, 0.5)),
        }
    }

    pub fn from_config(
        base: ImageHandle,
        overlay: ImageHandle,
        viewport: Rect,
        config: &ComparatorConfig,
        background: Color,
    ) -> Self {
        let style = CompositeStyle {
            reveal: config.reveal,
            background,
        };
        let view = Self::with_style(base, overlay, viewport, style);
        view.set_position(config.initial_position);
        view
    }

    /// Divider line drawn at the boundary by [`render`](Self::render); `None` disables it.
    pub fn with_divider(mut self, divider: Option<Color>) -> Self {
        self.divider = divider;
        self
    }

    /// Responsive resize: input is mapped against the new box from now on.
    pub fn set_viewport(&mut self, viewport: Rect) {
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> Rect {
        self.viewport
    }

    pub fn reveal(&self) -> RevealSide {
        self.compositor.style().reveal
    }

    pub fn position(&self) -> BoundaryPosition {
        self.boundary.get()
    }

    pub fn set_position(&self, position: BoundaryPosition) {
        self.boundary.set(position);
    }

    /// Shared handle a recording can poll while the view keeps receiving input.
    pub fn boundary_handle(&self) -> BoundaryHandle {
        self.boundary.clone()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// Apply one input event and return the resulting position.
    pub fn handle(&mut self, event: InputEvent) -> BoundaryPosition {
        match event {
            InputEvent::PointerDown { .. } | InputEvent::TouchStart { .. } => {
                self.dragging = true;
            }
            InputEvent::PointerUp | InputEvent::TouchEnd => {
                self.dragging = false;
            }
            InputEvent::PointerMove { x } | InputEvent::TouchMove { x } => {
                if self.dragging {
                    if let Some(position) = self.map_x(x) {
                        self.boundary.set(position);
                    }
                }
            }
            InputEvent::Slider { value } => {
                self.boundary.set(BoundaryPosition::new(value));
            }
        }
        self.boundary.get()
    }

    /// Label visibility for the current boundary.
    pub fn labels(&self) -> LabelVisibility {
        let percent = self.position().percent();
        let overlay_share = match self.reveal() {
            RevealSide::Left => percent,
            RevealSide::Right => 100.0 - percent,
        };
        LabelVisibility {
            overlay: overlay_share >= LABEL_EDGE_PERCENT,
            base: overlay_share <= 100.0 - LABEL_EDGE_PERCENT,
        }
    }

    /// Draw the view at any canvas size with the recording compositor.
    pub fn render(&mut self, canvas: &mut FrameBuffer) -> WipecastResult<()> {
        let position = self.position();
        self.compositor.render(canvas, position)?;

        if let Some(color) = self.divider {
            if canvas.width > 0 {
                let x = position.edge_column(canvas.width).min(canvas.width - 1);
                let line = FrameBuffer::solid(1, canvas.height, &color);
                canvas.composite_over(&line, x as i32, 0);
            }
        }
        Ok(())
    }

    fn map_x(&self, x: f64) -> Option<BoundaryPosition> {
        if !(self.viewport.width > 0.0) {
            return None;
        }
        let percent = (x - self.viewport.x) / self.viewport.width * 100.0;
        Some(BoundaryPosition::new(percent))
    }
}
