//! Wipe compositing: base image full-frame, overlay clipped at the boundary.

use image::imageops::FilterType;
use image::{ImageBuffer, Rgba};

use wipecast_core::{
    fit_rect, BoundaryPosition, Color, FrameBuffer, RevealSide, Size2D, WipecastError,
    WipecastResult,
};

use crate::image_loader::ImageHandle;

/// Settings shared by every frame of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeStyle {
    pub reveal: RevealSide,
    pub background: Color,
}

impl Default for CompositeStyle {
    fn default() -> Self {
        Self {
            reveal: RevealSide::Left,
            background: Color::BLACK,
        }
    }
}

/// An image resampled and positioned for one canvas size.
///
/// Fitting is the expensive step, so it is done once per canvas size and the
/// per-frame work is a clipped row copy.
#[derive(Debug, Clone)]
pub struct FittedImage {
    pub bitmap: FrameBuffer,
    pub x: i32,
    pub y: i32,
    canvas: (u32, u32),
}

impl FittedImage {
    /// Letterbox `image` into a `canvas_width` x `canvas_height` canvas.
    pub fn fit(image: &FrameBuffer, canvas_width: u32, canvas_height: u32) -> Self {
        let rect = fit_rect(
            Size2D::new(image.width as f64, image.height as f64),
            Size2D::new(canvas_width as f64, canvas_height as f64),
        );

        let target_w = if rect.width > 0.0 {
            (rect.width.round() as u32).clamp(1, canvas_width)
        } else {
            0
        };
        let target_h = if rect.height > 0.0 {
            (rect.height.round() as u32).clamp(1, canvas_height)
        } else {
            0
        };

        let bitmap = if target_w == 0 || target_h == 0 {
            FrameBuffer::new(0, 0)
        } else {
            resample(image, target_w, target_h)
        };

        Self {
            bitmap,
            x: rect.x.round() as i32,
            y: rect.y.round() as i32,
            canvas: (canvas_width, canvas_height),
        }
    }

    /// Canvas size this image was fitted for.
    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas
    }
}

fn resample(image: &FrameBuffer, width: u32, height: u32) -> FrameBuffer {
    if image.width == width && image.height == height {
        return image.clone();
    }
    let view: Option<ImageBuffer<Rgba<u8>, &[u8]>> =
        ImageBuffer::from_raw(image.width, image.height, image.data.as_slice());
    match view {
        Some(view) => {
            let resized = image::imageops::resize(&view, width, height, FilterType::Triangle);
            FrameBuffer {
                data: resized.into_raw(),
                width,
                height,
            }
        }
        // Only reachable for a buffer whose length disagrees with its size.
        None => FrameBuffer::new(width, height),
    }
}

/// Draw one wipe frame onto `canvas`.
///
/// Clears to the background, draws `base` letterboxed, then draws `overlay`
/// letterboxed and confined to the reveal side of the boundary column.
pub fn composite(
    canvas: &mut FrameBuffer,
    base: &FittedImage,
    overlay: &FittedImage,
    boundary: BoundaryPosition,
    style: &CompositeStyle,
) -> WipecastResult<()> {
    let size = canvas.dimensions();
    if base.canvas_size() != size || overlay.canvas_size() != size {
        return Err(WipecastError::InvalidArgument(format!(
            "images fitted for {:?}/{:?}, canvas is {:?}",
            base.canvas_size(),
            overlay.canvas_size(),
            size
        )));
    }

    canvas.fill(&style.background);
    canvas.composite_over(&base.bitmap, base.x, base.y);

    let edge = boundary.edge_column(canvas.width);
    let cols = style.reveal.overlay_columns(edge, canvas.width);
    canvas.composite_over_clipped(&overlay.bitmap, overlay.x, overlay.y, cols);
    Ok(())
}

/// Composites a fixed image pair, refitting only when the canvas size changes.
pub struct WipeCompositor {
    base: ImageHandle,
    overlay: ImageHandle,
    style: CompositeStyle,
    fitted: Option<(FittedImage, FittedImage)>,
}

impl WipeCompositor {
    pub fn new(base: ImageHandle, overlay: ImageHandle, style: CompositeStyle) -> Self {
        Self {
            base,
            overlay,
            style,
            fitted: None,
        }
    }

    pub fn style(&self) -> &CompositeStyle {
        &self.style
    }

    pub fn base(&self) -> &ImageHandle {
        &self.base
    }

    pub fn overlay(&self) -> &ImageHandle {
        &self.overlay
    }

    pub fn render(
        &mut self,
        canvas: &mut FrameBuffer,
        boundary: BoundaryPosition,
    ) -> WipecastResult<()> {
        let size = canvas.dimensions();
        let stale = match &self.fitted {
            Some((base, _)) => base.canvas_size() != size,
            None => true,
        };
        if stale {
            tracing::debug!("fitting images for {}x{} canvas", size.0, size.1);
            self.fitted = Some((
                FittedImage::fit(self.base.bitmap(), size.0, size.1),
                FittedImage::fit(self.overlay.bitmap(), size.0, size.1),
            ));
        }
        match &self.fitted {
            Some((base, overlay)) => composite(canvas, base, overlay, boundary, &self.style),
            None => Ok(()),
        }
    }
}

/// Render a single wipe frame into a new canvas.
pub fn render_still(
    base: &ImageHandle,
    overlay: &ImageHandle,
    width: u32,
    height: u32,
    boundary: BoundaryPosition,
    style: CompositeStyle,
) -> WipecastResult<FrameBuffer> {
    let mut canvas = FrameBuffer::new(width, height);
    WipeCompositor::new(base.clone(), overlay.clone(), style).render(&mut canvas, boundary)?;
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(w: u32, h: u32, color: &Color) -> ImageHandle {
        ImageHandle::from_frame(FrameBuffer::solid(w, h, color), "test")
    }

    fn dominant(px: [u8; 4]) -> char {
        if px[0] > 127 && px[2] < 128 {
            'r'
        } else if px[2] > 127 && px[0] < 128 {
            'b'
        } else {
            '?'
        }
    }

    #[test]
    fn test_fit_wide_image_letterboxes_vertically() {
        let fitted = FittedImage::fit(&FrameBuffer::solid(200, 50, &Color::RED), 100, 100);
        assert_eq!((fitted.bitmap.width, fitted.bitmap.height), (100, 25));
        assert_eq!((fitted.x, fitted.y), (0, 38));
    }

    #[test]
    fn test_fit_tall_image_pillarboxes() {
        let fitted = FittedImage::fit(&FrameBuffer::solid(50, 100, &Color::RED), 1280, 720);
        assert_eq!((fitted.bitmap.width, fitted.bitmap.height), (360, 720));
        assert_eq!((fitted.x, fitted.y), (460, 0));
    }

    #[test]
    fn test_overlay_only_left_of_edge() {
        let base = handle(4, 3, &Color::RED);
        let overlay = handle(4, 3, &Color::BLUE);
        for percent in [0.0, 12.5, 50.0, 77.0, 100.0] {
            let boundary = BoundaryPosition::new(percent);
            let frame =
                render_still(&base, &overlay, 40, 30, boundary, CompositeStyle::default()).unwrap();
            let edge = boundary.edge_column(40);
            for x in 0..40 {
                let expected = if x < edge { 'b' } else { 'r' };
                assert_eq!(
                    dominant(frame.get_pixel(x, 15).unwrap()),
                    expected,
                    "boundary {} column {}",
                    percent,
                    x
                );
            }
        }
    }

    #[test]
    fn test_reveal_right_mirrors_clip() {
        let base = handle(4, 3, &Color::RED);
        let overlay = handle(4, 3, &Color::BLUE);
        let style = CompositeStyle {
            reveal: RevealSide::Right,
            ..CompositeStyle::default()
        };
        let frame = render_still(&base, &overlay, 40, 30, BoundaryPosition::new(25.0), style).unwrap();
        assert_eq!(dominant(frame.get_pixel(9, 0).unwrap()), 'r');
        assert_eq!(dominant(frame.get_pixel(10, 0).unwrap()), 'b');
        assert_eq!(dominant(frame.get_pixel(39, 29).unwrap()), 'b');
    }

    #[test]
    fn test_letterbox_uses_background() {
        let base = handle(40, 10, &Color::RED);
        let overlay = handle(40, 10, &Color::BLUE);
        let style = CompositeStyle {
            background: Color::WHITE,
            ..CompositeStyle::default()
        };
        let frame = render_still(&base, &overlay, 40, 30, BoundaryPosition::CENTER, style).unwrap();
        assert_eq!(frame.get_pixel(0, 0), Some([255, 255, 255, 255]));
        assert_eq!(dominant(frame.get_pixel(0, 15).unwrap()), 'b');
        assert_eq!(dominant(frame.get_pixel(39, 15).unwrap()), 'r');
    }

    #[test]
    fn test_composite_rejects_mismatched_canvas() {
        let red = FrameBuffer::solid(4, 3, &Color::RED);
        let base = FittedImage::fit(&red, 40, 30);
        let overlay = FittedImage::fit(&red, 40, 30);
        let mut canvas = FrameBuffer::new(80, 60);
        let err = composite(
            &mut canvas,
            &base,
            &overlay,
            BoundaryPosition::CENTER,
            &CompositeStyle::default(),
        )
        .unwrap_err();
        assert!(matches!(err, WipecastError::InvalidArgument(_)));
    }

    #[test]
    fn test_compositor_refits_on_resize() {
        let mut compositor = WipeCompositor::new(
            handle(4, 3, &Color::RED),
            handle(4, 3, &Color::BLUE),
            CompositeStyle::default(),
        );
        let mut small = FrameBuffer::new(40, 30);
        compositor.render(&mut small, BoundaryPosition::CENTER).unwrap();
        let mut large = FrameBuffer::new(80, 60);
        compositor.render(&mut large, BoundaryPosition::CENTER).unwrap();
        assert_eq!(dominant(large.get_pixel(39, 59).unwrap()), 'b');
        assert_eq!(dominant(large.get_pixel(40, 59).unwrap()), 'r');
    }

    #[test]
    fn test_composite_is_deterministic() {
        let base = handle(7, 5, &Color::RED);
        let overlay = handle(3, 9, &Color::GREEN);
        let a = render_still(&base, &overlay, 64, 36, BoundaryPosition::new(33.3), CompositeStyle::default()).unwrap();
        let b = render_still(&base, &overlay, 64, 36, BoundaryPosition::new(33.3), CompositeStyle::default()).unwrap();
        assert_eq!(
            wipecast_core::hash::hash_frame(&a),
            wipecast_core::hash::hash_frame(&b)
        );
    }
}
