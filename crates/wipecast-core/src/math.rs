use serde::{Deserialize, Serialize};

/// A 2D size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size2D {
    pub width: f64,
    pub height: f64,
}

impl Size2D {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Compute the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0.0 {
            return 0.0;
        }
        self.width / self.height
    }
}

/// An axis-aligned rectangle in canvas or view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin covering `width` x `height`.
    pub fn from_size(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Fit an image inside a canvas, preserving its aspect ratio and centering the
/// remainder (letterbox or pillarbox).
///
/// Images wider than the canvas fill its width; all others fill its height.
pub fn fit_rect(image: Size2D, canvas: Size2D) -> Rect {
    let image_ratio = image.aspect_ratio();
    if image_ratio <= 0.0 || canvas.width <= 0.0 || canvas.height <= 0.0 {
        return Rect::from_size(0.0, 0.0);
    }

    if image_ratio > canvas.aspect_ratio() {
        let height = canvas.width / image_ratio;
        Rect::new(0.0, (canvas.height - height) / 2.0, canvas.width, height)
    } else {
        let width = canvas.height * image_ratio;
        Rect::new((canvas.width - width) / 2.0, 0.0, width, canvas.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_wide_image_letterboxes() {
        let r = fit_rect(Size2D::new(200.0, 50.0), Size2D::new(100.0, 100.0));
        assert_eq!(r, Rect::new(0.0, 37.5, 100.0, 25.0));
    }

    #[test]
    fn test_fit_tall_image_pillarboxes() {
        let r = fit_rect(Size2D::new(50.0, 100.0), Size2D::new(1280.0, 720.0));
        assert_eq!(r, Rect::new(460.0, 0.0, 360.0, 720.0));
    }

    #[test]
    fn test_fit_same_aspect_covers_canvas() {
        let r = fit_rect(Size2D::new(4.0, 3.0), Size2D::new(40.0, 30.0));
        assert_eq!(r, Rect::from_size(40.0, 30.0));
    }

    #[test]
    fn test_fit_degenerate_sizes() {
        let r = fit_rect(Size2D::new(0.0, 10.0), Size2D::new(100.0, 100.0));
        assert_eq!(r.width, 0.0);
        let r = fit_rect(Size2D::new(10.0, 10.0), Size2D::new(0.0, 100.0));
        assert_eq!(r.height, 0.0);
    }
}
