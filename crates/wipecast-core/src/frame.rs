use std::ops::Range;

use crate::error::{WipecastError, WipecastResult};
use crate::Color;

/// An RGBA8 raster: decoded images, the output surface and every encoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Raw pixel data, 4 bytes per pixel, row-major.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameBuffer {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Create a new frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width as usize) * (height as usize) * Self::BYTES_PER_PIXEL;
        Self {
            data: vec![0u8; size],
            width,
            height,
        }
    }

    /// Create a frame buffer filled with a solid color.
    pub fn solid(width: u32, height: u32, color: &Color) -> Self {
        let mut fb = Self::new(width, height);
        fb.fill(color);
        fb
    }

    /// Wrap existing RGBA8 bytes. Fails if the length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> WipecastResult<Self> {
        let expected = (width as usize) * (height as usize) * Self::BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(WipecastError::InvalidArgument(format!(
                "frame data is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Total byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Get the RGBA value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[offset..offset + 4]);
        Some(px)
    }

    /// Set the RGBA value at a pixel coordinate. No-op if out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = self.offset(x, y);
        self.data[offset..offset + 4].copy_from_slice(&rgba);
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: &Color) {
        let pixel = color.to_rgba8();
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&pixel);
        }
    }

    /// Alpha-composite `src` on top of `self` at position (dx, dy).
    pub fn composite_over(&mut self, src: &FrameBuffer, dx: i32, dy: i32) {
        self.composite_over_clipped(src, dx, dy, 0..self.width);
    }

    /// Alpha-composite `src` at (dx, dy), touching only destination columns in `cols`.
    pub fn composite_over_clipped(&mut self, src: &FrameBuffer, dx: i32, dy: i32, cols: Range<u32>) {
        let clip_start = cols.start.min(self.width) as i64;
        let clip_end = cols.end.min(self.width) as i64;
        if clip_start >= clip_end {
            return;
        }

        let dx = dx as i64;
        let dy = dy as i64;

        // Destination-space span covered by src, intersected with the clip.
        let x0 = dx.max(clip_start);
        let x1 = (dx + src.width as i64).min(clip_end);
        let y0 = dy.max(0);
        let y1 = (dy + src.height as i64).min(self.height as i64);

        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let src_stride = src.width as usize * 4;
        let dst_stride = self.width as usize * 4;
        let len = (x1 - x0) as usize * 4;

        for y in y0..y1 {
            let sy = (y - dy) as usize;
            let src_row_start = sy * src_stride + (x0 - dx) as usize * 4;
            let dst_row_start = y as usize * dst_stride + x0 as usize * 4;

            let src_slice = &src.data[src_row_start..src_row_start + len];
            let dst_slice = &mut self.data[dst_row_start..dst_row_start + len];

            for (s, d) in src_slice.chunks_exact(4).zip(dst_slice.chunks_exact_mut(4)) {
                blend_pixel(s, d);
            }
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * Self::BYTES_PER_PIXEL
    }
}

/// Source-over blend of one RGBA8 pixel using integer math.
#[inline]
fn blend_pixel(s: &[u8], d: &mut [u8]) {
    let sa = s[3] as u32;
    if sa == 0 {
        return;
    }
    if sa == 255 {
        d.copy_from_slice(s);
        return;
    }

    let da = d[3] as u32;
    let inv_sa = 255 - sa;
    let out_a = sa + ((da * inv_sa) / 255);
    if out_a == 0 {
        return;
    }

    for c in 0..3 {
        let v = (s[c] as u32 * sa * 255 + d[c] as u32 * da * inv_sa) / (out_a * 255);
        d[c] = v as u8;
    }
    d[3] = out_a as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_buffer_new() {
        let fb = FrameBuffer::new(1280, 720);
        assert_eq!(fb.width, 1280);
        assert_eq!(fb.height, 720);
        assert_eq!(fb.byte_size(), 1280 * 720 * 4);
        assert_eq!(fb.pixel_count(), 1280 * 720);
    }

    #[test]
    fn test_frame_buffer_solid() {
        let fb = FrameBuffer::solid(2, 2, &Color::RED);
        assert_eq!(fb.get_pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(fb.get_pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_from_raw_checks_length() {
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
        assert!(FrameBuffer::from_raw(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_frame_buffer_get_set_pixel() {
        let mut fb = FrameBuffer::new(10, 10);
        fb.set_pixel(5, 5, [128, 64, 32, 255]);
        assert_eq!(fb.get_pixel(5, 5), Some([128, 64, 32, 255]));
        assert_eq!(fb.get_pixel(10, 0), None);
        assert_eq!(fb.get_pixel(0, 10), None);
    }

    #[test]
    fn test_composite_over_opaque() {
        let mut dst = FrameBuffer::solid(4, 4, &Color::BLUE);
        let src = FrameBuffer::solid(2, 2, &Color::RED);
        dst.composite_over(&src, 1, 1);
        assert_eq!(dst.get_pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(dst.get_pixel(2, 2), Some([255, 0, 0, 255]));
        assert_eq!(dst.get_pixel(0, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_composite_over_negative_offset() {
        let mut dst = FrameBuffer::solid(4, 4, &Color::BLUE);
        let src = FrameBuffer::solid(3, 3, &Color::RED);
        dst.composite_over(&src, -2, -2);
        assert_eq!(dst.get_pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(dst.get_pixel(1, 1), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_composite_over_transparent() {
        let mut dst = FrameBuffer::solid(4, 4, &Color::WHITE);
        let src = FrameBuffer::new(2, 2);
        dst.composite_over(&src, 0, 0);
        assert_eq!(dst.get_pixel(0, 0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_composite_over_semi_transparent() {
        let mut dst = FrameBuffer::solid(2, 2, &Color::WHITE);
        let mut src = FrameBuffer::new(1, 1);
        src.set_pixel(0, 0, [255, 0, 0, 128]);

        dst.composite_over(&src, 0, 0);

        let pixel = dst.get_pixel(0, 0).unwrap();
        assert!(pixel[0] > 200);
        assert!(pixel[1] > 50 && pixel[1] < 200);
        assert!(pixel[2] > 50 && pixel[2] < 200);
    }

    #[test]
    fn test_composite_clipped_to_columns() {
        let mut dst = FrameBuffer::solid(10, 2, &Color::BLUE);
        let src = FrameBuffer::solid(10, 2, &Color::RED);
        dst.composite_over_clipped(&src, 0, 0, 0..3);
        for x in 0..10 {
            let expected = if x < 3 { [255, 0, 0, 255] } else { [0, 0, 255, 255] };
            assert_eq!(dst.get_pixel(x, 1), Some(expected), "column {}", x);
        }
    }

    #[test]
    fn test_composite_clipped_empty_range() {
        let mut dst = FrameBuffer::solid(4, 4, &Color::BLUE);
        let src = FrameBuffer::solid(4, 4, &Color::RED);
        dst.composite_over_clipped(&src, 0, 0, 2..2);
        assert_eq!(dst, FrameBuffer::solid(4, 4, &Color::BLUE));
    }
}
