//! # wipecast-render
//!
//! Turns image sources into drawable bitmaps and composites the two-image
//! wipe onto a canvas. Everything here is CPU-only and deterministic: the
//! same images, canvas and boundary always produce the same pixels.

pub mod compositor;
pub mod image_loader;

pub use compositor::{composite, render_still, CompositeStyle, FittedImage, WipeCompositor};
pub use image_loader::{ImageHandle, ImageLoader, ImageSource};
