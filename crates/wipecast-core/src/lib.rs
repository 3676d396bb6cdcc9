//! # wipecast-core
//!
//! Core types and primitives for Wipecast.
//! This crate contains the foundational types shared across all Wipecast crates:
//! frame buffers, colors, fit geometry, boundary positions, container formats,
//! configuration, and the error type.

pub mod boundary;
pub mod color;
pub mod config;
pub mod error;
pub mod format;
pub mod frame;
pub mod hash;
pub mod math;

pub use config::*;

pub use boundary::{BoundaryHandle, BoundaryPosition, RevealSide};
pub use color::Color;
pub use error::{WipecastError, WipecastResult};
pub use format::ContainerFormat;
pub use frame::FrameBuffer;
pub use math::{fit_rect, Rect, Size2D};
