//! # wipecast-cloud
//!
//! Narrow contracts for the services a comparison talks to, each with one
//! concrete implementation: an in-memory identity provider, a filesystem
//! comparison store and an HTTP client for a Gemini-style generative API.

pub mod ai;
pub mod identity;
pub mod store;

pub use ai::{
    compare_images, ComparisonResult, DiffService, GeminiClient, GeneratedVideo, VideoLocation,
    COMPARE_FAILED,
};
pub use identity::{Access, AccessGate, IdentityProvider, MemoryIdentity, User};
pub use store::{save_comparison, ComparisonRecord, ComparisonStore, LocalStore};
