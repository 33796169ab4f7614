pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod media;
pub mod remux;
pub mod sidecar_api;
pub mod thumbnail;

pub use config::RemuxConfig;
pub use frame::{PixelFrame, is_black};
pub use media::{MediaHandle, MediaIndexer, PathResolver};
pub use remux::{JobState, RemuxHandle, RemuxJob, RemuxOrchestrator, RemuxOutcome, RemuxProgress};
pub use thumbnail::{ThumbnailResult, ThumbnailSelector};
