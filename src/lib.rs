pub mod animation;
pub mod camera;
pub mod config;
pub mod error;
pub mod feedback;
pub mod joints;
pub mod logging;
pub mod scoring;
pub mod sync;
