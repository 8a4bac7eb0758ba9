//! CLI command implementations

mod camera;
mod config;

pub use camera::{CameraArgs, camera};
pub use config::{ConfigArgs, config};
