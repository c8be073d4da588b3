pub mod config;
pub mod stage;

// Re-export vision types for convenience
pub use hatrs_vision::{
    observation, placement, render, video, DetectionResult, FaceObservation, Hat,
    OverlayConfig, OverlayTransform, Pipeline,
};
