pub mod face;
pub mod model;
pub mod observation;
pub mod pipeline;
pub mod placement;
pub mod render;
pub mod tracker;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use observation::{BoundingBox, ContractViolation, DetectionResult, FaceId, FaceObservation};
pub use pipeline::Pipeline;
pub use placement::{place, place_all, AngleRounding, OverlayConfig, OverlayTransform};
pub use render::Hat;
pub use video::Camera;
