//! Overlay placement: one face observation in, one overlay transform out.
//!
//! The transform is meant to be applied the way a CSS transform list
//! `[perspective(p), rotateZ(roll), rotateY(yaw), translateY(offset)]` is,
//! about the overlay's own center. See [`crate::render::Homography`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::observation::{FaceId, FaceObservation, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleRounding {
    /// Round to whole degrees, ties away from zero
    #[default]
    Nearest,
    None,
}

impl AngleRounding {
    pub fn apply(self, degrees: f32) -> f32 {
        match self {
            AngleRounding::Nearest => degrees.round(),
            AngleRounding::None => degrees,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Displacement along the overlay's local y axis, before rotation.
    /// Negative lifts the overlay above the face.
    #[serde(alias = "verticalOffsetPx")]
    pub vertical_offset_px: f32,
    #[serde(alias = "angleRounding")]
    pub angle_rounding: AngleRounding,
    /// Perspective depth used by the renderer
    pub perspective: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            vertical_offset_px: -75.0,
            angle_rounding: AngleRounding::Nearest,
            perspective: 600.0,
        }
    }
}

/// Where and how to draw the overlay for one face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayTransform {
    pub id: FaceId,
    pub anchor: Point,
    pub size: Size,
    pub vertical_offset: f32,
    pub roll_degrees: f32,
    pub yaw_degrees: f32,
}

/// Place the overlay for a single face.
///
/// Total over every observation that passed
/// [`FaceObservation::validate`]; nothing is checked here.
pub fn place(face: &FaceObservation, config: &OverlayConfig) -> OverlayTransform {
    OverlayTransform {
        id: face.id,
        anchor: face.bounding_box.origin,
        size: face.bounding_box.size,
        vertical_offset: config.vertical_offset_px,
        roll_degrees: config.angle_rounding.apply(face.roll_angle),
        yaw_degrees: config.angle_rounding.apply(face.yaw_angle),
    }
}

/// Place every face of one detection result, in input order.
pub fn place_all(faces: &[FaceObservation], config: &OverlayConfig) -> Vec<OverlayTransform> {
    faces.iter().map(|face| place(face, config)).collect()
}

/// Index transforms by face id for reconciliation across frames.
pub fn keyed(transforms: &[OverlayTransform]) -> BTreeMap<FaceId, OverlayTransform> {
    transforms.iter().map(|t| (t.id, *t)).collect()
}
