//! Face observations as handed over by the detector, and the checks a
//! detection result has to pass before overlay placement sees it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Detector-assigned identity of a face. Stable across frames while the face
/// is tracked, unique within one detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceId(pub u64);

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

/// Axis-aligned face rectangle in frame coordinates, origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub origin: Point,
    pub size: Size,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point { x, y },
            size: Size { width, height },
        }
    }

    /// Same layout the detector uses: `[x, y, w, h]`
    pub fn from_xywh(bbox: [f32; 4]) -> Self {
        Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.origin.x + self.size.width / 2.0,
            y: self.origin.y + self.size.height / 2.0,
        }
    }
}

/// One detector-reported face. Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceObservation {
    #[serde(alias = "faceID")]
    pub id: FaceId,
    #[serde(alias = "bounds")]
    pub bounding_box: BoundingBox,
    pub roll_angle: f32,
    pub yaw_angle: f32,
}

/// All faces reported by one detector callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub faces: Vec<FaceObservation>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractViolation {
    #[error("face {id}: bounding box must have positive size, got {width}x{height}")]
    NonPositiveSize { id: FaceId, width: f32, height: f32 },
    #[error("face {id}: bounding box origin is not finite ({x}, {y})")]
    NonFiniteOrigin { id: FaceId, x: f32, y: f32 },
    #[error("face {id}: {angle} angle is not finite ({value})")]
    NonFiniteAngle {
        id: FaceId,
        angle: &'static str,
        value: f32,
    },
    #[error("face id {0} appears more than once in one detection result")]
    DuplicateId(FaceId),
}

impl FaceObservation {
    pub fn validate(&self) -> Result<(), ContractViolation> {
        let BoundingBox { origin, size } = self.bounding_box;
        // NaN fails the comparison too
        let positive = size.width > 0.0 && size.height > 0.0;
        if !positive || !size.width.is_finite() || !size.height.is_finite() {
            return Err(ContractViolation::NonPositiveSize {
                id: self.id,
                width: size.width,
                height: size.height,
            });
        }
        if !origin.x.is_finite() || !origin.y.is_finite() {
            return Err(ContractViolation::NonFiniteOrigin {
                id: self.id,
                x: origin.x,
                y: origin.y,
            });
        }
        for (angle, value) in [("roll", self.roll_angle), ("yaw", self.yaw_angle)] {
            if !value.is_finite() {
                return Err(ContractViolation::NonFiniteAngle {
                    id: self.id,
                    angle,
                    value,
                });
            }
        }
        Ok(())
    }
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceObservation>) -> Self {
        Self { faces }
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Reject the whole result on the first face that breaks the contract.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        let mut seen = HashSet::with_capacity(self.faces.len());
        for face in &self.faces {
            face.validate()?;
            if !seen.insert(face.id) {
                return Err(ContractViolation::DuplicateId(face.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: u64, w: f32, h: f32) -> FaceObservation {
        FaceObservation {
            id: FaceId(id),
            bounding_box: BoundingBox::new(0.0, 0.0, w, h),
            roll_angle: 0.0,
            yaw_angle: 0.0,
        }
    }

    #[test]
    fn test_empty_result_is_valid() {
        assert!(DetectionResult::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_boxes() {
        for (w, h) in [(0.0, 10.0), (10.0, -1.0), (f32::NAN, 10.0), (f32::INFINITY, 5.0)] {
            let err = face(1, w, h).validate().unwrap_err();
            assert!(matches!(err, ContractViolation::NonPositiveSize { .. }), "{w}x{h}");
        }
    }

    #[test]
    fn test_rejects_non_finite_angles() {
        let mut f = face(3, 10.0, 10.0);
        f.yaw_angle = f32::NAN;
        assert!(matches!(
            f.validate(),
            Err(ContractViolation::NonFiniteAngle { angle: "yaw", .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let result = DetectionResult::new(vec![face(7, 10.0, 10.0), face(7, 20.0, 20.0)]);
        assert_eq!(result.validate(), Err(ContractViolation::DuplicateId(FaceId(7))));
    }

    #[test]
    fn test_accepts_detector_shaped_json() {
        let raw = r#"{"faces":[{"faceID":4,"bounds":{"origin":{"x":1.5,"y":2},"size":{"width":30,"height":40}},"rollAngle":-4.2,"yawAngle":11}]}"#;
        let result: DetectionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.faces.len(), 1);
        assert_eq!(result.faces[0].id, FaceId(4));
        assert_eq!(result.faces[0].bounding_box, BoundingBox::new(1.5, 2.0, 30.0, 40.0));
        assert!(result.validate().is_ok());
    }
}
