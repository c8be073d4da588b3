use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection};
use crate::observation::{BoundingBox, DetectionResult, FaceId, FaceObservation};
use crate::tracker::FaceTracker;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Keep face ids stable across frames
    pub tracking: bool,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
            tracking: true,
        }
    }
}

/// Frame in, face observations out: detect → estimate pose → assign ids
pub struct Pipeline {
    pub detector: Session,
    tracker: Option<FaceTracker>,
    settings: DetectorSettings,
}

impl Pipeline {
    pub fn new(model: &Path, settings: DetectorSettings) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(model)?,
            tracker: settings.tracking.then(FaceTracker::default),
            settings,
        })
    }

    pub fn observe(&mut self, img: &DynamicImage) -> Result<DetectionResult> {
        let detections = face::detect_faces(
            &mut self.detector,
            img,
            self.settings.score_threshold,
            self.settings.nms_threshold,
        )
        .context("detecting faces")?;
        log::debug!("detected {} face(s)", detections.len());
        Ok(to_observations(&detections, self.tracker.as_mut()))
    }
}

/// Attach ids and head pose to raw detections. Without a tracker the id is
/// the detection's index in this frame.
pub fn to_observations(
    detections: &[Detection],
    tracker: Option<&mut FaceTracker>,
) -> DetectionResult {
    let ids = match tracker {
        Some(tracker) => {
            let boxes: Vec<[f32; 4]> = detections.iter().map(|d| d.bbox).collect();
            tracker.assign(&boxes)
        }
        None => (0..detections.len() as u64).map(FaceId).collect(),
    };

    let faces = detections
        .iter()
        .zip(ids)
        .map(|(detection, id)| {
            let (roll_angle, yaw_angle) = face::estimate_pose(detection);
            FaceObservation {
                id,
                bounding_box: BoundingBox::from_xywh(detection.bbox),
                roll_angle,
                yaw_angle,
            }
        })
        .collect();
    DetectionResult::new(faces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: f32) -> Detection {
        Detection {
            bbox: [x, 20.0, 40.0, 40.0],
            score: 0.9,
            landmarks: [
                x + 10.0, 30.0, x + 30.0, 30.0, x + 20.0, 40.0, 0.0, 0.0, 0.0, 0.0,
            ],
        }
    }

    #[test]
    fn test_untracked_ids_are_indices() {
        let result = to_observations(&[detection(0.0), detection(100.0)], None);
        let ids: Vec<_> = result.faces.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![FaceId(0), FaceId(1)]);
        assert_eq!(result.faces[1].bounding_box, BoundingBox::new(100.0, 20.0, 40.0, 40.0));
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_tracked_ids_follow_faces() {
        let mut tracker = FaceTracker::default();
        to_observations(&[detection(0.0), detection(100.0)], Some(&mut tracker));
        let result = to_observations(&[detection(102.0)], Some(&mut tracker));
        assert_eq!(result.faces[0].id, FaceId(1));
    }

    #[test]
    fn test_no_detections() {
        assert!(to_observations(&[], None).is_empty());
    }
}
