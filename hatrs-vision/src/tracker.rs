//! Detector-side face identities.
//!
//! Each frame's detections are matched to the previous frame's tracks by box
//! overlap, greedily from the best pair down. Matched detections inherit the
//! track id, unmatched ones open a new track, and a track that goes
//! unmatched for more than `max_missed` frames is forgotten.

use crate::face::compute_iou;
use crate::observation::FaceId;

#[derive(Debug, Clone)]
struct Track {
    id: FaceId,
    bbox: [f32; 4],
    missed: u32,
}

#[derive(Debug, Clone)]
pub struct FaceTracker {
    tracks: Vec<Track>,
    next_id: u64,
    iou_threshold: f32,
    max_missed: u32,
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new(0.3, 5)
    }
}

impl FaceTracker {
    pub fn new(iou_threshold: f32, max_missed: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            iou_threshold,
            max_missed,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Ids for `boxes`, in the same order. Ids within one call are distinct.
    pub fn assign(&mut self, boxes: &[[f32; 4]]) -> Vec<FaceId> {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (d, bbox) in boxes.iter().enumerate() {
            for (t, track) in self.tracks.iter().enumerate() {
                let iou = compute_iou(bbox, &track.bbox);
                if iou > self.iou_threshold {
                    pairs.push((iou, d, t));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut ids: Vec<Option<FaceId>> = vec![None; boxes.len()];
        let mut matched = vec![false; self.tracks.len()];
        for (_, d, t) in pairs {
            if ids[d].is_some() || matched[t] {
                continue;
            }
            ids[d] = Some(self.tracks[t].id);
            matched[t] = true;
            self.tracks[t].bbox = boxes[d];
            self.tracks[t].missed = 0;
        }

        for (track, hit) in self.tracks.iter_mut().zip(&matched) {
            if !hit {
                track.missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|t| t.missed <= max_missed);

        ids.into_iter()
            .zip(boxes)
            .map(|(id, bbox)| match id {
                Some(id) => id,
                None => {
                    let id = FaceId(self.next_id);
                    self.next_id += 1;
                    log::debug!("tracking new face {}", id);
                    self.tracks.push(Track {
                        id,
                        bbox: *bbox,
                        missed: 0,
                    });
                    id
                }
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_survive_small_motion() {
        let mut tracker = FaceTracker::default();
        let first = tracker.assign(&[[10.0, 10.0, 50.0, 50.0], [200.0, 40.0, 60.0, 60.0]]);
        assert_eq!(first, vec![FaceId(0), FaceId(1)]);

        // reported in the opposite order and slightly moved
        let second = tracker.assign(&[[203.0, 42.0, 60.0, 60.0], [12.0, 11.0, 50.0, 50.0]]);
        assert_eq!(second, vec![FaceId(1), FaceId(0)]);
    }

    #[test]
    fn test_new_face_gets_fresh_id() {
        let mut tracker = FaceTracker::default();
        tracker.assign(&[[10.0, 10.0, 50.0, 50.0]]);
        let ids = tracker.assign(&[[10.0, 10.0, 50.0, 50.0], [400.0, 400.0, 30.0, 30.0]]);
        assert_eq!(ids, vec![FaceId(0), FaceId(1)]);
    }

    #[test]
    fn test_overlapping_detections_do_not_share_an_id() {
        let mut tracker = FaceTracker::default();
        tracker.assign(&[[10.0, 10.0, 50.0, 50.0]]);
        let ids = tracker.assign(&[[11.0, 10.0, 50.0, 50.0], [14.0, 12.0, 50.0, 50.0]]);
        assert_eq!(ids, vec![FaceId(0), FaceId(1)]);
    }

    #[test]
    fn test_lost_track_expires() {
        let mut tracker = FaceTracker::new(0.3, 2);
        tracker.assign(&[[10.0, 10.0, 50.0, 50.0]]);
        for _ in 0..2 {
            tracker.assign(&[]);
        }
        assert_eq!(tracker.len(), 1);
        tracker.assign(&[]);
        assert!(tracker.is_empty());

        let ids = tracker.assign(&[[10.0, 10.0, 50.0, 50.0]]);
        assert_eq!(ids, vec![FaceId(1)]);
    }
}
