//! What the preview shows between two detector runs.
//!
//! Each detector callback replaces the overlay set wholesale; frames read in
//! between are drawn with the last set.

use std::time::{Duration, Instant};

use hatrs_vision::placement::keyed;
use hatrs_vision::{place_all, DetectionResult, FaceId, Hat, OverlayConfig, OverlayTransform};
use image::RgbImage;

pub struct Stage {
    hat: Hat,
    config: OverlayConfig,
    overlays: Vec<OverlayTransform>,
}

impl Stage {
    pub fn new(hat: Hat, config: OverlayConfig) -> Self {
        Self {
            hat,
            config,
            overlays: Vec::new(),
        }
    }

    pub fn overlays(&self) -> &[OverlayTransform] {
        &self.overlays
    }

    /// Detector callback. A result that breaks the observation contract
    /// drops this frame's overlays; the next callback starts clean.
    pub fn on_faces_detected(&mut self, result: &DetectionResult) {
        if let Err(e) = result.validate() {
            log::warn!("discarding detection result: {}", e);
            self.overlays.clear();
            return;
        }

        let next = place_all(&result.faces, &self.config);
        let previous = keyed(&self.overlays);
        for t in &next {
            if !previous.contains_key(&t.id) {
                log::debug!("face {} entered", t.id);
            }
        }
        let current = keyed(&next);
        for id in previous.keys().filter(|id| !current.contains_key(id)) {
            log::debug!("face {} left", id);
        }
        self.overlays = next;
    }

    pub fn overlay(&self, id: FaceId) -> Option<&OverlayTransform> {
        self.overlays.iter().find(|t| t.id == id)
    }

    /// Draw every current overlay onto `frame`.
    pub fn compose(&self, frame: &mut RgbImage) {
        for t in &self.overlays {
            self.hat.draw(frame, t, self.config.perspective);
        }
    }
}

/// Gates detector runs to at most one per `min_interval`.
#[derive(Debug, Clone)]
pub struct DetectionClock {
    min_interval: Duration,
    last: Option<Instant>,
}

impl DetectionClock {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// True if the detector should run for a frame read at `now`; records
    /// the run when it does.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.min_interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
