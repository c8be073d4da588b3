use crate::yunet;
use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// YuNet runs on a fixed 640x640 input
pub const INPUT_SIZE: u32 = 640;

/// Nose deviation from the eye midpoint is mapped to degrees with this gain
const YAW_GAIN: f32 = 90.0;

/// Face found by the detector, in source image pixels
#[derive(Debug, Clone)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // right eye, left eye, nose tip, right mouth, left mouth as x,y pairs
}

impl Detection {
    fn point(&self, i: usize) -> (f32, f32) {
        (self.landmarks[i * 2], self.landmarks[i * 2 + 1])
    }
}

/// How a source image was scaled and padded into the square detector input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = target as f32 / width.max(height) as f32;
        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;
        Self {
            scale,
            offset_x: (target - new_width.min(target)) / 2,
            offset_y: (target - new_height.min(target)) / 2,
        }
    }

    /// Canvas pixels back to source pixels
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.offset_x as f32) / self.scale,
            (y - self.offset_y as f32) / self.scale,
        )
    }
}

/// Detect faces using YuNet
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (orig_width, orig_height) = img.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Ok(vec![]);
    }
    let letterbox = Letterbox::fit(orig_width, orig_height, INPUT_SIZE);

    let resized = img.resize_exact(
        ((orig_width as f32 * letterbox.scale) as u32).max(1),
        ((orig_height as f32 * letterbox.scale) as u32).max(1),
        image::imageops::FilterType::Triangle,
    );
    let mut canvas = DynamicImage::new_rgb8(INPUT_SIZE, INPUT_SIZE);
    image::imageops::overlay(
        &mut canvas,
        &resized,
        letterbox.offset_x as i64,
        letterbox.offset_y as i64,
    );

    let input = Value::from_array(to_bgr_planes(&canvas))?;
    let outputs = session.run(ort::inputs![input])?;

    let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let heads = yunet::parse_outputs(&tensors, INPUT_SIZE as usize)?;
    let raw = yunet::decode(&heads, score_threshold, INPUT_SIZE as usize);
    log::debug!("yunet: {} candidates above {:.2}", raw.len(), score_threshold);

    let size = INPUT_SIZE as f32;
    let mut detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let (x, y) = letterbox.unmap(d.bbox[0] * size, d.bbox[1] * size);
            let mut landmarks = [0.0f32; 10];
            for i in 0..5 {
                let (lx, ly) =
                    letterbox.unmap(d.landmarks[i * 2] * size, d.landmarks[i * 2 + 1] * size);
                landmarks[i * 2] = lx;
                landmarks[i * 2 + 1] = ly;
            }
            Detection {
                bbox: [
                    x,
                    y,
                    d.bbox[2] * size / letterbox.scale,
                    d.bbox[3] * size / letterbox.scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    Ok(detections)
}

/// [1, 3, H, W] float tensor in BGR plane order, values in [0, 255]
fn to_bgr_planes(img: &DynamicImage) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut planes = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, px) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        planes[[0, 0, y, x]] = px[2] as f32;
        planes[[0, 1, y, x]] = px[1] as f32;
        planes[[0, 2, y, x]] = px[0] as f32;
    }
    planes
}

/// Apply non-maximum suppression to remove overlapping detections
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

pub fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    let union = a[2] * a[3] + b[2] * b[3] - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Head roll and yaw in degrees, estimated from the five landmarks.
///
/// Roll is the angle of the eye line against the horizontal, positive when
/// the head tilts clockwise on screen. Yaw comes from how far the nose tip
/// sits from the eye midpoint along the eye line, relative to half the eye
/// distance.
pub fn estimate_pose(detection: &Detection) -> (f32, f32) {
    // YuNet lists the subject's right eye first, which is the left one on screen
    let (ax, ay) = detection.point(0);
    let (bx, by) = detection.point(1);
    let (nx, ny) = detection.point(2);

    let (dx, dy) = (bx - ax, by - ay);
    let eye_dist = (dx * dx + dy * dy).sqrt();
    if eye_dist <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let roll = dy.atan2(dx);

    // Nose offset projected on the eye line
    let (mx, my) = ((ax + bx) / 2.0, (ay + by) / 2.0);
    let along = ((nx - mx) * dx + (ny - my) * dy) / eye_dist;
    let ratio = (along / (eye_dist / 2.0)).clamp(-1.0, 1.0);

    (roll.to_degrees(), ratio * YAW_GAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: [f32; 4], score: f32) -> Detection {
        Detection {
            bbox,
            score,
            landmarks: [0.0; 10],
        }
    }

    fn with_landmarks(points: [(f32, f32); 3]) -> Detection {
        let mut d = detection([0.0, 0.0, 100.0, 100.0], 0.9);
        for (i, (x, y)) in points.iter().enumerate() {
            d.landmarks[i * 2] = *x;
            d.landmarks[i * 2 + 1] = *y;
        }
        d
    }

    #[test]
    fn test_iou() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [15.0, 15.0, 20.0, 20.0];
        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);

        let c = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(compute_iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms() {
        let detections = vec![
            detection([10.0, 10.0, 20.0, 20.0], 0.9),
            detection([12.0, 12.0, 20.0, 20.0], 0.8),
            detection([100.0, 100.0, 20.0, 20.0], 0.85),
        ];

        let result = nms(&detections, 0.3);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.85);
    }

    #[test]
    fn test_letterbox_unmap() {
        let lb = Letterbox::fit(1280, 720, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!(lb.offset_x, 0);
        assert_eq!(lb.offset_y, 140);
        assert_eq!(lb.unmap(320.0, 320.0), (640.0, 360.0));
    }

    #[test]
    fn test_frontal_face_has_no_pose() {
        let d = with_landmarks([(30.0, 40.0), (70.0, 40.0), (50.0, 60.0)]);
        let (roll, yaw) = estimate_pose(&d);
        assert!(roll.abs() < 1e-4);
        assert!(yaw.abs() < 1e-4);
    }

    #[test]
    fn test_tilted_head_rolls() {
        // eye line drops 40px over 40px: 45 degrees clockwise on screen
        let d = with_landmarks([(30.0, 20.0), (70.0, 60.0), (45.0, 55.0)]);
        let (roll, _) = estimate_pose(&d);
        assert!((roll - 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_turned_head_yaws() {
        let right = with_landmarks([(30.0, 40.0), (70.0, 40.0), (60.0, 60.0)]);
        let left = with_landmarks([(30.0, 40.0), (70.0, 40.0), (40.0, 60.0)]);
        let (_, yaw_r) = estimate_pose(&right);
        let (_, yaw_l) = estimate_pose(&left);
        assert!((yaw_r - 45.0).abs() < 1e-3);
        assert!((yaw_l + 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_collapsed_eyes() {
        let d = with_landmarks([(50.0, 50.0), (50.0, 50.0), (50.0, 60.0)]);
        assert_eq!(estimate_pose(&d), (0.0, 0.0));
    }
}
