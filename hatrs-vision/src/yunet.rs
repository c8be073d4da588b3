//! YuNet post-processing.
//!
//! YuNet is anchor free. For each stride (8, 16, 32) it emits, per grid cell:
//! - cls: [1, H*W, 1] class score
//! - obj: [1, H*W, 1] objectness
//! - bbox: [1, H*W, 4] center deltas and log-scale size
//! - kps: [1, H*W, 10] five landmark deltas
//!
//! Output order is cls_8, cls_16, cls_32, obj_8, ..., bbox_8, ..., kps_8, ...
//! Cell (row, col) decodes to
//! cx = (col + dx) * stride, w = exp(dw) * stride, and the same for y/h.

use anyhow::Result;
use ndarray::Array2;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Detection in the detector's input space, normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Everything the network predicted at one stride.
#[derive(Debug, Clone)]
pub struct StrideHead {
    pub stride: usize,
    /// (cells, 1) fused class * objectness score
    pub scores: Array2<f32>,
    /// (cells, 4)
    pub bbox: Array2<f32>,
    /// (cells, 10)
    pub kps: Array2<f32>,
}

impl StrideHead {
    pub fn grid(&self, input_size: usize) -> usize {
        input_size / self.stride
    }
}

/// Split the twelve raw output tensors into one head per stride.
pub fn parse_outputs(outputs: &[(Vec<i64>, Vec<f32>)], input_size: usize) -> Result<Vec<StrideHead>> {
    if outputs.len() < 12 {
        anyhow::bail!("YuNet produced {} outputs, expected 12", outputs.len());
    }

    let mut heads = Vec::with_capacity(STRIDES.len());
    for (scale, &stride) in STRIDES.iter().enumerate() {
        let cells = (input_size / stride) * (input_size / stride);
        let cls = tensor(&outputs[scale], cells, 1, "cls", stride)?;
        let obj = tensor(&outputs[scale + 3], cells, 1, "obj", stride)?;
        let bbox = tensor(&outputs[scale + 6], cells, 4, "bbox", stride)?;
        let kps = tensor(&outputs[scale + 9], cells, 10, "kps", stride)?;

        let scores = ndarray::Zip::from(&cls)
            .and(&obj)
            .map_collect(|&c, &o| (c.clamp(0.0, 1.0) * o.clamp(0.0, 1.0)).sqrt());

        heads.push(StrideHead {
            stride,
            scores,
            bbox,
            kps,
        });
    }
    Ok(heads)
}

fn tensor(
    (shape, data): &(Vec<i64>, Vec<f32>),
    cells: usize,
    width: usize,
    name: &str,
    stride: usize,
) -> Result<Array2<f32>> {
    let expected = [1, cells as i64, width as i64];
    if shape.as_slice() != expected {
        anyhow::bail!(
            "unexpected {} shape at stride {}: {:?}, expected {:?}",
            name,
            stride,
            shape,
            expected
        );
    }
    Ok(Array2::from_shape_vec((cells, width), data.clone())?)
}

/// Turn every cell scoring at least `score_threshold` into a detection.
pub fn decode(heads: &[StrideHead], score_threshold: f32, input_size: usize) -> Vec<RawDetection> {
    let size = input_size as f32;
    let mut detections = Vec::new();

    for head in heads {
        let grid = head.grid(input_size);
        let stride = head.stride as f32;

        for row in 0..grid {
            for col in 0..grid {
                let idx = row * grid + col;
                let score = head.scores[[idx, 0]];
                if score < score_threshold {
                    continue;
                }

                let cx = (col as f32 + head.bbox[[idx, 0]]) * stride;
                let cy = (row as f32 + head.bbox[[idx, 1]]) * stride;
                let w = head.bbox[[idx, 2]].exp() * stride;
                let h = head.bbox[[idx, 3]].exp() * stride;

                let mut landmarks = [0.0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (col as f32 + head.kps[[idx, k * 2]]) * stride / size;
                    landmarks[k * 2 + 1] =
                        (row as f32 + head.kps[[idx, k * 2 + 1]]) * stride / size;
                }

                detections.push(RawDetection {
                    bbox: [
                        (cx - w / 2.0) / size,
                        (cy - h / 2.0) / size,
                        w / size,
                        h / size,
                    ],
                    score,
                    landmarks,
                });
            }
        }
    }

    detections
}
