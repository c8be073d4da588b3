use std::path::Path;

use anyhow::{Context, Result};
use image::{Rgb, RgbImage, RgbaImage};

use crate::placement::OverlayTransform;

/// Projective map from overlay-local coordinates (origin at the overlay
/// center, y down) to screen coordinates relative to the same center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub m: [[f32; 3]; 3],
}

impl Homography {
    pub const IDENTITY: Homography = Homography {
        m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// `perspective(d) · rotateZ(roll) · rotateY(yaw) · translateY(offset)`
    /// restricted to the overlay plane (z = 0).
    pub fn for_overlay(transform: &OverlayTransform, perspective: f32) -> Self {
        let (sr, cr) = transform.roll_degrees.to_radians().sin_cos();
        let (sy, cy) = transform.yaw_degrees.to_radians().sin_cos();

        // Columns 0 and 1 of Rz·Ry give the image of the local x/y axes,
        // row 2 of the same product feeds the perspective divide.
        let depth = if perspective > 0.0 {
            sy / perspective
        } else {
            0.0
        };
        let rotation = Homography {
            m: [[cr * cy, -sr, 0.0], [sr * cy, cr, 0.0], [depth, 0.0, 1.0]],
        };
        let offset = Homography {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, transform.vertical_offset], [0.0, 0.0, 1.0]],
        };
        rotation.then(&offset)
    }

    /// Matrix product `self · rhs`: `rhs` is applied to points first.
    pub fn then(&self, rhs: &Homography) -> Homography {
        let mut m = [[0.0f32; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        Homography { m }
    }

    /// Map a point. `None` when it lands on or behind the viewer.
    pub fn apply(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w <= 1e-6 {
            return None;
        }
        Some((
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        ))
    }

    pub fn inverse(&self) -> Option<Homography> {
        let m = &self.m;
        let cof = |r0: usize, r1: usize, c0: usize, c1: usize| {
            m[r0][c0] * m[r1][c1] - m[r0][c1] * m[r1][c0]
        };
        let adj = [
            [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
            [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
            [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
        ];
        let det = m[0][0] * adj[0][0] + m[0][1] * adj[1][0] + m[0][2] * adj[2][0];
        if det.abs() < 1e-9 {
            return None;
        }
        let mut inv = adj;
        for row in inv.iter_mut() {
            for cell in row.iter_mut() {
                *cell /= det;
            }
        }
        Some(Homography { m: inv })
    }
}

/// The decorative asset drawn over every face.
#[derive(Debug, Clone)]
pub struct Hat {
    image: RgbaImage,
}

impl Hat {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("loading hat asset {}", path.display()))?
            .to_rgba8();
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("hat asset {} is empty", path.display());
        }
        Ok(Self { image })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Width drives the size, height keeps the asset's aspect ratio.
    pub fn display_height(&self, width: f32) -> f32 {
        let (w, h) = self.image.dimensions();
        width * h as f32 / w as f32
    }

    /// Composite the hat onto `frame` as described by `transform`.
    pub fn draw(&self, frame: &mut RgbImage, transform: &OverlayTransform, perspective: f32) {
        let width = transform.size.width;
        let height = self.display_height(width);
        if !(width > 0.0 && height > 0.0) {
            return;
        }

        // Laid out centered in the face box, transformed about its own center
        let cx = transform.anchor.x + transform.size.width / 2.0;
        let cy = transform.anchor.y + transform.size.height / 2.0;

        let forward = Homography::for_overlay(transform, perspective);
        let Some(inverse) = forward.inverse() else {
            log::debug!("face {}: degenerate overlay transform", transform.id);
            return;
        };

        let (hw, hh) = (width / 2.0, height / 2.0);
        let mut min = (f32::MAX, f32::MAX);
        let mut max = (f32::MIN, f32::MIN);
        for (x, y) in [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)] {
            let Some((sx, sy)) = forward.apply(x, y) else {
                log::debug!("face {}: overlay crosses the viewer plane", transform.id);
                return;
            };
            min = (min.0.min(sx + cx), min.1.min(sy + cy));
            max = (max.0.max(sx + cx), max.1.max(sy + cy));
        }

        let (frame_w, frame_h) = frame.dimensions();
        let x0 = min.0.floor().max(0.0) as u32;
        let y0 = min.1.floor().max(0.0) as u32;
        let x1 = (max.0.ceil().max(0.0) as u32).min(frame_w);
        let y1 = (max.1.ceil().max(0.0) as u32).min(frame_h);

        let (img_w, img_h) = self.image.dimensions();
        let scale_x = img_w as f32 / width;
        let scale_y = img_h as f32 / height;

        for py in y0..y1 {
            for px in x0..x1 {
                let Some((u, v)) = inverse.apply(px as f32 + 0.5 - cx, py as f32 + 0.5 - cy)
                else {
                    continue;
                };
                if u < -hw || u > hw || v < -hh || v > hh {
                    continue;
                }
                let src = self.sample((u + hw) * scale_x - 0.5, (v + hh) * scale_y - 0.5);
                blend(frame.get_pixel_mut(px, py), src);
            }
        }
    }

    /// Bilinear sample, coordinates clamped to the asset edges.
    fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        let (w, h) = self.image.dimensions();
        let x = x.max(0.0).min((w - 1) as f32);
        let y = y.max(0.0).min((h - 1) as f32);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(w - 1);
        let y1 = (y0 + 1).min(h - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let w00 = (1.0 - fx) * (1.0 - fy);
        let w10 = fx * (1.0 - fy);
        let w01 = (1.0 - fx) * fy;
        let w11 = fx * fy;

        let p00 = self.image.get_pixel(x0, y0);
        let p10 = self.image.get_pixel(x1, y0);
        let p01 = self.image.get_pixel(x0, y1);
        let p11 = self.image.get_pixel(x1, y1);

        let mut out = [0.0f32; 4];
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = p00[c] as f32 * w00
                + p10[c] as f32 * w10
                + p01[c] as f32 * w01
                + p11[c] as f32 * w11;
        }
        out
    }
}

fn blend(dst: &mut Rgb<u8>, src: [f32; 4]) {
    let alpha = src[3] / 255.0;
    if alpha <= 0.0 {
        return;
    }
    for c in 0..3 {
        let mixed = src[c] * alpha + dst[c] as f32 * (1.0 - alpha);
        dst[c] = mixed.round().max(0.0).min(255.0) as u8;
    }
}
