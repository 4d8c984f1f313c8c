//! Landmark-based geometric normalisation of face images.
//!
//! Two uses: warping a face onto the canonical 112×112 ArcFace template
//! before embedding, and levelling the eye line of a whole image for the
//! Aligned stage.

use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const CANONICAL_SIZE: u32 = 112;

/// 4-DOF similarity transform (scale, rotation, translation):
///
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit mapping `src` points onto `dst`. `None` if degenerate.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        // Per point pair:  sx*a - sy*b + tx = dx ;  sy*a + sx*b + ty = dy
        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let r1 = [sx, -sy, 1.0, 0.0];
            let r2 = [sy, sx, 0.0, 1.0];
            for j in 0..4 {
                for k in 0..4 {
                    ata[j][k] += r1[j] * r1[k] + r2[j] * r2[k];
                }
                atb[j] += r1[j] * dx + r2[j] * dy;
            }
        }

        let [a, b, tx, ty] = solve_4x4(ata, atb)?;
        Some(Self { a, b, tx, ty })
    }

    /// Pure rotation by `angle` radians (counter-clockwise in image coordinates
    /// with y pointing down) around `center`.
    pub fn rotation_about(center: (f32, f32), angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        let (cx, cy) = center;
        Self {
            a: cos,
            b: sin,
            tx: cx - cos * cx + sin * cy,
            ty: cy - sin * cx - cos * cy,
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let ia = self.a / det;
        let ib = -self.b / det;
        // inverse of [R|t] is [R^-1 | -R^-1 t]
        Some(Self {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }

    /// Render `src` through this transform into an `out_w × out_h` image.
    ///
    /// Bilinear sampling; pixels mapping outside `src` are black.
    pub fn warp(&self, src: &RgbImage, out_w: u32, out_h: u32) -> Option<RgbImage> {
        let inv = self.inverse()?;
        let (w, h) = (src.width() as i64, src.height() as i64);

        let sample = |x: i64, y: i64, c: usize| -> f32 {
            if x >= 0 && x < w && y >= 0 && y < h {
                src.get_pixel(x as u32, y as u32)[c] as f32
            } else {
                0.0
            }
        };

        Some(RgbImage::from_fn(out_w, out_h, |ox, oy| {
            let (sx, sy) = inv.apply((ox as f32, oy as f32));
            let x0 = sx.floor() as i64;
            let y0 = sy.floor() as i64;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let mut px = [0u8; 3];
            for (c, out) in px.iter_mut().enumerate() {
                let v = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                *out = v.round().clamp(0.0, 255.0) as u8;
            }
            Rgb(px)
        }))
    }
}

/// Gaussian elimination with partial pivoting. `None` if singular.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(mut m: [[f32; 4]; 4], mut rhs: [f32; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-6 {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..4 {
                m[row][j] -= factor * m[col][j];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (rhs[i] - tail) / m[i][i];
    }
    Some(x)
}

/// Warp a face onto the canonical 112×112 ArcFace template.
pub fn align_to_canonical(image: &RgbImage, landmarks: &[(f32, f32); 5]) -> Option<RgbImage> {
    SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS_112)?.warp(
        image,
        CANONICAL_SIZE,
        CANONICAL_SIZE,
    )
}

/// Rotate `image` about the eye midpoint so the eye line is horizontal.
/// Output keeps the input size.
pub fn level_eyes(image: &RgbImage, left: (f32, f32), right: (f32, f32)) -> Option<RgbImage> {
    let angle = (right.1 - left.1).atan2(right.0 - left.0);
    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    SimilarityTransform::rotation_about(center, -angle).warp(image, image.width(), image.height())
}
