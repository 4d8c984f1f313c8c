use serde::{Deserialize, Serialize};

/// A detected face in image pixel coordinates, with optional five-point landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Integer pixel rectangle, always inside the image it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    /// Box grown by `margin × size` on every side, clamped to a `img_w × img_h` image.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn expanded(&self, margin: f32, img_w: u32, img_h: u32) -> Option<PixelRect> {
        let mx = (self.width * margin).trunc();
        let my = (self.height * margin).trunc();

        let x1 = (self.x - mx).max(0.0).floor();
        let y1 = (self.y - my).max(0.0).floor();
        let x2 = (self.x + self.width + mx).min(img_w as f32).ceil();
        let y2 = (self.y + self.height + my).min(img_h as f32).ceil();

        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some(PixelRect {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }

    /// Left and right eye centres, if landmarks were detected.
    pub fn eyes(&self) -> Option<((f32, f32), (f32, f32))> {
        self.landmarks.map(|l| (l[0], l[1]))
    }
}

/// L2-normalised ArcFace embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]; 0 when either vector is zero.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Cosine distance, `1 − similarity`.
    pub fn distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding {
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_expanded_adds_margin() {
        let rect = face(100.0, 100.0, 50.0, 40.0).expanded(0.3, 1000, 1000).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x: 85,
                y: 88,
                width: 80,
                height: 64
            }
        );
    }

    #[test]
    fn test_expanded_clamps_to_image() {
        let rect = face(5.0, 5.0, 50.0, 50.0).expanded(0.3, 60, 60).unwrap();
        assert_eq!((rect.x, rect.y), (0, 0));
        assert_eq!((rect.width, rect.height), (60, 60));
    }

    #[test]
    fn test_expanded_outside_image() {
        assert!(face(200.0, 200.0, 10.0, 10.0).expanded(0.0, 100, 100).is_none());
    }

    #[test]
    fn test_similarity_identical_and_orthogonal() {
        assert!((emb(&[1.0, 0.0]).similarity(&emb(&[2.0, 0.0])) - 1.0).abs() < 1e-6);
        assert!(emb(&[1.0, 0.0]).similarity(&emb(&[0.0, 1.0])).abs() < 1e-6);
        assert!((emb(&[1.0, 0.0]).distance(&emb(&[-1.0, 0.0])) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_vector() {
        assert_eq!(emb(&[0.0, 0.0]).similarity(&emb(&[1.0, 0.0])), 0.0);
    }
}
