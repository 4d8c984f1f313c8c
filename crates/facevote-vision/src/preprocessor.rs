//! Crop and align, backed by the SCRFD detector on the inference thread.

use crate::alignment;
use crate::engine::{VisionError, VisionHandle};
use crate::types::FaceBox;
use async_trait::async_trait;
use facevote_pipeline::{ImagePair, PreprocessError, Preprocessor};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

pub const DEFAULT_CROP_MARGIN: f32 = 0.3;
pub const DEFAULT_MAX_CROP_SIZE: u32 = 1024;

pub struct FacePreprocessor {
    handle: VisionHandle,
    margin: f32,
    max_size: u32,
}

impl FacePreprocessor {
    pub fn new(handle: VisionHandle, margin: f32, max_size: u32) -> Self {
        Self {
            handle,
            margin,
            max_size,
        }
    }

    async fn locate(&self, label: char, image: &DynamicImage) -> Result<FaceBox, PreprocessError> {
        self.handle
            .best_face(image.to_rgb8())
            .await
            .map_err(|err| match err {
                VisionError::NoFace => PreprocessError::NoFace(label),
                other => PreprocessError::Failed(other.to_string()),
            })
    }

    async fn crop_one(&self, label: char, image: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        let face = self.locate(label, image).await?;
        crop_to_face(image, &face, self.margin, self.max_size).ok_or(PreprocessError::NoFace(label))
    }

    async fn align_one(&self, label: char, image: &DynamicImage) -> Result<DynamicImage, PreprocessError> {
        let face = self.locate(label, image).await?;
        let (left, right) = face.eyes().ok_or(PreprocessError::NoLandmarks(label))?;
        alignment::level_eyes(&image.to_rgb8(), left, right)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| PreprocessError::Failed(format!("cannot rotate image {label}")))
    }
}

#[async_trait]
impl Preprocessor for FacePreprocessor {
    async fn crop(&self, pair: &ImagePair) -> Result<ImagePair, PreprocessError> {
        let (a, b) = tokio::try_join!(self.crop_one('a', &pair.a), self.crop_one('b', &pair.b))?;
        tracing::info!(
            a = ?a.dimensions(),
            b = ?b.dimensions(),
            "cropped both faces"
        );
        Ok(ImagePair::new(a, b))
    }

    async fn align(&self, pair: &ImagePair) -> Result<ImagePair, PreprocessError> {
        let (a, b) = tokio::try_join!(self.align_one('a', &pair.a), self.align_one('b', &pair.b))?;
        tracing::info!("aligned both faces");
        Ok(ImagePair::new(a, b))
    }
}

/// Face box plus margin, clamped to the image, downscaled so the long edge
/// is at most `max_size`.
fn crop_to_face(image: &DynamicImage, face: &FaceBox, margin: f32, max_size: u32) -> Option<DynamicImage> {
    let rect = face.expanded(margin, image.width(), image.height())?;
    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);

    if cropped.width().max(cropped.height()) > max_size {
        Some(cropped.resize(max_size, max_size, FilterType::Lanczos3))
    } else {
        Some(cropped)
    }
}
