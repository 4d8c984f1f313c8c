//! Preprocessing interface: crop and align an image pair.

use async_trait::async_trait;
use image::DynamicImage;
use thiserror::Error;

/// The two images under comparison.
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub a: DynamicImage,
    pub b: DynamicImage,
}

impl ImagePair {
    pub fn new(a: DynamicImage, b: DynamicImage) -> Self {
        Self { a, b }
    }
}

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("preprocessing not configured")]
    NotConfigured,
    #[error("no face detected in image {0}")]
    NoFace(char),
    #[error("no landmarks available for image {0}")]
    NoLandmarks(char),
    #[error("preprocessing failed: {0}")]
    Failed(String),
}

/// Stage-scoped image transforms. Both are pure functions of the pair plus
/// static configuration; a failure on either image fails the pair.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn crop(&self, pair: &ImagePair) -> Result<ImagePair, PreprocessError>;
    async fn align(&self, pair: &ImagePair) -> Result<ImagePair, PreprocessError>;
}
