use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceBox};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected")]
    NoFace,
    #[error("cannot spawn inference thread: {0}")]
    Spawn(std::io::Error),
    #[error("inference thread exited")]
    ChannelClosed,
}

/// Paths of the two ONNX models inside a model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(SCRFD_MODEL_FILE),
            recognizer: dir.join(ARCFACE_MODEL_FILE),
        }
    }

    pub fn present(&self) -> bool {
        self.detector.exists() && self.recognizer.exists()
    }
}

enum VisionRequest {
    BestFace {
        image: RgbImage,
        reply: oneshot::Sender<Result<FaceBox, VisionError>>,
    },
    Embed {
        image: RgbImage,
        reply: oneshot::Sender<Result<Embedding, VisionError>>,
    },
}

/// Clone-safe handle to the inference thread.
#[derive(Clone)]
pub struct VisionHandle {
    tx: mpsc::Sender<VisionRequest>,
}

impl VisionHandle {
    /// Highest-confidence face in `image`.
    pub async fn best_face(&self, image: RgbImage) -> Result<FaceBox, VisionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VisionRequest::BestFace { image, reply })
            .await
            .map_err(|_| VisionError::ChannelClosed)?;
        rx.await.map_err(|_| VisionError::ChannelClosed)?
    }

    /// Embedding of the highest-confidence face in `image`.
    pub async fn embed(&self, image: RgbImage) -> Result<Embedding, VisionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(VisionRequest::Embed { image, reply })
            .await
            .map_err(|_| VisionError::ChannelClosed)?;
        rx.await.map_err(|_| VisionError::ChannelClosed)?
    }
}

/// Load both models and start the inference thread.
///
/// Model loading happens before the thread starts, so a missing or broken
/// model fails here rather than on the first request.
pub fn spawn_vision_engine(models: &ModelPaths) -> Result<VisionHandle, VisionError> {
    let mut detector = FaceDetector::load(&models.detector)?;
    let mut recognizer = FaceRecognizer::load(&models.recognizer)?;

    let (tx, mut rx) = mpsc::channel::<VisionRequest>(8);

    std::thread::Builder::new()
        .name("facevote-vision".into())
        .spawn(move || {
            tracing::info!("inference thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    VisionRequest::BestFace { image, reply } => {
                        let _ = reply.send(best_face(&mut detector, &image));
                    }
                    VisionRequest::Embed { image, reply } => {
                        let result = best_face(&mut detector, &image)
                            .and_then(|face| recognizer.embed(&image, &face).map_err(VisionError::from));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("inference thread exiting");
        })
        .map_err(VisionError::Spawn)?;

    Ok(VisionHandle { tx })
}

fn best_face(detector: &mut FaceDetector, image: &RgbImage) -> Result<FaceBox, VisionError> {
    let faces = detector.detect(image)?;
    tracing::debug!(count = faces.len(), "faces detected");
    faces.into_iter().next().ok_or(VisionError::NoFace)
}
