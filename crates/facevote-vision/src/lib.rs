//! facevote-vision — Local face analysis over ONNX Runtime.
//!
//! SCRFD detection and ArcFace embeddings run on one dedicated inference
//! thread. On top of it sit the embedding comparator oracle and the
//! crop/align preprocessor used by the pipeline.

pub mod alignment;
pub mod detector;
pub mod embedding_oracle;
pub mod engine;
pub mod input;
pub mod preprocessor;
pub mod recognizer;
pub mod types;

pub use embedding_oracle::{EmbeddingOracle, DEFAULT_SIMILARITY_THRESHOLD};
pub use engine::{spawn_vision_engine, ModelPaths, VisionError, VisionHandle};
pub use input::{load_image, InputError, InputImage, DEFAULT_MAX_IMAGE_BYTES};
pub use preprocessor::{FacePreprocessor, DEFAULT_CROP_MARGIN, DEFAULT_MAX_CROP_SIZE};
pub use types::{Embedding, FaceBox, PixelRect};
