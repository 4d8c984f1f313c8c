//! Input image validation. Runs before a comparison starts; failures here
//! are the only ones that abort a run.

use facevote_pipeline::InputFingerprint;
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum InputError {
    #[error("image not found: {0}")]
    NotFound(PathBuf),
    #[error("unsupported image format {ext:?} for {path} (expected jpg, jpeg or png)")]
    UnsupportedFormat { path: PathBuf, ext: String },
    #[error("image {path} is {size} bytes, limit is {max}")]
    TooLarge { path: PathBuf, size: u64, max: u64 },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// A decoded, validated input image.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub image: DynamicImage,
    pub fingerprint: InputFingerprint,
}

pub fn load_image(path: &Path, max_bytes: u64) -> Result<InputImage, InputError> {
    let io_err = |source| InputError::Io {
        path: path.to_path_buf(),
        source,
    };

    if !path.is_file() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(InputError::UnsupportedFormat {
            path: path.to_path_buf(),
            ext,
        });
    }

    let size = std::fs::metadata(path).map_err(io_err)?.len();
    if size > max_bytes {
        return Err(InputError::TooLarge {
            path: path.to_path_buf(),
            size,
            max: max_bytes,
        });
    }

    let bytes = std::fs::read(path).map_err(io_err)?;
    let image = image::load_from_memory(&bytes).map_err(|source| InputError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let fingerprint = InputFingerprint {
        label: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        sha256: format!("{:x}", Sha256::digest(&bytes)),
    };

    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        sha256 = %fingerprint.sha256,
        "input image validated"
    );

    Ok(InputImage { image, fingerprint })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(8, 6, Rgb([200, 100, 50]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_valid_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png");
        let input = load_image(&path, DEFAULT_MAX_IMAGE_BYTES).unwrap();
        assert_eq!((input.image.width(), input.image.height()), (8, 6));
        assert_eq!(input.fingerprint.label, "face.png");
        assert_eq!(input.fingerprint.sha256.len(), 64);
    }

    #[test]
    fn test_same_bytes_same_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let a = load_image(&write_png(dir.path(), "a.png"), DEFAULT_MAX_IMAGE_BYTES).unwrap();
        let b = load_image(&write_png(dir.path(), "b.png"), DEFAULT_MAX_IMAGE_BYTES).unwrap();
        assert_eq!(a.fingerprint.sha256, b.fingerprint.sha256);
    }

    #[test]
    fn test_missing_file() {
        let err = load_image(Path::new("/nonexistent/face.jpg"), DEFAULT_MAX_IMAGE_BYTES).unwrap_err();
        assert!(matches!(err, InputError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.gif");
        std::fs::write(&path, b"GIF89a").unwrap();
        let err = load_image(&path, DEFAULT_MAX_IMAGE_BYTES).unwrap_err();
        assert!(matches!(err, InputError::UnsupportedFormat { ref ext, .. } if ext == "gif"));
    }

    #[test]
    fn test_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png");
        let err = load_image(&path, 10).unwrap_err();
        assert!(matches!(err, InputError::TooLarge { max: 10, .. }));
    }

    #[test]
    fn test_corrupt_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();
        let err = load_image(&path, DEFAULT_MAX_IMAGE_BYTES).unwrap_err();
        assert!(matches!(err, InputError::Decode { .. }));
    }
}
