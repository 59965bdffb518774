use std::path::PathBuf;

use thiserror::Error;

/// Structured error type for the background-removal pipeline.
///
/// Each variant carries the context of its failure domain (filesystem,
/// image decode, inference, output write) so batch reports can name the
/// offending file without parsing error strings. Sources are boxed
/// `Send + Sync` because per-file results cross rayon worker threads.
#[derive(Error, Debug)]
pub enum BgremsError {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("image error: {operation} failed (file: {path})")]
    Image {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("output error: cannot write {path:?}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, BgremsError>;

/// Fallback for I/O errors raised without path context. Code that knows the
/// path constructs `FileSystem` directly.
impl From<std::io::Error> for BgremsError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "io".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for BgremsError {
    fn from(err: image::ImageError) -> Self {
        Self::Image {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for BgremsError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "onnx runtime call".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors occur while reshaping engine outputs, so they count as
/// inference faults rather than a separate tensor category.
impl From<ndarray::ShapeError> for BgremsError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Inference {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
